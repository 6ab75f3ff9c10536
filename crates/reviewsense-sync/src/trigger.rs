//! Change-notification handler for the incoming review collection.
//!
//! One event in, one `POST /predict` out, one status write-back. Records move
//! `unprocessed -> processed | failed` exactly once; nothing here retries.
//! A record is claimed before the outbound call, so concurrent deliveries of
//! the same event produce a single prediction.

use std::sync::Arc;

use reviewsense_core::{IncomingReview, RecordId, ReviewSubmission, SentimentLabel};
use reviewsense_store::{IncomingStore, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::http::PredictClient;

/// An insert notification in the EventBridge envelope:
/// `{"detail": {"fullDocument": {...}}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(default)]
    pub detail: Option<ChangeDetail>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeDetail {
    #[serde(rename = "fullDocument", default)]
    pub full_document: Option<IncomingDocument>,
}

/// The inserted document as carried by the event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncomingDocument {
    #[serde(rename = "_id", default)]
    pub id: Option<DocumentId>,
    #[serde(default)]
    pub review: Option<String>,
    #[serde(default)]
    pub movie_title: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Document ids arrive as plain numbers, strings, or extended JSON `{"$oid": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentId {
    Number(RecordId),
    Text(String),
    Oid {
        #[serde(rename = "$oid")]
        oid: String,
    },
}

impl DocumentId {
    /// The store id this refers to, if it is one.
    pub fn record_id(&self) -> Option<RecordId> {
        match self {
            Self::Number(id) => Some(*id),
            Self::Text(s) | Self::Oid { oid: s } => s.trim().parse().ok(),
        }
    }
}

impl ChangeEvent {
    /// The notification a change stream would emit for a freshly inserted record.
    pub fn for_record(record: &IncomingReview) -> Self {
        Self {
            detail: Some(ChangeDetail {
                full_document: Some(IncomingDocument {
                    id: Some(DocumentId::Number(record.id)),
                    review: Some(record.review.clone()),
                    movie_title: record.movie_title.clone(),
                    user_id: record.user_id.clone(),
                }),
            }),
        }
    }

    pub fn document(&self) -> Option<&IncomingDocument> {
        self.detail.as_ref()?.full_document.as_ref()
    }
}

impl IncomingDocument {
    /// The `/predict` payload. A missing review becomes `""`; absent optional
    /// fields are sent as explicit `null`s.
    pub fn payload(&self) -> ReviewSubmission {
        ReviewSubmission {
            review: self.review.clone().unwrap_or_default(),
            movie_title: self.movie_title.clone(),
            user_id: self.user_id.clone(),
        }
    }
}

/// What handling one event did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum TriggerOutcome {
    /// Nothing to process; no call made, nothing written.
    Skipped { reason: String },
    Processed {
        id: RecordId,
        sentiment: SentimentLabel,
        confidence: f64,
    },
    Failed { id: RecordId, error: String },
}

#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("failed to record outcome for record {id}: {source}")]
    WriteBack {
        id: RecordId,
        #[source]
        source: StoreError,
    },
    #[error("failed to claim record {id}: {source}")]
    Claim {
        id: RecordId,
        #[source]
        source: StoreError,
    },
}

/// Stateless handler: every invocation works only from its event.
pub struct TriggerHandler {
    client: PredictClient,
    store: Arc<dyn IncomingStore>,
}

impl TriggerHandler {
    pub fn new(client: PredictClient, store: Arc<dyn IncomingStore>) -> Self {
        Self { client, store }
    }

    pub fn store(&self) -> &Arc<dyn IncomingStore> {
        &self.store
    }

    /// Process one change notification.
    ///
    /// Only a failing claim or status write-back is an error; prediction
    /// failures are recorded on the record and reported as
    /// [`TriggerOutcome::Failed`].
    pub async fn handle(&self, event: &ChangeEvent) -> Result<TriggerOutcome, TriggerError> {
        let Some(doc) = event.document() else {
            warn!("change event has no fullDocument; skipping");
            return Ok(skipped("no fullDocument in event"));
        };
        let Some(raw_id) = doc.id.as_ref() else {
            warn!("change event document has no _id; skipping");
            return Ok(skipped("document has no _id"));
        };
        let Some(id) = raw_id.record_id() else {
            warn!(id = ?raw_id, "change event document id is not a record id; skipping");
            return Ok(skipped("document _id is not a record id"));
        };

        match self.store.claim_incoming(id).await {
            Ok(()) => {}
            Err(StoreError::AlreadyFinal { status, .. }) => {
                warn!(id, %status, "record already final; skipping");
                return Ok(skipped(&format!("record {id} is already {status}")));
            }
            Err(StoreError::AlreadyClaimed(_)) => {
                warn!(id, "record claimed by another delivery; skipping");
                return Ok(skipped(&format!("record {id} is already being processed")));
            }
            Err(StoreError::NotFound(_)) => {
                warn!(id, "record not in incoming collection; skipping");
                return Ok(skipped(&format!("record {id} not found")));
            }
            Err(source) => return Err(TriggerError::Claim { id, source }),
        }

        info!(id, "processing incoming review");
        match self.client.predict(&doc.payload()).await {
            Ok(result) if (0.0..=1.0).contains(&result.confidence) => {
                self.store
                    .mark_processed(id, result.sentiment, result.confidence)
                    .await
                    .map_err(|source| TriggerError::WriteBack { id, source })?;
                info!(
                    id,
                    sentiment = %result.sentiment,
                    confidence = result.confidence,
                    "incoming review processed"
                );
                Ok(TriggerOutcome::Processed {
                    id,
                    sentiment: result.sentiment,
                    confidence: result.confidence,
                })
            }
            Ok(result) => {
                let error = format!("confidence out of range: {}", result.confidence);
                self.fail(id, error).await
            }
            Err(e) => self.fail(id, e.to_string()).await,
        }
    }

    async fn fail(&self, id: RecordId, error: String) -> Result<TriggerOutcome, TriggerError> {
        let error = if error.trim().is_empty() {
            "prediction request failed".to_string()
        } else {
            error
        };
        self.store
            .mark_failed(id, &error)
            .await
            .map_err(|source| TriggerError::WriteBack { id, source })?;
        warn!(id, error = %error, "incoming review failed");
        Ok(TriggerOutcome::Failed { id, error })
    }
}

fn skipped(reason: &str) -> TriggerOutcome {
    TriggerOutcome::Skipped {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eventbridge_shape_parses() {
        let event: ChangeEvent = serde_json::from_value(json!({
            "version": "0",
            "detail-type": "MongoDB Database Trigger for imdb_reviews.incoming_reviews",
            "detail": {
                "operationType": "insert",
                "fullDocument": {
                    "_id": 42,
                    "review": "This movie was absolutely fantastic!",
                    "movie_title": "Test Movie",
                    "user_id": "test-user-123",
                    "created_at": "2026-03-01T12:00:00Z"
                }
            }
        }))
        .unwrap();
        let doc = event.document().unwrap();
        assert_eq!(doc.id.as_ref().and_then(DocumentId::record_id), Some(42));
        assert_eq!(doc.review.as_deref(), Some("This movie was absolutely fantastic!"));
    }

    #[test]
    fn document_id_forms() {
        let parse = |v| serde_json::from_value::<DocumentId>(v).unwrap().record_id();
        assert_eq!(parse(json!(5)), Some(5));
        assert_eq!(parse(json!("17")), Some(17));
        assert_eq!(parse(json!({"$oid": "23"})), Some(23));
        assert_eq!(parse(json!({"$oid": "65f1c0ffee"})), None);
        assert_eq!(parse(json!("test-document-id")), None);
    }

    #[test]
    fn missing_pieces_yield_no_document() {
        let empty: ChangeEvent = serde_json::from_value(json!({})).unwrap();
        assert!(empty.document().is_none());

        let no_doc: ChangeEvent = serde_json::from_value(json!({"detail": {}})).unwrap();
        assert!(no_doc.document().is_none());

        let no_id: ChangeEvent =
            serde_json::from_value(json!({"detail": {"fullDocument": {"review": "x"}}})).unwrap();
        assert!(no_id.document().unwrap().id.is_none());
    }

    #[test]
    fn payload_keeps_nulls_and_defaults_review() {
        let doc = IncomingDocument {
            id: Some(DocumentId::Number(1)),
            ..Default::default()
        };
        let payload = serde_json::to_value(doc.payload()).unwrap();
        assert_eq!(
            payload,
            json!({"review": "", "movie_title": null, "user_id": null})
        );
    }

    #[test]
    fn outcome_is_tagged() {
        let outcome = TriggerOutcome::Failed {
            id: 3,
            error: "server returned 503: model unavailable".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["id"], 3);

        let back: TriggerOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(back, outcome);
    }
}
