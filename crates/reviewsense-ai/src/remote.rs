//! Remote text-classification endpoint (Hugging Face Inference API shape).
//!
//! Request: `POST {"inputs": text}`. Response is either `[[{label, score}, ..]]`
//! or the flat `[{label, score}, ..]`; the highest-scoring entry wins.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{ModelError, Prediction, SentimentModel};

const HF_INFERENCE_BASE: &str = "https://api-inference.huggingface.co/models";

/// Sentiment classifier that delegates to an HTTP inference endpoint.
pub struct RemoteClassifier {
    client: reqwest::Client,
    url: String,
    model_id: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
}

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

impl RemoteClassifier {
    /// Point at an explicit endpoint URL.
    pub fn new(url: impl Into<String>, model_id: impl Into<String>) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
            model_id: model_id.into(),
            token: None,
        })
    }

    /// The hosted Hugging Face endpoint for `model_id`.
    pub fn hugging_face(model_id: &str) -> Result<Self, ModelError> {
        Self::new(format!("{HF_INFERENCE_BASE}/{model_id}"), model_id)
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SentimentModel for RemoteClassifier {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn classify(&self, text: &str) -> Result<Prediction, ModelError> {
        let mut req = self
            .client
            .post(&self.url)
            .json(&InferenceRequest { inputs: text });
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        debug!(url = %self.url, chars = text.len(), "remote classify");
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            info!(status = status.as_u16(), "inference endpoint rejected request");
            return Err(ModelError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.bytes().await?;
        best_prediction(&body)
    }
}

/// Parse an inference response body and pick the top-scoring label.
fn best_prediction(body: &[u8]) -> Result<Prediction, ModelError> {
    let parsed: InferenceResponse = serde_json::from_slice(body)
        .map_err(|e| ModelError::Inference(format!("malformed inference response: {e}")))?;
    let scores = match parsed {
        InferenceResponse::Nested(mut outer) => {
            if outer.is_empty() {
                Vec::new()
            } else {
                outer.swap_remove(0)
            }
        }
        InferenceResponse::Flat(scores) => scores,
    };
    let best = scores
        .into_iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .ok_or_else(|| ModelError::Inference("inference response had no labels".into()))?;
    Prediction::from_raw(&best.label, best.score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reviewsense_core::SentimentLabel;

    #[test]
    fn nested_response() {
        let body = br#"[[{"label":"POSITIVE","score":0.9998},{"label":"NEGATIVE","score":0.0002}]]"#;
        let p = best_prediction(body).unwrap();
        assert_eq!(p.label, SentimentLabel::Positive);
        assert!((p.confidence - 0.9998).abs() < 1e-12);
    }

    #[test]
    fn flat_response_unordered() {
        let body = br#"[{"label":"POSITIVE","score":0.12},{"label":"NEGATIVE","score":0.88}]"#;
        let p = best_prediction(body).unwrap();
        assert_eq!(p.label, SentimentLabel::Negative);
        assert!((p.confidence - 0.88).abs() < 1e-12);
    }

    #[test]
    fn raw_head_names_accepted() {
        let body = br#"[[{"label":"LABEL_1","score":0.7},{"label":"LABEL_0","score":0.3}]]"#;
        assert_eq!(
            best_prediction(body).unwrap().label,
            SentimentLabel::Positive
        );
    }

    #[test]
    fn unknown_label_rejected() {
        let body = br#"[[{"label":"NEUTRAL","score":0.6},{"label":"POSITIVE","score":0.4}]]"#;
        assert!(matches!(
            best_prediction(body),
            Err(ModelError::UnexpectedLabel(_))
        ));
    }

    #[test]
    fn score_out_of_range_rejected() {
        let body = br#"[{"label":"POSITIVE","score":1.5}]"#;
        assert!(matches!(
            best_prediction(body),
            Err(ModelError::InvalidScore(_))
        ));
    }

    #[test]
    fn empty_and_malformed_bodies() {
        assert!(matches!(best_prediction(b"[]"), Err(ModelError::Inference(_))));
        assert!(matches!(
            best_prediction(b"[[]]"),
            Err(ModelError::Inference(_))
        ));
        assert!(matches!(
            best_prediction(br#"{"error":"Model is currently loading"}"#),
            Err(ModelError::Inference(_))
        ));
    }

    #[test]
    fn explicit_endpoint() {
        let clf = RemoteClassifier::new("http://localhost:9000/classify/", "local-sst2").unwrap();
        assert_eq!(clf.url(), "http://localhost:9000/classify");
        assert_eq!(clf.model_id(), "local-sst2");
        assert!(clf.token.is_none());
    }

    #[test]
    fn hugging_face_url() {
        let clf = RemoteClassifier::hugging_face(crate::DEFAULT_MODEL_ID)
            .unwrap()
            .with_token(Some(String::new()));
        assert_eq!(
            clf.url(),
            "https://api-inference.huggingface.co/models/distilbert-base-uncased-finetuned-sst-2-english"
        );
        assert!(clf.token.is_none());
        assert_eq!(clf.model_id(), crate::DEFAULT_MODEL_ID);
    }
}
