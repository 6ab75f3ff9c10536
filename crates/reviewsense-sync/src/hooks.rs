//! Webhook routes for the incoming collection.
//!
//! `POST /hooks/incoming` takes a change notification. `POST /incoming`
//! inserts a record and dispatches its notification in-process, standing in
//! for a database change stream. `GET /incoming` lists records with status.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use reviewsense_core::{IncomingReview, ReviewSubmission};
use reviewsense_store::{Page, StoreError};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::trigger::{ChangeEvent, TriggerError, TriggerHandler, TriggerOutcome};

#[derive(Clone)]
pub struct HookState {
    pub handler: Arc<TriggerHandler>,
}

impl HookState {
    pub fn new(handler: TriggerHandler) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error(transparent)]
    Trigger(#[from] TriggerError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
}

impl From<JsonRejection> for HookError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for HookError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for HookError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Rejected { status, .. } => *status,
            Self::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Trigger(_) | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct IncomingQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub skip: u32,
}

fn default_limit() -> u32 {
    Page::DEFAULT_LIMIT
}

/// Build the webhook router. Merge it with the API router to serve both.
pub fn hook_routes(state: HookState) -> Router {
    Router::new()
        .route("/hooks/incoming", post(deliver))
        .route("/incoming", post(submit).get(list))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// POST /hooks/incoming
async fn deliver(
    State(state): State<HookState>,
    body: Result<Json<ChangeEvent>, JsonRejection>,
) -> Result<Json<TriggerOutcome>, HookError> {
    let Json(event) = body?;
    let outcome = state.handler.handle(&event).await?;
    Ok(Json(outcome))
}

/// POST /incoming
async fn submit(
    State(state): State<HookState>,
    body: Result<Json<ReviewSubmission>, JsonRejection>,
) -> Result<(StatusCode, Json<IncomingReview>), HookError> {
    let Json(submission) = body?;
    let store = state.handler.store();
    let record = store.insert_incoming(&submission).await?;
    info!(id = record.id, "incoming review stored");

    state
        .handler
        .handle(&ChangeEvent::for_record(&record))
        .await?;
    let record = store.get_incoming(record.id).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /incoming
async fn list(
    State(state): State<HookState>,
    query: Result<Query<IncomingQuery>, QueryRejection>,
) -> Result<Json<Vec<IncomingReview>>, HookError> {
    let Query(query) = query?;
    let records = state
        .handler
        .store()
        .list_incoming(Page::new(query.limit, query.skip))
        .await?;
    Ok(Json(records))
}
