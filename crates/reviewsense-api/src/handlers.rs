use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use reviewsense_core::{ReviewSubmission, SentimentResult, SentimentStats, StoredResult};
use reviewsense_store::Page;
use serde::{Deserialize, Serialize};

use crate::{ApiError, AppState};

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: &'static str,
    pub model: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `limit`/`skip` query parameters. Negative or non-numeric values are rejected.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub skip: u32,
}

fn default_limit() -> u32 {
    Page::DEFAULT_LIMIT
}

impl PageQuery {
    pub fn page(&self) -> Page {
        Page::new(self.limit, self.skip)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewsResponse {
    pub reviews: Vec<StoredResult>,
    /// Number of reviews in this response, not in the store.
    pub total: usize,
    pub limit: u32,
    pub skip: u32,
}

/// GET /
pub async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        message: "Sentiment Analysis API",
        model: state.service.model_id().to_string(),
        status: "running",
    })
}

/// GET /health
///
/// Liveness only; does not check the model or the store.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// POST /predict
pub async fn predict(
    State(state): State<AppState>,
    body: Result<Json<ReviewSubmission>, JsonRejection>,
) -> Result<Json<SentimentResult>, ApiError> {
    let Json(submission) = body?;
    let result = state.service.predict(submission).await?;
    Ok(Json(result))
}

/// GET /reviews
pub async fn reviews(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<ReviewsResponse>, ApiError> {
    let Query(query) = query?;
    let page = query.page();
    let reviews = state.service.recent(page).await?;
    Ok(Json(ReviewsResponse {
        total: reviews.len(),
        reviews,
        limit: page.limit,
        skip: page.skip,
    }))
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Result<Json<SentimentStats>, ApiError> {
    Ok(Json(state.service.stats().await?))
}
