//! HTTP API over the prediction service.
//!
//! Routes: `GET /`, `GET /health`, `POST /predict`, `GET /reviews`, `GET /stats`.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

mod error;
pub mod handlers;
mod service;

pub use error::{ApiError, PredictError};
pub use handlers::{PageQuery, ReviewsResponse};
pub use service::PredictionService;

/// State shared across HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
}

impl AppState {
    pub fn new(service: PredictionService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// Build the API router with request tracing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/predict", post(handlers::predict))
        .route("/reviews", get(handlers::reviews))
        .route("/stats", get(handlers::stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
