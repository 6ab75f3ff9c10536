use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reviewsense_store::StoreError;
use serde_json::json;
use thiserror::Error;

/// Why a prediction request was not answered with a result.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("failed to store result: {0}")]
    Storage(#[from] StoreError),
}

/// Error returned from HTTP handlers, rendered as `{"error": message}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Predict(#[from] PredictError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// An extractor refused the request (bad JSON, bad query string).
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Predict(PredictError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            Self::Predict(PredictError::ModelUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Predict(PredictError::Storage(_)) | Self::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Rejected { status, .. } => *status,
        }
    }
}

impl From<axum::extract::rejection::JsonRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<axum::extract::rejection::QueryRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::QueryRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}
