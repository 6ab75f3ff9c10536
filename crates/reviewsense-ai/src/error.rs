use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unexpected label from model: {0:?}")]
    UnexpectedLabel(String),

    #[error("confidence out of range: {0}")]
    InvalidScore(f64),

    #[error("inference failed: {0}")]
    Inference(String),

    #[cfg(feature = "remote")]
    #[error("inference request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("inference endpoint returned {status}: {body}")]
    Server { status: u16, body: String },
}
