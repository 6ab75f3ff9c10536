use std::time::Duration;

use reviewsense_core::{ProcessingStatus, RecordId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(RecordId),

    #[error("record {id} is already {status}")]
    AlreadyFinal {
        id: RecordId,
        status: ProcessingStatus,
    },

    #[error("record {0} is already being processed")]
    AlreadyClaimed(RecordId),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("{0}")]
    Other(String),
}
