//! Storage layer: sentiment results and the incoming review collection.

use std::time::Duration;

use async_trait::async_trait;
use reviewsense_core::{
    IncomingReview, RecordId, ReviewSubmission, SentimentLabel, SentimentResult, SentimentStats,
    StoredResult,
};

mod error;
pub use error::StoreError;

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckStore;

/// Window into a newest-first listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub skip: u32,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    /// Build a page, capping `limit` at [`Page::MAX_LIMIT`].
    pub fn new(limit: u32, skip: u32) -> Self {
        Self {
            limit: limit.min(Self::MAX_LIMIT),
            skip,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT, 0)
    }
}

/// The collection of persisted sentiment results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Append one result; returns its id once the write is acknowledged.
    ///
    /// If the write cannot start within `timeout`, nothing is written and
    /// [`StoreError::Timeout`] is returned. A write that has started is
    /// always seen through to its outcome.
    async fn insert(
        &self,
        result: &SentimentResult,
        timeout: Duration,
    ) -> Result<RecordId, StoreError>;

    /// Results ordered by insertion, most recent first.
    async fn list(&self, page: Page) -> Result<Vec<StoredResult>, StoreError>;

    /// Aggregate over the whole collection at call time.
    async fn stats(&self) -> Result<SentimentStats, StoreError>;
}

/// The collection the trigger path watches.
#[async_trait]
pub trait IncomingStore: Send + Sync {
    /// Insert a new record in the `unprocessed` state.
    async fn insert_incoming(
        &self,
        submission: &ReviewSubmission,
    ) -> Result<IncomingReview, StoreError>;

    async fn get_incoming(&self, id: RecordId) -> Result<IncomingReview, StoreError>;

    /// Take the single right to process an `unprocessed` record.
    ///
    /// Fails with `NotFound`, `AlreadyFinal`, or `AlreadyClaimed`; only one
    /// caller ever succeeds for a given record.
    async fn claim_incoming(&self, id: RecordId) -> Result<(), StoreError>;

    /// Records ordered by insertion, most recent first.
    async fn list_incoming(&self, page: Page) -> Result<Vec<IncomingReview>, StoreError>;

    /// Move an `unprocessed` record to `processed`, stamping the observed prediction.
    async fn mark_processed(
        &self,
        id: RecordId,
        sentiment: SentimentLabel,
        confidence: f64,
    ) -> Result<(), StoreError>;

    /// Move an `unprocessed` record to `failed`, keeping the error text.
    async fn mark_failed(&self, id: RecordId, error: &str) -> Result<(), StoreError>;
}
