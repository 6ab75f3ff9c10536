//! The prediction service: validate, classify, stamp, persist.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reviewsense_ai::SentimentModel;
use reviewsense_core::{
    MODEL_VERSION, MonotonicClock, ReviewSubmission, SentimentResult, SentimentStats, StoredResult,
};
use reviewsense_store::{Page, ResultStore, StoreError};
use tracing::{info, warn};

use crate::PredictError;

/// Handles one review at a time against a shared model and store.
///
/// Each call is independent: no caching, batching, or deduplication of
/// identical review text.
pub struct PredictionService {
    model: Arc<dyn SentimentModel>,
    store: Arc<dyn ResultStore>,
    clock: MonotonicClock,
    model_version: String,
    timeout: Duration,
}

impl PredictionService {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(model: Arc<dyn SentimentModel>, store: Arc<dyn ResultStore>) -> Self {
        Self {
            model,
            store,
            clock: MonotonicClock::new(),
            model_version: MODEL_VERSION.to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Bound on each model call and each store call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    /// Classify one submission and persist the result before returning it.
    ///
    /// Blank reviews are rejected before the model or store is touched. The
    /// model is called once and the store written once; a failed write fails
    /// the request even though classification succeeded. A write that times
    /// out never lands, so a rejected request leaves no stored result.
    pub async fn predict(
        &self,
        submission: ReviewSubmission,
    ) -> Result<SentimentResult, PredictError> {
        if submission.is_blank() {
            return Err(PredictError::InvalidInput(
                "Review text cannot be empty".into(),
            ));
        }

        let prediction = match tokio::time::timeout(
            self.timeout,
            self.model.classify(&submission.review),
        )
        .await
        {
            Ok(Ok(prediction)) => prediction,
            Ok(Err(e)) => {
                warn!(error = %e, "model call failed");
                return Err(PredictError::ModelUnavailable(e.to_string()));
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "model call timed out");
                return Err(PredictError::ModelUnavailable(format!(
                    "model call timed out after {:?}",
                    self.timeout
                )));
            }
        };

        let ReviewSubmission {
            review,
            movie_title,
            user_id,
        } = submission;
        let result = SentimentResult {
            review,
            sentiment: prediction.label,
            confidence: prediction.confidence,
            timestamp: self.clock.now(),
            movie_title,
            user_id,
            model_version: self.model_version.clone(),
        };

        let id = self
            .store
            .insert(&result, self.timeout)
            .await
            .inspect_err(|e| warn!(error = %e, "failed to persist result"))?;

        info!(
            id,
            sentiment = %result.sentiment,
            confidence = result.confidence,
            "stored prediction"
        );
        Ok(result)
    }

    /// Most recent stored results.
    pub async fn recent(&self, page: Page) -> Result<Vec<StoredResult>, StoreError> {
        self.bounded(self.store.list(page)).await
    }

    pub async fn stats(&self) -> Result<SentimentStats, StoreError> {
        self.bounded(self.store.stats()).await
    }

    /// Bound a read. Abandoning a read has no side effects.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }
}
