//! HTTP client for the prediction API and its webhook routes.

use std::time::Duration;

use reqwest::StatusCode;
use reviewsense_core::{
    IncomingReview, ReviewSubmission, SentimentResult, SentimentStats, StoredResult,
};
use reviewsense_store::Page;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::info;

use crate::trigger::{ChangeEvent, TriggerOutcome};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One page of `GET /reviews`.
#[derive(Debug, Deserialize)]
pub struct ReviewsPage {
    pub reviews: Vec<StoredResult>,
    pub total: usize,
    pub limit: u32,
    pub skip: u32,
}

/// `GET /health` body.
#[derive(Debug, Deserialize)]
pub struct Health {
    pub status: String,
    pub version: String,
}

/// Client for a running reviewsense server.
#[derive(Clone)]
pub struct PredictClient {
    client: reqwest::Client,
    base_url: String,
}

impl PredictClient {
    /// Per-request timeout for the default client.
    pub const TIMEOUT: Duration = Duration::from_secs(30);

    /// `base_url` should be like `http://localhost:8001`; a trailing slash is dropped.
    pub fn new(base_url: impl Into<String>) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder().timeout(Self::TIMEOUT).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /predict`. Only a 200 response counts as success.
    pub async fn predict(
        &self,
        submission: &ReviewSubmission,
    ) -> Result<SentimentResult, SyncError> {
        let url = format!("{}/predict", self.base_url);
        info!(url = %url, "calling predict");
        let resp = self.client.post(&url).json(submission).send().await?;
        let status = resp.status();
        if status != StatusCode::OK {
            return Err(server_error(resp).await);
        }
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn health(&self) -> Result<Health, SyncError> {
        self.get_json(&format!("{}/health", self.base_url)).await
    }

    pub async fn reviews(&self, page: Page) -> Result<ReviewsPage, SyncError> {
        self.get_json(&format!(
            "{}/reviews?limit={}&skip={}",
            self.base_url, page.limit, page.skip
        ))
        .await
    }

    pub async fn stats(&self) -> Result<SentimentStats, SyncError> {
        self.get_json(&format!("{}/stats", self.base_url)).await
    }

    /// `POST /incoming`: store a record and have the server run the trigger on it.
    pub async fn submit_incoming(
        &self,
        submission: &ReviewSubmission,
    ) -> Result<IncomingReview, SyncError> {
        let url = format!("{}/incoming", self.base_url);
        info!(url = %url, "submitting incoming review");
        let resp = self.client.post(&url).json(submission).send().await?;
        decode(resp).await
    }

    pub async fn list_incoming(&self, page: Page) -> Result<Vec<IncomingReview>, SyncError> {
        self.get_json(&format!(
            "{}/incoming?limit={}&skip={}",
            self.base_url, page.limit, page.skip
        ))
        .await
    }

    /// `POST /hooks/incoming`: deliver one change notification.
    pub async fn deliver_event(&self, event: &ChangeEvent) -> Result<TriggerOutcome, SyncError> {
        let url = format!("{}/hooks/incoming", self.base_url);
        info!(url = %url, "delivering change event");
        let resp = self.client.post(&url).json(event).send().await?;
        decode(resp).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SyncError> {
        let resp = self.client.get(url).send().await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, SyncError> {
    if !resp.status().is_success() {
        return Err(server_error(resp).await);
    }
    let body = resp.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

async fn server_error(resp: reqwest::Response) -> SyncError {
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    SyncError::Server {
        status,
        body: error_message(&text),
    }
}

/// Pull the message out of an `{"error": ...}` body, else keep the raw text.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
    }
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => body.trim().to_string(),
    }
}
