//! Incoming review records consumed by the trigger path.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::review::{RecordId, ReviewSubmission, SentimentLabel};

/// Processing state of an incoming record.
///
/// `Processed` and `Failed` are terminal; nothing moves a record back to
/// `Unprocessed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Unprocessed,
    Processed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unprocessed => "unprocessed",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Unprocessed)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unprocessed" => Ok(Self::Unprocessed),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown processing status: {other:?}")),
        }
    }
}

/// A submission waiting in the incoming collection, plus what the trigger
/// path observed when it processed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingReview {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub review: String,
    pub movie_title: Option<String>,
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: ProcessingStatus,
    /// Denormalised copy of the prediction, set once processed.
    pub sentiment: Option<SentimentLabel>,
    pub confidence: Option<f64>,
    /// Failure text, set once failed.
    pub error: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl IncomingReview {
    pub fn submission(&self) -> ReviewSubmission {
        ReviewSubmission {
            review: self.review.clone(),
            movie_title: self.movie_title.clone(),
            user_id: self.user_id.clone(),
        }
    }
}
