//! Review submissions and the sentiment results produced for them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tag stamped on every result so stored rows record which classifier produced them.
pub const MODEL_VERSION: &str = "distilbert-sentiment";

/// Store-assigned identifier for a persisted record.
pub type RecordId = i64;

/// The two-valued classification output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentLabel {
    Positive,
    Negative,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown sentiment label: {0:?}")]
pub struct LabelError(pub String);

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "POSITIVE",
            Self::Negative => "NEGATIVE",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SentimentLabel {
    type Err = LabelError;

    /// Accepts the canonical names (any case) and the raw `LABEL_n` head names
    /// emitted by SST-2 style classifiers, where index 0 is negative.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("POSITIVE") || trimmed.eq_ignore_ascii_case("LABEL_1") {
            Ok(Self::Positive)
        } else if trimmed.eq_ignore_ascii_case("NEGATIVE")
            || trimmed.eq_ignore_ascii_case("LABEL_0")
        {
            Ok(Self::Negative)
        } else {
            Err(LabelError(s.to_string()))
        }
    }
}

/// A review as submitted by a caller.
///
/// Also the JSON body of `POST /predict`. Absent optional fields serialize as
/// explicit `null`s rather than being dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSubmission {
    pub review: String,
    #[serde(default)]
    pub movie_title: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl ReviewSubmission {
    pub fn new(review: impl Into<String>) -> Self {
        Self {
            review: review.into(),
            movie_title: None,
            user_id: None,
        }
    }

    pub fn with_movie_title(mut self, title: impl Into<String>) -> Self {
        self.movie_title = Some(title.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// True when the review has no content once surrounding whitespace is removed.
    pub fn is_blank(&self) -> bool {
        self.review.trim().is_empty()
    }
}

/// Classification outcome for one accepted submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub review: String,
    pub sentiment: SentimentLabel,
    /// Probability mass on `sentiment`, always within `[0, 1]`.
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub movie_title: Option<String>,
    pub user_id: Option<String>,
    pub model_version: String,
}

/// A result as read back from the store, carrying its record id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResult {
    #[serde(rename = "_id")]
    pub id: RecordId,
    #[serde(flatten)]
    pub result: SentimentResult,
}

/// Aggregate counts over every stored result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentStats {
    pub total: u64,
    pub positive_count: u64,
    pub negative_count: u64,
    pub positive_percentage: f64,
    pub average_confidence: f64,
}

impl SentimentStats {
    /// Derive the percentage and rounded mean from raw aggregates.
    pub fn from_counts(
        total: u64,
        positive_count: u64,
        negative_count: u64,
        average_confidence: Option<f64>,
    ) -> Self {
        let positive_percentage = if total > 0 {
            positive_count as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let average_confidence = average_confidence
            .map(|avg| (avg * 1000.0).round() / 1000.0)
            .unwrap_or(0.0);

        Self {
            total,
            positive_count,
            negative_count,
            positive_percentage,
            average_confidence,
        }
    }
}
