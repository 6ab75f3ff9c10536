//! `reviewsense import`: classify a labelled review set through a running server.
//!
//! Input is JSON Lines. Each review goes through `POST /predict`, so results
//! land in the store exactly as single predictions do. A bad line or a failed
//! call is counted and skipped; the run carries on.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use reviewsense_core::{ReviewSubmission, SentimentLabel};
use reviewsense_sync::PredictClient;
use serde::Deserialize;
use tracing::{info, warn};

const PROGRESS_EVERY: usize = 10;

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// JSON Lines file, or `-` for stdin.
    pub file: PathBuf,

    /// Stop after this many reviews.
    #[arg(long)]
    pub limit: Option<usize>,
}

/// One line of an import file.
///
/// `text` is accepted in place of `review`. `label` follows the IMDB
/// convention: 0 is negative, 1 is positive.
#[derive(Debug, Deserialize)]
struct ImportLine {
    #[serde(alias = "text")]
    review: String,
    #[serde(default)]
    label: Option<u8>,
    #[serde(default)]
    movie_title: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

impl ImportLine {
    fn expected(&self) -> Option<SentimentLabel> {
        match self.label? {
            0 => Some(SentimentLabel::Negative),
            1 => Some(SentimentLabel::Positive),
            _ => None,
        }
    }

    fn into_submission(self) -> ReviewSubmission {
        ReviewSubmission {
            review: self.review,
            movie_title: self.movie_title,
            user_id: self.user_id,
        }
    }
}

/// Counts from one import run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub processed: usize,
    pub failed: usize,
    /// Processed reviews that carried a usable label.
    pub labelled: usize,
    /// Labelled reviews where the model matched the label.
    pub agreed: usize,
}

impl ImportSummary {
    pub fn agreement(&self) -> Option<f64> {
        (self.labelled > 0).then(|| self.agreed as f64 / self.labelled as f64)
    }
}

pub fn read_input(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading reviews from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("reading import file {}", path.display()))
    }
}

/// Send every non-blank line of `input` through `/predict`.
pub async fn import_lines(
    client: &PredictClient,
    input: &str,
    limit: Option<usize>,
) -> ImportSummary {
    let mut summary = ImportSummary::default();
    let lines = input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .take(limit.unwrap_or(usize::MAX));

    for (seen, (idx, line)) in lines.enumerate() {
        let lineno = idx + 1;
        match serde_json::from_str::<ImportLine>(line) {
            Ok(entry) => {
                let expected = entry.expected();
                match client.predict(&entry.into_submission()).await {
                    Ok(result) => {
                        summary.processed += 1;
                        if let Some(expected) = expected {
                            summary.labelled += 1;
                            if result.sentiment == expected {
                                summary.agreed += 1;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(line = lineno, error = %e, "prediction failed");
                        summary.failed += 1;
                    }
                }
            }
            Err(e) => {
                warn!(line = lineno, error = %e, "skipping malformed line");
                summary.failed += 1;
            }
        }

        if (seen + 1) % PROGRESS_EVERY == 0 {
            info!(count = seen + 1, "imported reviews");
        }
    }

    info!(
        processed = summary.processed,
        failed = summary.failed,
        "import finished"
    );
    summary
}
