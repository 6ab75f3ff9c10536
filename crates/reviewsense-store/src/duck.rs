//! DuckDB-backed store holding both collections in one database.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::{Connection, OptionalExt, Row, params};
use reviewsense_core::{
    IncomingReview, ProcessingStatus, RecordId, ReviewSubmission, SentimentLabel, SentimentResult,
    SentimentStats, StoredResult,
};
use tracing::{debug, info};

use crate::{IncomingStore, Page, ResultStore, StoreError};

const SCHEMA: &str = "
CREATE SEQUENCE IF NOT EXISTS sentiment_analysis_id_seq START 1;
CREATE TABLE IF NOT EXISTS sentiment_analysis (
    id            BIGINT PRIMARY KEY DEFAULT nextval('sentiment_analysis_id_seq'),
    review        VARCHAR NOT NULL,
    sentiment     VARCHAR NOT NULL CHECK (sentiment IN ('POSITIVE', 'NEGATIVE')),
    confidence    DOUBLE NOT NULL CHECK (confidence >= 0 AND confidence <= 1),
    created_at    VARCHAR NOT NULL,
    movie_title   VARCHAR,
    user_id       VARCHAR,
    model_version VARCHAR NOT NULL
);
CREATE SEQUENCE IF NOT EXISTS incoming_reviews_id_seq START 1;
CREATE TABLE IF NOT EXISTS incoming_reviews (
    id           BIGINT PRIMARY KEY DEFAULT nextval('incoming_reviews_id_seq'),
    review       VARCHAR NOT NULL,
    movie_title  VARCHAR,
    user_id      VARCHAR,
    created_at   VARCHAR NOT NULL,
    status       VARCHAR NOT NULL DEFAULT 'unprocessed',
    sentiment    VARCHAR,
    confidence   DOUBLE,
    error        VARCHAR,
    claimed_at   VARCHAR,
    processed_at VARCHAR
);
";

const RESULT_COLUMNS: &str =
    "id, review, sentiment, confidence, created_at, movie_title, user_id, model_version";

const INCOMING_COLUMNS: &str = "id, review, movie_title, user_id, created_at, status, \
     sentiment, confidence, error, processed_at";

/// DuckDB store for the `sentiment_analysis` and `incoming_reviews` tables.
///
/// Supports both in-memory (ephemeral) and persistent (file-backed) modes.
/// The single connection sits behind a mutex and every call runs on the
/// blocking pool, so the store can be shared across request handlers.
#[derive(Clone)]
pub struct DuckStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let store = Self::init(Connection::open(path)?)?;
        info!(path = %path.display(), "opened persistent store");
        Ok(store)
    }

    /// Open from a configured location: `:memory:` or a file path.
    pub fn open_location(location: &str) -> Result<Self, StoreError> {
        if location == ":memory:" {
            Self::open()
        } else {
            Self::open_persistent(Path::new(location))
        }
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Other("connection lock poisoned".into()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Other(format!("store task failed: {e}")))?
    }

    /// Like [`with_conn`](Self::with_conn), but skips `f` entirely when the
    /// connection is not free within `timeout`.
    async fn with_conn_within<T, F>(&self, timeout: Duration, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let deadline = Instant::now().checked_add(timeout);
        self.with_conn(move |conn| {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(StoreError::Timeout(timeout));
            }
            f(conn)
        })
        .await
    }

    // ── Counts ──

    /// Number of rows in `sentiment_analysis`.
    pub async fn result_count(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| count_table(conn, "sentiment_analysis"))
            .await
    }

    /// Number of rows in `incoming_reviews`.
    pub async fn incoming_count(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| count_table(conn, "incoming_reviews"))
            .await
    }
}

#[async_trait]
impl ResultStore for DuckStore {
    async fn insert(
        &self,
        result: &SentimentResult,
        timeout: Duration,
    ) -> Result<RecordId, StoreError> {
        let result = result.clone();
        let id = self
            .with_conn_within(timeout, move |conn| {
                let id: RecordId = conn.query_row(
                    "INSERT INTO sentiment_analysis
                        (review, sentiment, confidence, created_at, movie_title, user_id, model_version)
                     VALUES (?, ?, ?, ?, ?, ?, ?)
                     RETURNING id",
                    params![
                        result.review,
                        result.sentiment.as_str(),
                        result.confidence,
                        format_ts(&result.timestamp),
                        result.movie_title,
                        result.user_id,
                        result.model_version,
                    ],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await?;
        debug!(id, "inserted sentiment result");
        Ok(id)
    }

    async fn list(&self, page: Page) -> Result<Vec<StoredResult>, StoreError> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {RESULT_COLUMNS} FROM sentiment_analysis ORDER BY id DESC LIMIT {} OFFSET {}",
                page.limit, page.skip
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], RawResult::from_row)?;
            rows.map(|raw| raw.map_err(StoreError::from).and_then(RawResult::into_stored))
                .collect()
        })
        .await
    }

    async fn stats(&self) -> Result<SentimentStats, StoreError> {
        self.with_conn(|conn| {
            let (total, positive, negative, avg): (i64, i64, i64, Option<f64>) = conn.query_row(
                "SELECT
                    count(*)::BIGINT,
                    count(*) FILTER (WHERE sentiment = 'POSITIVE'),
                    count(*) FILTER (WHERE sentiment = 'NEGATIVE'),
                    avg(confidence)
                 FROM sentiment_analysis",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;
            Ok(SentimentStats::from_counts(
                total as u64,
                positive as u64,
                negative as u64,
                avg,
            ))
        })
        .await
    }
}

#[async_trait]
impl IncomingStore for DuckStore {
    async fn insert_incoming(
        &self,
        submission: &ReviewSubmission,
    ) -> Result<IncomingReview, StoreError> {
        let submission = submission.clone();
        let created_at = Utc::now();
        let record = self
            .with_conn(move |conn| {
                let id: RecordId = conn.query_row(
                    "INSERT INTO incoming_reviews (review, movie_title, user_id, created_at)
                     VALUES (?, ?, ?, ?)
                     RETURNING id",
                    params![
                        submission.review,
                        submission.movie_title,
                        submission.user_id,
                        format_ts(&created_at),
                    ],
                    |row| row.get(0),
                )?;
                fetch_incoming(conn, id)
            })
            .await?;
        info!(id = record.id, "inserted incoming review");
        Ok(record)
    }

    async fn get_incoming(&self, id: RecordId) -> Result<IncomingReview, StoreError> {
        self.with_conn(move |conn| fetch_incoming(conn, id)).await
    }

    async fn claim_incoming(&self, id: RecordId) -> Result<(), StoreError> {
        let claimed_at = format_ts(&Utc::now());
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE incoming_reviews SET claimed_at = ?
                 WHERE id = ? AND status = 'unprocessed' AND claimed_at IS NULL",
                params![claimed_at, id],
            )?;
            ensure_transitioned(conn, id, changed)
        })
        .await?;
        debug!(id, "claimed incoming review");
        Ok(())
    }

    async fn list_incoming(&self, page: Page) -> Result<Vec<IncomingReview>, StoreError> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {INCOMING_COLUMNS} FROM incoming_reviews ORDER BY id DESC LIMIT {} OFFSET {}",
                page.limit, page.skip
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], RawIncoming::from_row)?;
            rows.map(|raw| raw.map_err(StoreError::from).and_then(RawIncoming::into_record))
                .collect()
        })
        .await
    }

    async fn mark_processed(
        &self,
        id: RecordId,
        sentiment: SentimentLabel,
        confidence: f64,
    ) -> Result<(), StoreError> {
        let processed_at = format_ts(&Utc::now());
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE incoming_reviews
                 SET status = 'processed', sentiment = ?, confidence = ?, error = NULL, processed_at = ?
                 WHERE id = ? AND status = 'unprocessed'",
                params![sentiment.as_str(), confidence, processed_at, id],
            )?;
            ensure_transitioned(conn, id, changed)
        })
        .await?;
        info!(id, %sentiment, confidence, "incoming review processed");
        Ok(())
    }

    async fn mark_failed(&self, id: RecordId, error: &str) -> Result<(), StoreError> {
        let error = error.to_string();
        let processed_at = format_ts(&Utc::now());
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE incoming_reviews
                 SET status = 'failed', error = ?, processed_at = ?
                 WHERE id = ? AND status = 'unprocessed'",
                params![error, processed_at, id],
            )?;
            ensure_transitioned(conn, id, changed)
        })
        .await?;
        info!(id, "incoming review failed");
        Ok(())
    }
}

// ── Row mapping ──

/// Columns as read from DuckDB, before domain validation.
struct RawResult {
    id: RecordId,
    review: String,
    sentiment: String,
    confidence: f64,
    created_at: String,
    movie_title: Option<String>,
    user_id: Option<String>,
    model_version: String,
}

impl RawResult {
    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            review: row.get(1)?,
            sentiment: row.get(2)?,
            confidence: row.get(3)?,
            created_at: row.get(4)?,
            movie_title: row.get(5)?,
            user_id: row.get(6)?,
            model_version: row.get(7)?,
        })
    }

    fn into_stored(self) -> Result<StoredResult, StoreError> {
        let sentiment = self
            .sentiment
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("result {}: {e}", self.id)))?;
        Ok(StoredResult {
            id: self.id,
            result: SentimentResult {
                review: self.review,
                sentiment,
                confidence: self.confidence,
                timestamp: parse_ts(&self.created_at)?,
                movie_title: self.movie_title,
                user_id: self.user_id,
                model_version: self.model_version,
            },
        })
    }
}

struct RawIncoming {
    id: RecordId,
    review: String,
    movie_title: Option<String>,
    user_id: Option<String>,
    created_at: String,
    status: String,
    sentiment: Option<String>,
    confidence: Option<f64>,
    error: Option<String>,
    processed_at: Option<String>,
}

impl RawIncoming {
    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            review: row.get(1)?,
            movie_title: row.get(2)?,
            user_id: row.get(3)?,
            created_at: row.get(4)?,
            status: row.get(5)?,
            sentiment: row.get(6)?,
            confidence: row.get(7)?,
            error: row.get(8)?,
            processed_at: row.get(9)?,
        })
    }

    fn into_record(self) -> Result<IncomingReview, StoreError> {
        let id = self.id;
        let status: ProcessingStatus = self
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("incoming {id}: {e}")))?;
        let sentiment = self
            .sentiment
            .map(|s| s.parse::<SentimentLabel>())
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("incoming {id}: {e}")))?;
        let processed_at = self.processed_at.as_deref().map(parse_ts).transpose()?;

        Ok(IncomingReview {
            id,
            review: self.review,
            movie_title: self.movie_title,
            user_id: self.user_id,
            created_at: parse_ts(&self.created_at)?,
            status,
            sentiment,
            confidence: self.confidence,
            error: self.error,
            processed_at,
        })
    }
}

fn fetch_incoming(conn: &Connection, id: RecordId) -> Result<IncomingReview, StoreError> {
    let sql = format!("SELECT {INCOMING_COLUMNS} FROM incoming_reviews WHERE id = ?");
    conn.query_row(&sql, params![id], RawIncoming::from_row)
        .optional()?
        .ok_or(StoreError::NotFound(id))?
        .into_record()
}

/// Explain why an update guarded on an unfinished record touched no rows.
fn ensure_transitioned(conn: &Connection, id: RecordId, changed: usize) -> Result<(), StoreError> {
    if changed > 0 {
        return Ok(());
    }
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM incoming_reviews WHERE id = ?",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    match status {
        None => Err(StoreError::NotFound(id)),
        Some(s) => {
            let status: ProcessingStatus = s
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("incoming {id}: {e}")))?;
            if status.is_terminal() {
                Err(StoreError::AlreadyFinal { id, status })
            } else {
                Err(StoreError::AlreadyClaimed(id))
            }
        }
    }
}

fn count_table(conn: &Connection, table: &str) -> Result<usize, StoreError> {
    let sql = format!("SELECT count(*)::BIGINT AS cnt FROM {table}");
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(count as usize)
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {s:?}: {e}")))
}
