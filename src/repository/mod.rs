//! Attempt persistence.
//!
//! The store is append-only: rows are never updated or deleted, and appends
//! are serialized so concurrent workers cannot interleave rows.

mod attempt_store;
mod export;

pub use attempt_store::SqliteAttemptStore;
pub use export::write_attempts_csv;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::Attempt;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("attempt store is corrupt: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Destination for attempts as the controller produces them.
#[async_trait]
pub trait AttemptLog: Send + Sync {
    async fn append(&self, attempt: &Attempt) -> Result<()>;
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}
