//! Append-only SQLite log of escalation attempts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use rusqlite::{params, Connection, ErrorCode, Row};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{parse_datetime, AttemptLog, Result, StoreError};
use crate::models::{group_runs, Attempt, ErrorKind, EscalationRun};

const COLUMNS: &str = "id, session_id, url, final_url, domain, title, meta_description, \
    content_summary, successful_method, attempt_number, proxy_used, succeeded, status_code, \
    load_time_ms, scraped_at, screenshot_path, error_message, error_kind";

/// SQLite-backed attempt store. Rows are inserted, never updated or deleted.
pub struct SqliteAttemptStore {
    db_path: PathBuf,
    /// Serializes appends from concurrent workers.
    write_lock: Mutex<()>,
}

impl SqliteAttemptStore {
    /// Open the store, creating it if missing. A file that is not a valid
    /// database is moved aside and replaced with an empty one.
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self {
            db_path: db_path.to_path_buf(),
            write_lock: Mutex::new(()),
        };

        match store.init_schema() {
            Ok(()) => {}
            Err(StoreError::Sqlite(e)) if is_corruption(&e) => {
                store.recreate()?;
                store.init_schema().map_err(|e| {
                    StoreError::Corrupt(format!("{}: {}", store.db_path.display(), e))
                })?;
            }
            Err(e) => return Err(e),
        }
        Ok(store)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS attempts (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                session_id TEXT NOT NULL,
                url TEXT NOT NULL,
                final_url TEXT NOT NULL,
                domain TEXT NOT NULL,
                title TEXT NOT NULL,
                meta_description TEXT NOT NULL,
                content_summary TEXT NOT NULL,
                successful_method TEXT NOT NULL,
                attempt_number INTEGER NOT NULL,
                proxy_used TEXT,
                succeeded INTEGER NOT NULL,
                status_code INTEGER NOT NULL,
                load_time_ms INTEGER NOT NULL,
                scraped_at TEXT NOT NULL,
                screenshot_path TEXT,
                error_message TEXT,
                error_kind TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_attempts_url_session ON attempts(url, session_id);
        "#,
        )?;
        Ok(())
    }

    /// Move a corrupt database aside so a fresh one can be created.
    fn recreate(&self) -> Result<()> {
        let aside = self.db_path.with_extension("db.corrupt");
        warn!(
            "Attempt store {} is corrupt, moving it to {}",
            self.db_path.display(),
            aside.display()
        );
        std::fs::rename(&self.db_path, &aside)?;
        for suffix in ["-wal", "-shm", "-journal"] {
            let mut sidecar = self.db_path.clone().into_os_string();
            sidecar.push(suffix);
            let _ = std::fs::remove_file(PathBuf::from(sidecar));
        }
        Ok(())
    }

    fn insert(&self, attempt: &Attempt) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            &format!(
                "INSERT INTO attempts ({}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                COLUMNS
            ),
            params![
                attempt.id,
                attempt.session_id,
                attempt.url,
                attempt.final_url,
                attempt.domain,
                attempt.title,
                attempt.meta_description,
                attempt.content_summary,
                attempt.strategy_name,
                attempt.strategy_ordinal as i64,
                attempt.proxy_used,
                attempt.succeeded,
                attempt.status_code as i64,
                attempt.load_time_ms as i64,
                attempt.scraped_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                attempt.screenshot_path,
                attempt.error_message,
                attempt.error_kind.map(|k| k.as_str()),
            ],
        )?;
        Ok(())
    }

    fn query(&self, sql_tail: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Attempt>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM attempts {}", COLUMNS, sql_tail))?;
        let attempts = stmt
            .query_map(args, row_to_attempt)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(attempts)
    }

    /// Every attempt in append order.
    pub fn all(&self) -> Result<Vec<Attempt>> {
        self.query("ORDER BY seq ASC", &[])
    }

    /// Most recent attempts first.
    pub fn recent(&self, limit: usize) -> Result<Vec<Attempt>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query("ORDER BY seq DESC LIMIT ?1", &[&limit])
    }

    /// Attempts for one URL in append order.
    pub fn for_url(&self, url: &str) -> Result<Vec<Attempt>> {
        self.query("WHERE url = ?1 ORDER BY seq ASC", &[&url])
    }

    /// Reconstruct the escalation runs for `url`, oldest first.
    pub fn runs_for(&self, url: &str) -> Result<Vec<EscalationRun>> {
        let attempts = self.query(
            "WHERE url = ?1 ORDER BY scraped_at ASC, attempt_number ASC, seq ASC",
            &[&url],
        )?;
        Ok(group_runs(attempts))
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM attempts", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Write the whole log to a CSV file. Returns the number of rows written.
    pub fn export_csv(&self, path: &Path) -> Result<usize> {
        let attempts = self.all()?;
        super::export::write_attempts_csv(&attempts, path)?;
        info!("Exported {} attempts to {}", attempts.len(), path.display());
        Ok(attempts.len())
    }
}

#[async_trait]
impl AttemptLog for SqliteAttemptStore {
    async fn append(&self, attempt: &Attempt) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match self.insert(attempt) {
            Err(StoreError::Sqlite(e)) if is_corruption(&e) => {
                self.recreate()?;
                self.init_schema().map_err(|e| {
                    StoreError::Corrupt(format!("{}: {}", self.db_path.display(), e))
                })?;
                self.insert(attempt)
            }
            other => other,
        }
    }
}

fn is_corruption(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt)
    )
}

fn row_to_attempt(row: &Row<'_>) -> rusqlite::Result<Attempt> {
    let error_kind: Option<String> = row.get("error_kind")?;
    Ok(Attempt {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        url: row.get("url")?,
        final_url: row.get("final_url")?,
        domain: row.get("domain")?,
        title: row.get("title")?,
        meta_description: row.get("meta_description")?,
        content_summary: row.get("content_summary")?,
        strategy_ordinal: row.get::<_, i64>("attempt_number")? as u8,
        strategy_name: row.get("successful_method")?,
        proxy_used: row.get("proxy_used")?,
        succeeded: row.get("succeeded")?,
        status_code: row.get::<_, i64>("status_code")? as u16,
        load_time_ms: row.get::<_, i64>("load_time_ms")? as u64,
        scraped_at: parse_datetime(&row.get::<_, String>("scraped_at")?),
        screenshot_path: row.get("screenshot_path")?,
        error_message: row.get("error_message")?,
        error_kind: error_kind.as_deref().and_then(ErrorKind::from_str),
    })
}
