//! CSV export of the attempt log.

use std::path::Path;

use serde::Serialize;

use super::Result;
use crate::models::Attempt;

/// One CSV row. Column order is the persisted attempt schema followed by
/// `succeeded` and `error_kind`.
#[derive(Debug, Serialize)]
struct AttemptRow<'a> {
    id: &'a str,
    session_id: &'a str,
    url: &'a str,
    final_url: &'a str,
    domain: &'a str,
    title: &'a str,
    meta_description: &'a str,
    content_summary: &'a str,
    successful_method: &'a str,
    attempt_number: u8,
    proxy_used: &'a str,
    status_code: u16,
    load_time_ms: u64,
    scraped_at: String,
    screenshot_path: &'a str,
    error_message: &'a str,
    succeeded: bool,
    error_kind: &'a str,
}

impl<'a> From<&'a Attempt> for AttemptRow<'a> {
    fn from(a: &'a Attempt) -> Self {
        Self {
            id: &a.id,
            session_id: &a.session_id,
            url: &a.url,
            final_url: &a.final_url,
            domain: &a.domain,
            title: &a.title,
            meta_description: &a.meta_description,
            content_summary: &a.content_summary,
            successful_method: &a.strategy_name,
            attempt_number: a.strategy_ordinal,
            proxy_used: a.proxy_used.as_deref().unwrap_or(""),
            status_code: a.status_code,
            load_time_ms: a.load_time_ms,
            scraped_at: a.scraped_at.to_rfc3339(),
            screenshot_path: a.screenshot_path.as_deref().unwrap_or(""),
            error_message: a.error_message.as_deref().unwrap_or(""),
            succeeded: a.succeeded,
            error_kind: a.error_kind.map(|k| k.as_str()).unwrap_or(""),
        }
    }
}

/// Write attempts to `path`, header first.
pub fn write_attempts_csv(attempts: &[Attempt], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(path)?;
    for attempt in attempts {
        writer.serialize(AttemptRow::from(attempt))?;
    }
    writer.flush()?;
    Ok(())
}
