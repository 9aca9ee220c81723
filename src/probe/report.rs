//! Probe report CSV, URL input files, and the worklist built from reports.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;
use tracing::warn;

use crate::models::{ProbeRecord, WorkItem};
use crate::utils::normalize_url;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} has no URL list (expected a `business_sites` array or a JSON array)")]
    NoUrls { path: PathBuf },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Load target URLs from a JSON object with a `business_sites` array, a JSON
/// array of strings, or a text file with one URL per line. URLs without a
/// scheme get `https://`.
pub fn load_urls(path: &Path) -> Result<Vec<String>, ReportError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ReportError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let trimmed = contents.trim_start();
    let is_json = path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json"))
        || trimmed.starts_with('{')
        || trimmed.starts_with('[');

    let raw: Vec<String> = if is_json {
        let value: serde_json::Value =
            serde_json::from_str(&contents).map_err(|source| ReportError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        let list = match &value {
            serde_json::Value::Object(map) => map.get("business_sites").and_then(|v| v.as_array()),
            serde_json::Value::Array(items) => Some(items),
            _ => None,
        }
        .ok_or_else(|| ReportError::NoUrls {
            path: path.to_path_buf(),
        })?;
        list.iter()
            .filter_map(|v| v.as_str())
            .map(String::from)
            .collect()
    } else {
        contents.lines().map(String::from).collect()
    };

    Ok(raw
        .iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty() && !u.starts_with('#'))
        .map(normalize_url)
        .collect())
}

/// `<dir>/site_access_report_<YYYYmmdd_HHMMSS>.csv`
pub fn default_report_path(reports_dir: &Path) -> PathBuf {
    reports_dir.join(format!(
        "site_access_report_{}.csv",
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

pub fn write_probe_report(records: &[ProbeRecord], path: &Path) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a probe report. Rows that fail to parse are logged and skipped; only
/// an unreadable file is an error.
pub fn read_probe_report(path: &Path) -> Result<Vec<ProbeRecord>, ReportError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for (row, result) in reader.deserialize::<ProbeRecord>().enumerate() {
        match result {
            Ok(record) => records.push(record),
            // Row 1 is the header
            Err(e) => warn!("Skipping malformed row {} of {}: {}", row + 2, path.display(), e),
        }
    }
    Ok(records)
}

/// Sites the probe reached, each paired with the recommended method when it
/// maps to a single rung. Rows whose method needs escalation are left out.
pub fn scrape_list(records: &[ProbeRecord]) -> Vec<WorkItem> {
    records
        .iter()
        .filter(|r| r.request_accessible() || r.browser_accessible())
        .map(WorkItem::from)
        .filter(|item| match item.method.and_then(|m| m.direct_strategy()) {
            Some(_) => true,
            None => {
                warn!(
                    "Skipping {}: no direct method for {:?}",
                    item.url,
                    item.method.map(|m| m.as_str())
                );
                false
            }
        })
        .collect()
}

/// Work items for the escalation controller. Without `include_all`, only
/// sites that plain methods failed on are kept.
pub fn worklist(records: &[ProbeRecord], include_all: bool) -> Vec<WorkItem> {
    records
        .iter()
        .map(WorkItem::from)
        .filter(|item| include_all || item.is_eligible())
        .collect()
}

/// Totals printed after a probe batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeSummary {
    pub total: usize,
    pub request_accessible: usize,
    pub browser_accessible: usize,
    pub bot_detected: usize,
    /// Recommended method counts, in first-seen order.
    pub methods: Vec<(String, usize)>,
}

impl ProbeSummary {
    pub fn from_records(records: &[ProbeRecord]) -> Self {
        let mut summary = Self {
            total: records.len(),
            ..Self::default()
        };
        let mut positions: HashMap<&str, usize> = HashMap::new();

        for record in records {
            summary.request_accessible += usize::from(record.request_accessible());
            summary.browser_accessible += usize::from(record.browser_accessible());
            summary.bot_detected += usize::from(record.bot_detected());

            match positions.get(record.scrape_method.as_str()) {
                Some(&i) => summary.methods[i].1 += 1,
                None => {
                    positions.insert(&record.scrape_method, summary.methods.len());
                    summary.methods.push((record.scrape_method.clone(), 1));
                }
            }
        }
        summary
    }
}
