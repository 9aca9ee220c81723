//! Probe report rows and the escalation worklist built from them.

use serde::{Deserialize, Serialize};

use super::{ProbeResult, ScrapeMethod, StrategyRecommendation};

/// One row of the probe report (one row per tested URL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeRecord {
    pub url: String,
    pub status: String,
    pub request_access: String,
    pub request_status_code: u16,
    pub browser_access: String,
    pub bot_detection: String,
    pub load_time_ms: u64,
    pub page_size_kb: u64,
    pub title: String,
    pub redirect_url: String,
    pub scrape_method: String,
    pub special_handling: String,
}

fn yes_no(flag: bool) -> String {
    if flag { "Yes" } else { "No" }.to_string()
}

impl ProbeRecord {
    /// Summarize both probes and their recommendation into a report row.
    pub fn from_probes(
        url: &str,
        plain: &ProbeResult,
        rendered: &ProbeResult,
        recommendation: &StrategyRecommendation,
    ) -> Self {
        let status = if plain.succeeded || rendered.succeeded {
            "Success"
        } else {
            "Failed"
        };

        let load_time_ms = if plain.succeeded {
            plain.load_time_ms
        } else {
            rendered.load_time_ms
        };

        let title = if !plain.title.is_empty() {
            plain.title.clone()
        } else if !rendered.title.is_empty() {
            rendered.title.clone()
        } else {
            "Unknown".to_string()
        };

        let redirect_url = [plain.final_url.as_str(), rendered.final_url.as_str()]
            .into_iter()
            .find(|u| !u.is_empty())
            .unwrap_or(url)
            .to_string();

        Self {
            url: url.to_string(),
            status: status.to_string(),
            request_access: yes_no(plain.succeeded),
            request_status_code: plain.status_code,
            browser_access: yes_no(rendered.succeeded),
            bot_detection: yes_no(rendered.bot_detected),
            load_time_ms,
            page_size_kb: plain.page_size_kb(),
            title,
            redirect_url,
            scrape_method: recommendation.recommended_method.as_str().to_string(),
            special_handling: recommendation.joined_notes(),
        }
    }

    pub fn request_accessible(&self) -> bool {
        self.request_access.eq_ignore_ascii_case("yes")
    }

    pub fn browser_accessible(&self) -> bool {
        self.browser_access.eq_ignore_ascii_case("yes")
    }

    pub fn bot_detected(&self) -> bool {
        self.bot_detection.eq_ignore_ascii_case("yes")
    }
}

/// A target URL for the escalation controller, optionally annotated by a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub url: String,
    /// Whether the plain probe reached the site (None if never probed).
    pub request_access: Option<bool>,
    pub method: Option<ScrapeMethod>,
    /// Free-text notes, carried through untouched.
    pub special_handling: String,
}

impl WorkItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_access: None,
            method: None,
            special_handling: String::new(),
        }
    }

    /// Only sites flagged as failed by plain methods are escalated.
    pub fn is_eligible(&self) -> bool {
        self.request_access == Some(false)
            || self.method.is_some_and(|m| m.needs_escalation())
    }
}

impl From<&ProbeRecord> for WorkItem {
    fn from(record: &ProbeRecord) -> Self {
        Self {
            url: record.url.clone(),
            request_access: Some(record.request_accessible()),
            method: ScrapeMethod::from_str(&record.scrape_method),
            special_handling: record.special_handling.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;

    fn recommendation(method: ScrapeMethod, notes: &[&str]) -> StrategyRecommendation {
        StrategyRecommendation {
            recommended_method: method,
            notes: notes.iter().map(|n| n.to_string()).collect(),
        }
    }

    #[test]
    fn test_record_prefers_plain_probe_fields() {
        let plain = ProbeResult::success(200, "https://example.com/home")
            .with_title("Home")
            .with_load_time(120)
            .with_content_length(4096);
        let rendered = ProbeResult::success(200, "https://example.com/other")
            .with_title("Rendered")
            .with_load_time(900);
        let record = ProbeRecord::from_probes(
            "https://example.com",
            &plain,
            &rendered,
            &recommendation(ScrapeMethod::PlainHttp, &[]),
        );

        assert_eq!(record.status, "Success");
        assert_eq!(record.request_access, "Yes");
        assert_eq!(record.load_time_ms, 120);
        assert_eq!(record.page_size_kb, 4);
        assert_eq!(record.title, "Home");
        assert_eq!(record.redirect_url, "https://example.com/home");
        assert_eq!(record.special_handling, "");
    }

    #[test]
    fn test_record_falls_back_to_rendered_probe() {
        let plain = ProbeResult::failure(ErrorKind::Transport, "refused");
        let rendered = ProbeResult::success(200, "https://example.com/")
            .with_title("Rendered")
            .with_load_time(900);
        let record = ProbeRecord::from_probes(
            "https://example.com",
            &plain,
            &rendered,
            &recommendation(ScrapeMethod::RenderedBrowser, &["a", "b"]),
        );

        assert_eq!(record.request_access, "No");
        assert_eq!(record.browser_access, "Yes");
        assert_eq!(record.load_time_ms, 900);
        assert_eq!(record.title, "Rendered");
        assert_eq!(record.special_handling, "a; b");
    }

    #[test]
    fn test_work_item_eligibility() {
        let mut item = WorkItem::new("https://example.com");
        assert!(!item.is_eligible());

        item.request_access = Some(true);
        item.method = Some(ScrapeMethod::PlainHttp);
        assert!(!item.is_eligible());

        item.method = Some(ScrapeMethod::StealthBrowser);
        assert!(item.is_eligible());

        item.method = Some(ScrapeMethod::EnhancedHttp);
        item.request_access = Some(false);
        assert!(item.is_eligible());
    }
}
