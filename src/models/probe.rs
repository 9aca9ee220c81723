//! Probe outcomes from a single access test.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Failure class of a probe or attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection, timeout or TLS failure.
    Transport,
    /// Server answered with status >= 400.
    HttpStatus,
    /// Browser never reached DOMContentLoaded.
    Navigation,
    /// Transport succeeded but the page is a bot wall.
    Blocked,
    /// The encompassing run was cancelled mid-attempt.
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::HttpStatus => "http_status",
            Self::Navigation => "navigation",
            Self::Blocked => "blocked",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "transport" => Some(Self::Transport),
            "http_status" => Some(Self::HttpStatus),
            "navigation" => Some(Self::Navigation),
            "blocked" => Some(Self::Blocked),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one access test against a URL with one transport class.
///
/// Exactly one of `succeeded` or `error_kind` holds. `bot_detected` is
/// independent: a page can render fine and still be a bot wall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub succeeded: bool,
    pub status_code: u16,
    pub load_time_ms: u64,
    pub final_url: String,
    pub title: String,
    pub content_type: String,
    /// Size of the fetched body in bytes.
    pub content_length: u64,
    /// Response headers with lowercased names.
    pub response_headers: HashMap<String, String>,
    pub bot_detected: bool,
    pub error_kind: Option<ErrorKind>,
    /// Human-readable detail for failed probes.
    pub error_message: Option<String>,
}

impl ProbeResult {
    /// A probe that reached the page.
    pub fn success(status_code: u16, final_url: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            status_code,
            load_time_ms: 0,
            final_url: final_url.into(),
            title: String::new(),
            content_type: String::new(),
            content_length: 0,
            response_headers: HashMap::new(),
            bot_detected: false,
            error_kind: None,
            error_message: None,
        }
    }

    /// A probe that failed with the given error class.
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            status_code: 0,
            load_time_ms: 0,
            final_url: String::new(),
            title: String::new(),
            content_type: String::new(),
            content_length: 0,
            response_headers: HashMap::new(),
            bot_detected: false,
            error_kind: Some(kind),
            error_message: Some(message.into()),
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_final_url(mut self, final_url: impl Into<String>) -> Self {
        self.final_url = final_url.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.response_headers
            .insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.response_headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        self
    }

    pub fn with_bot_detected(mut self, bot_detected: bool) -> Self {
        self.bot_detected = bot_detected;
        self
    }

    pub fn with_load_time(mut self, load_time_ms: u64) -> Self {
        self.load_time_ms = load_time_ms;
        self
    }

    pub fn with_content_length(mut self, content_length: u64) -> Self {
        self.content_length = content_length;
        self
    }

    /// Page size in whole kilobytes.
    pub fn page_size_kb(&self) -> u64 {
        self.content_length / 1024
    }

    /// Check for a header by name, ignoring case.
    pub fn has_header(&self, name: &str) -> bool {
        self.response_headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_has_no_error_kind() {
        let probe = ProbeResult::success(200, "https://example.com/");
        assert!(probe.succeeded);
        assert!(probe.error_kind.is_none());
    }

    #[test]
    fn test_failure_has_error_kind() {
        let probe = ProbeResult::failure(ErrorKind::HttpStatus, "HTTP 403").with_status(403);
        assert!(!probe.succeeded);
        assert_eq!(probe.error_kind, Some(ErrorKind::HttpStatus));
        assert_eq!(probe.status_code, 403);
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let probe = ProbeResult::success(200, "https://example.com/").with_header("Retry-After", "30");
        assert!(probe.has_header("retry-after"));
        assert!(probe.has_header("RETRY-AFTER"));
    }

    #[test]
    fn test_error_kind_round_trip() {
        for kind in [
            ErrorKind::Transport,
            ErrorKind::HttpStatus,
            ErrorKind::Navigation,
            ErrorKind::Blocked,
            ErrorKind::Cancelled,
        ] {
            assert_eq!(ErrorKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(ErrorKind::from_str("nope"), None);
    }
}
