//! Escalation attempts and the ladder rungs that produce them.

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use super::ErrorKind;
use crate::utils::domain_of;

/// Label recorded when the domain-alternate retry succeeds.
pub const RELOCATED_STEALTH_LABEL: &str = "domain_verification+stealth_browser";

/// Label recorded on the final row of an exhausted run.
pub const EXHAUSTED_LABEL: &str = "none";

/// One rung of the escalation ladder, in ascending cost order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    PlainHttp,
    EnhancedHttp,
    RenderedBrowser,
    StealthBrowser,
    DomainVerification,
}

impl Strategy {
    /// All rungs in ladder order.
    pub const LADDER: [Strategy; 5] = [
        Strategy::PlainHttp,
        Strategy::EnhancedHttp,
        Strategy::RenderedBrowser,
        Strategy::StealthBrowser,
        Strategy::DomainVerification,
    ];

    /// 1-based position on the ladder.
    pub fn ordinal(&self) -> u8 {
        match self {
            Self::PlainHttp => 1,
            Self::EnhancedHttp => 2,
            Self::RenderedBrowser => 3,
            Self::StealthBrowser => 4,
            Self::DomainVerification => 5,
        }
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::LADDER.get(ordinal.checked_sub(1)? as usize).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainHttp => "plain_http",
            Self::EnhancedHttp => "enhanced_http",
            Self::RenderedBrowser => "rendered_browser",
            Self::StealthBrowser => "stealth_browser",
            Self::DomainVerification => "domain_verification",
        }
    }

    /// Browser-based rungs write screenshots.
    pub fn uses_browser(&self) -> bool {
        matches!(self, Self::RenderedBrowser | Self::StealthBrowser)
    }

    /// Next rung, or None after the last.
    pub fn next(&self) -> Option<Self> {
        Self::from_ordinal(self.ordinal() + 1)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution of one transport adapter against one URL.
///
/// Immutable once appended to the attempt store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: String,
    pub session_id: String,
    pub url: String,
    pub final_url: String,
    pub domain: String,
    pub title: String,
    pub meta_description: String,
    pub content_summary: String,
    pub strategy_ordinal: u8,
    /// Persisted as `successful_method`.
    pub strategy_name: String,
    pub proxy_used: Option<String>,
    pub succeeded: bool,
    pub status_code: u16,
    pub load_time_ms: u64,
    pub scraped_at: DateTime<Utc>,
    pub screenshot_path: Option<String>,
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl Attempt {
    /// Start a record for `strategy` against `url`. Defaults to a failure
    /// with no detail until the adapter fills it in.
    pub fn new(url: &str, strategy: Strategy) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: String::new(),
            url: url.to_string(),
            final_url: url.to_string(),
            domain: domain_of(url),
            title: String::new(),
            meta_description: String::new(),
            content_summary: String::new(),
            strategy_ordinal: strategy.ordinal(),
            strategy_name: strategy.as_str().to_string(),
            proxy_used: None,
            succeeded: false,
            status_code: 0,
            load_time_ms: 0,
            // Microseconds, the precision the attempt log stores
            scraped_at: Utc::now().trunc_subsecs(6),
            screenshot_path: None,
            error_message: None,
            error_kind: None,
        }
    }

    pub fn with_proxy(mut self, proxy: Option<&str>) -> Self {
        self.proxy_used = proxy.map(|p| p.to_string());
        self
    }

    pub fn with_session(mut self, session_id: &str) -> Self {
        self.session_id = session_id.to_string();
        self
    }

    /// Mark as failed with a classified error.
    pub fn fail(mut self, kind: ErrorKind, message: impl Into<String>) -> Self {
        self.succeeded = false;
        self.error_kind = Some(kind);
        self.error_message = Some(message.into());
        self
    }

    /// Mark as succeeded, clearing any error.
    pub fn succeed(mut self) -> Self {
        self.succeeded = true;
        self.error_kind = None;
        self.error_message = None;
        self
    }

    pub fn relabel(mut self, label: &str) -> Self {
        self.strategy_name = label.to_string();
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.error_kind == Some(ErrorKind::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_ordinals() {
        let ordinals: Vec<u8> = Strategy::LADDER.iter().map(|s| s.ordinal()).collect();
        assert_eq!(ordinals, vec![1, 2, 3, 4, 5]);
        assert_eq!(Strategy::from_ordinal(0), None);
        assert_eq!(Strategy::from_ordinal(4), Some(Strategy::StealthBrowser));
        assert_eq!(Strategy::from_ordinal(6), None);
    }

    #[test]
    fn test_next_walks_ladder() {
        assert_eq!(Strategy::PlainHttp.next(), Some(Strategy::EnhancedHttp));
        assert_eq!(Strategy::DomainVerification.next(), None);
    }

    #[test]
    fn test_new_attempt_defaults() {
        let attempt = Attempt::new("https://www.example.com/page", Strategy::RenderedBrowser);
        assert_eq!(attempt.strategy_ordinal, 3);
        assert_eq!(attempt.strategy_name, "rendered_browser");
        assert_eq!(attempt.domain, "www.example.com");
        assert_eq!(attempt.final_url, "https://www.example.com/page");
        assert!(!attempt.succeeded);
        assert!(attempt.proxy_used.is_none());
    }

    #[test]
    fn test_fail_then_succeed_clears_error() {
        let attempt = Attempt::new("https://example.com", Strategy::PlainHttp)
            .fail(ErrorKind::Transport, "connection refused")
            .succeed();
        assert!(attempt.succeeded);
        assert!(attempt.error_kind.is_none());
        assert!(attempt.error_message.is_none());
    }
}
