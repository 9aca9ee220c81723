//! Strategy recommendation derived from a pair of probes.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Strategy;

/// Retrieval method recommended for a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeMethod {
    PlainHttp,
    EnhancedHttp,
    RenderedBrowser,
    StealthBrowser,
    NeedsInvestigation,
    StructuredData,
}

impl ScrapeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainHttp => "plain_http",
            Self::EnhancedHttp => "enhanced_http",
            Self::RenderedBrowser => "rendered_browser",
            Self::StealthBrowser => "stealth_browser",
            Self::NeedsInvestigation => "needs_investigation",
            Self::StructuredData => "structured_data",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "plain_http" => Some(Self::PlainHttp),
            "enhanced_http" => Some(Self::EnhancedHttp),
            "rendered_browser" => Some(Self::RenderedBrowser),
            "stealth_browser" => Some(Self::StealthBrowser),
            "needs_investigation" => Some(Self::NeedsInvestigation),
            "structured_data" => Some(Self::StructuredData),
            _ => None,
        }
    }

    /// Whether plain methods are considered to have failed for this site.
    pub fn needs_escalation(&self) -> bool {
        matches!(self, Self::NeedsInvestigation | Self::StealthBrowser)
    }

    /// The single rung used to fetch a site already known to be reachable.
    /// Structured-data sites are fetched as plain pages. Methods that need
    /// escalation have no direct rung.
    pub fn direct_strategy(&self) -> Option<Strategy> {
        match self {
            Self::PlainHttp | Self::StructuredData => Some(Strategy::PlainHttp),
            Self::EnhancedHttp => Some(Strategy::EnhancedHttp),
            Self::RenderedBrowser => Some(Strategy::RenderedBrowser),
            Self::StealthBrowser | Self::NeedsInvestigation => None,
        }
    }
}

impl fmt::Display for ScrapeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommended method plus the notes of every rule that fired, in rule order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyRecommendation {
    pub recommended_method: ScrapeMethod,
    pub notes: Vec<String>,
}

impl StrategyRecommendation {
    /// Notes joined the way the probe report stores them.
    pub fn joined_notes(&self) -> String {
        self.notes.join("; ")
    }
}
