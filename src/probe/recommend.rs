//! Strategy recommender: turns a plain probe and a rendered probe into one
//! recommended method plus handling notes.
//!
//! Rules run in a fixed order. A later rule may replace the method chosen by
//! an earlier one; notes from every rule that fired are kept in order.

use crate::models::{ProbeResult, ScrapeMethod, StrategyRecommendation};
use crate::utils::same_url;

pub const NOTE_REQUIRES_SCRIPT: &str = "requires script execution";
pub const NOTE_BOTH_FAILED: &str = "both methods failed";
pub const NOTE_BOT_EVADABLE: &str = "bot detection present, use enhanced headers";
pub const NOTE_BOT_STRONG: &str = "strong bot protection, may need proxies or stealth techniques";
pub const NOTE_RATE_LIMITED: &str = "rate limiting detected, implement delays";
pub const NOTE_STRUCTURED: &str = "site returns JSON/JavaScript, parse accordingly";

/// Response headers that indicate throttling.
pub const RATE_LIMIT_HEADERS: &[&str] = &["x-ratelimit-limit", "x-ratelimit-remaining", "retry-after"];

pub fn redirect_note(destination: &str) -> String {
    format!("site redirects to {}", destination)
}

/// Recommend a method for `requested_url`. Pure: same inputs, same output.
pub fn recommend(
    requested_url: &str,
    plain: &ProbeResult,
    rendered: &ProbeResult,
) -> StrategyRecommendation {
    let mut method = ScrapeMethod::PlainHttp;
    let mut notes = Vec::new();

    if !plain.succeeded && rendered.succeeded {
        method = ScrapeMethod::RenderedBrowser;
        notes.push(NOTE_REQUIRES_SCRIPT.to_string());
    }

    if !plain.succeeded && !rendered.succeeded {
        method = ScrapeMethod::NeedsInvestigation;
        notes.push(NOTE_BOTH_FAILED.to_string());
    }

    if rendered.bot_detected {
        if plain.succeeded {
            method = ScrapeMethod::EnhancedHttp;
            notes.push(NOTE_BOT_EVADABLE.to_string());
        } else {
            method = ScrapeMethod::StealthBrowser;
            notes.push(NOTE_BOT_STRONG.to_string());
        }
    }

    if !plain.final_url.is_empty() && !same_url(&plain.final_url, requested_url) {
        notes.push(redirect_note(&plain.final_url));
    }

    if RATE_LIMIT_HEADERS.iter().any(|h| plain.has_header(h)) {
        notes.push(NOTE_RATE_LIMITED.to_string());
    }

    let content_type = plain.content_type.to_ascii_lowercase();
    if content_type.contains("javascript") || content_type.contains("json") {
        if method == ScrapeMethod::PlainHttp {
            method = ScrapeMethod::StructuredData;
        }
        notes.push(NOTE_STRUCTURED.to_string());
    }

    StrategyRecommendation {
        recommended_method: method,
        notes,
    }
}
