//! Bot-wall detection by signature matching.
//!
//! A page whose transport succeeded can still be a challenge page. The
//! classifier looks for a fixed set of phrases and nothing else: novel
//! block pages slip through, and an ordinary page that happens to mention
//! "captcha" is flagged.

/// Lowercase phrases that mark a verification, CDN-block or CAPTCHA page.
pub const BOT_SIGNATURES: &[&str] = &[
    "please wait while your request is being verified",
    "cloudflare",
    "captcha",
    "robot check",
    "are you a robot",
    "automated requests",
    "bot detection",
    "access denied",
    "blocked",
];

/// Classifier verdict for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockVerdict {
    pub blocked: bool,
    /// Names the first matching signature; empty when not blocked.
    pub reason: String,
}

impl BlockVerdict {
    fn clear() -> Self {
        Self {
            blocked: false,
            reason: String::new(),
        }
    }
}

/// Check `content` for bot-wall signatures. Matching ignores case.
///
/// The status code only appears in the reason text: a 403 with no
/// signature is an HTTP error, not a bot wall.
pub fn classify(status_code: u16, content: &str) -> BlockVerdict {
    let lowered = content.to_lowercase();
    match BOT_SIGNATURES.iter().find(|sig| lowered.contains(*sig)) {
        Some(sig) => BlockVerdict {
            blocked: true,
            reason: format!("bot wall detected (\"{}\", status {})", sig, status_code),
        },
        None => BlockVerdict::clear(),
    }
}

/// Shorthand for `classify(..).blocked`.
pub fn is_bot_wall(status_code: u16, content: &str) -> bool {
    classify(status_code, content).blocked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_page_not_blocked() {
        let verdict = classify(200, "<html><title>Acme Widgets</title>Welcome</html>");
        assert!(!verdict.blocked);
        assert!(verdict.reason.is_empty());
    }

    #[test]
    fn test_signature_match_ignores_case() {
        let verdict = classify(200, "<h1>Please complete the CAPTCHA</h1>");
        assert!(verdict.blocked);
        assert!(verdict.reason.contains("captcha"));
        assert!(verdict.reason.contains("200"));
    }

    #[test]
    fn test_cloudflare_interstitial() {
        assert!(is_bot_wall(
            503,
            "Checking your browser... Please wait while your request is being verified"
        ));
    }

    #[test]
    fn test_status_alone_does_not_flag() {
        assert!(!is_bot_wall(403, "Forbidden"));
    }

    #[test]
    fn test_false_positive_accepted() {
        // A legitimate article about CAPTCHAs still trips the signature set.
        assert!(is_bot_wall(200, "How captcha systems work"));
    }
}
