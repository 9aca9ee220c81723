//! Rungs 3 and 4: headless Chrome, plain or with stealth humanization.

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Local;
use tracing::{debug, warn};

use super::{cancellable, finish, FetchedPage, StrategyParams, TransportAdapter};
use crate::escalation::{pause, DelayRange};
use crate::models::{Attempt, Strategy};
use crate::scrapers::browser::{
    BrowserOptions, BrowserSession, POINTER_WAIT, SCROLL_WAIT, SETTLE_WAIT,
};
use crate::scrapers::FetchError;
use crate::utils::{domain_of, screenshot_stem};

/// Browser fetch. One Chrome instance per attempt, always closed afterwards.
#[derive(Debug, Clone)]
pub struct BrowserAdapter {
    options: BrowserOptions,
}

impl BrowserAdapter {
    /// Rung 3: a rendered page with no evasion.
    pub fn rendered(options: BrowserOptions) -> Self {
        Self {
            options: options.with_stealth(false),
        }
    }

    /// Rung 4: evasion scripts, browser-like headers and pointer/scroll activity.
    pub fn stealth(options: BrowserOptions) -> Self {
        Self {
            options: options.with_stealth(true),
        }
    }

    pub fn is_stealth(&self) -> bool {
        self.options.stealth
    }

    /// `<dir>/<domain stem>_<YYYYmmdd_HHMMSS>_<strategy>.png`
    pub fn screenshot_path(&self, url: &str, params: &StrategyParams) -> PathBuf {
        let stem = screenshot_stem(&domain_of(url));
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        params
            .screenshot_dir
            .join(format!("{}_{}_{}.png", stem, stamp, self.strategy()))
    }

    async fn wait(range: DelayRange, params: &StrategyParams) -> Result<(), FetchError> {
        if pause(range.sample(), &params.cancel).await {
            Ok(())
        } else {
            Err(FetchError::Cancelled)
        }
    }

    async fn drive(
        &self,
        session: &BrowserSession,
        url: &str,
        params: &StrategyParams,
    ) -> Result<FetchedPage, FetchError> {
        if self.is_stealth() {
            session.move_pointer().await;
        }

        let navigation = session.navigate(url, params.timeout).await?;

        if self.is_stealth() {
            Self::wait(SETTLE_WAIT, params).await?;
            session.move_pointer().await;
            Self::wait(POINTER_WAIT, params).await?;
            session.scroll().await;
            Self::wait(SCROLL_WAIT, params).await?;
        }

        let snapshot = session.snapshot().await?;

        let path = self.screenshot_path(url, params);
        let screenshot_path = match session.screenshot(&path).await {
            Ok(()) => Some(path.to_string_lossy().into_owned()),
            Err(e) => {
                warn!("Screenshot failed for {}: {}", url, e);
                None
            }
        };

        Ok(FetchedPage {
            status: navigation.status,
            final_url: navigation.final_url,
            html: snapshot.html,
            fields: snapshot.fields,
            screenshot_path,
        })
    }

    async fn fetch(
        &self,
        url: &str,
        proxy: Option<&str>,
        params: &StrategyParams,
    ) -> Result<FetchedPage, FetchError> {
        let session =
            BrowserSession::launch(&self.options, proxy, &params.user_agent, &params.cancel)
                .await?;

        // The session stays owned here so it is closed even when cancelled
        let outcome = cancellable(&params.cancel, self.drive(&session, url, params)).await;
        session.close().await;
        debug!(url, strategy = %self.strategy(), "Browser closed");
        outcome
    }
}

#[async_trait]
impl TransportAdapter for BrowserAdapter {
    fn strategy(&self) -> Strategy {
        if self.is_stealth() {
            Strategy::StealthBrowser
        } else {
            Strategy::RenderedBrowser
        }
    }

    async fn attempt(&self, url: &str, proxy: Option<&str>, params: &StrategyParams) -> Attempt {
        let attempt = Attempt::new(url, self.strategy()).with_proxy(proxy);
        let started = Instant::now();
        let outcome = self.fetch(url, proxy, params).await;
        finish(attempt, started, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;
    use std::time::Duration;

    #[test]
    fn test_strategy_follows_stealth_flag() {
        let options = BrowserOptions::default();
        assert_eq!(
            BrowserAdapter::rendered(options.clone()).strategy(),
            Strategy::RenderedBrowser
        );
        assert_eq!(
            BrowserAdapter::stealth(options).strategy(),
            Strategy::StealthBrowser
        );
    }

    #[test]
    fn test_screenshot_path_layout() {
        let adapter = BrowserAdapter::stealth(BrowserOptions::default());
        let params = StrategyParams::new(Duration::from_secs(1), "ua").with_screenshot_dir("/tmp/shots");
        let path = adapter.screenshot_path("https://www.example.com:8443/a", &params);

        assert_eq!(path.parent(), Some(std::path::Path::new("/tmp/shots")));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("www_example_com_8443_"), "{}", name);
        assert!(name.ends_with("_stealth_browser.png"), "{}", name);
        // stem + 8-digit date + 6-digit time + strategy
        let stamp = &name["www_example_com_8443_".len()..][..15];
        assert_eq!(stamp.as_bytes()[8], b'_');
    }

    #[tokio::test]
    async fn test_missing_chrome_is_navigation_failure() {
        let options = BrowserOptions {
            chrome_path: Some("/definitely/not/a/chrome".into()),
            ..BrowserOptions::default()
        };
        let params = StrategyParams::new(Duration::from_secs(1), "ua");
        let attempt = BrowserAdapter::rendered(options)
            .attempt("https://example.com", None, &params)
            .await;

        assert!(!attempt.succeeded);
        assert_eq!(attempt.error_kind, Some(ErrorKind::Navigation));
        assert_eq!(attempt.strategy_ordinal, 3);
        assert!(attempt.screenshot_path.is_none());
    }

    #[cfg(feature = "browser")]
    #[tokio::test]
    async fn test_cancelled_before_launch_records_cancellation() {
        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();
        let root = tempfile::tempdir().unwrap();
        let options = BrowserOptions {
            chrome_path: Some(std::env::current_exe().unwrap()),
            profile_root: root.path().to_path_buf(),
            ..BrowserOptions::default()
        };
        let params = StrategyParams::new(Duration::from_secs(1), "ua").with_cancel(cancel);
        let attempt = BrowserAdapter::stealth(options)
            .attempt("https://example.com", None, &params)
            .await;

        assert_eq!(attempt.error_kind, Some(ErrorKind::Cancelled));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
