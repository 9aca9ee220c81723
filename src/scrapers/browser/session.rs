//! One isolated Chrome instance driven over CDP.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType,
};
use chromiumoxide::cdp::browser_protocol::network::{
    Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat, NavigateParams,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use rand::Rng;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::stealth::{
    BASE_ARGS, POINTER_MAX, POINTER_MIN, SCROLL_SCRIPT, STEALTH_ARGS, STEALTH_HEADERS,
    STEALTH_SCRIPTS,
};
use super::{find_chrome, BrowserOptions, Navigation, PageSnapshot};
use crate::scrapers::extract::PageFields;
use crate::scrapers::FetchError;
use crate::utils::{collapse_whitespace, summarize};

/// Resolves once the DOM is parsed (not full network idle).
const DOM_READY_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
        }
    })
"#;

/// Status of the main document, 0 when the browser does not expose it.
const STATUS_SCRIPT: &str = r#"
    (() => {
        const nav = performance.getEntriesByType('navigation')[0];
        return nav && nav.responseStatus ? nav.responseStatus : 0;
    })()
"#;

const EXTRACT_SCRIPT: &str = r#"
    (() => {
        const meta = document.querySelector('meta[name="description"]');
        return {
            title: document.title || '',
            meta: meta ? (meta.getAttribute('content') || '') : '',
            text: document.body ? document.body.innerText : ''
        };
    })()
"#;

#[derive(Debug, Deserialize)]
struct RawFields {
    title: String,
    meta: String,
    text: String,
}

fn browser_err(e: impl std::fmt::Display) -> FetchError {
    FetchError::Browser(e.to_string())
}

/// Chrome profile directory for one launch. Removed on drop, so an
/// abandoned launch leaves nothing behind.
struct ProfileDir(PathBuf);

impl ProfileDir {
    fn create(root: &Path) -> Result<Self, FetchError> {
        let path = root.join(format!("fetchladder-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path).map_err(browser_err)?;
        Ok(Self(path))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ProfileDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove browser profile {}: {}", self.0.display(), e);
            }
        }
    }
}

/// A launched browser with one page. Call `close` on every path.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    // Declared last: dropped after the browser process
    profile: ProfileDir,
}

impl BrowserSession {
    /// Launch a fresh Chrome with its own profile directory.
    ///
    /// `cancel` is checked between launch steps. A cancelled launch shuts
    /// down whatever was started and returns `FetchError::Cancelled`.
    pub async fn launch(
        options: &BrowserOptions,
        proxy: Option<&str>,
        user_agent: &str,
        cancel: &CancellationToken,
    ) -> Result<Self, FetchError> {
        let chrome = find_chrome(options.chrome_path.as_deref())?;
        let profile = ProfileDir::create(&options.profile_root)?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome)
            .user_data_dir(profile.path())
            .window_size(1920, 1080);

        // with_head means NOT headless
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(proxy) = proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }
        for arg in BASE_ARGS {
            builder = builder.arg(*arg);
        }
        if options.stealth {
            for arg in STEALTH_ARGS {
                builder = builder.arg(*arg);
            }
        }
        for arg in &options.chrome_args {
            builder = builder.arg(arg.as_str());
        }

        let config = builder.build().map_err(FetchError::Browser)?;

        debug!("Launching browser (headless={}, stealth={})", options.headless, options.stealth);
        // Dropping the pending launch kills the child; `profile` is removed on return
        let launched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            launched = Browser::launch(config) => launched,
        };
        let (browser, mut handler) = launched.map_err(browser_err)?;

        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        if cancel.is_cancelled() {
            Self::shutdown(browser, handler, None).await;
            return Err(FetchError::Cancelled);
        }

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                Self::shutdown(browser, handler, None).await;
                return Err(browser_err(e));
            }
        };

        let session = Self {
            browser,
            handler,
            page,
            profile,
        };

        if cancel.is_cancelled() {
            session.close().await;
            return Err(FetchError::Cancelled);
        }
        if let Err(e) = session.prepare(options.stealth, user_agent).await {
            session.close().await;
            return Err(e);
        }
        Ok(session)
    }

    async fn prepare(&self, stealth: bool, user_agent: &str) -> Result<(), FetchError> {
        self.page
            .execute(SetUserAgentOverrideParams::new(user_agent.to_string()))
            .await
            .map_err(browser_err)?;

        if !stealth {
            return Ok(());
        }

        for script in STEALTH_SCRIPTS {
            self.page
                .execute(AddScriptToEvaluateOnNewDocumentParams::new(script.to_string()))
                .await
                .map_err(browser_err)?;
        }

        let headers: serde_json::Map<String, serde_json::Value> = STEALTH_HEADERS
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect();
        self.page
            .execute(SetExtraHttpHeadersParams::new(Headers::new(
                serde_json::Value::Object(headers),
            )))
            .await
            .map_err(browser_err)?;
        Ok(())
    }

    /// Navigate and wait for DOMContentLoaded within `timeout`.
    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<Navigation, FetchError> {
        let started = Instant::now();
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(FetchError::Navigation)?;

        let response = tokio::time::timeout(timeout, self.page.execute(params))
            .await
            .map_err(|_| {
                FetchError::Navigation(format!("timed out after {}s", timeout.as_secs()))
            })?
            .map_err(|e| FetchError::Navigation(e.to_string()))?;

        if let Some(ref error_text) = response.result.error_text {
            return Err(FetchError::Navigation(error_text.clone()));
        }

        let remaining = timeout.saturating_sub(started.elapsed());
        match tokio::time::timeout(remaining, self.page.evaluate(DOM_READY_SCRIPT)).await {
            Ok(Ok(result)) => {
                let state: String = result.into_value().unwrap_or_default();
                debug!("Page ready state: {}", state);
            }
            Ok(Err(e)) => {
                // Non-HTML documents cannot run the script
                debug!("Could not check ready state: {}", e);
            }
            Err(_) => {
                return Err(FetchError::Navigation(format!(
                    "DOMContentLoaded not reached within {}s",
                    timeout.as_secs()
                )));
            }
        }

        let status = match self.page.evaluate(STATUS_SCRIPT).await {
            Ok(result) => result.into_value::<u16>().unwrap_or(0),
            Err(_) => 0,
        };

        let final_url = self
            .page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());

        Ok(Navigation {
            // The document loaded, so an unreported status is taken as OK
            status: if status == 0 { 200 } else { status },
            final_url,
        })
    }

    /// Raw HTML plus the recorded fields, evaluated in the page.
    pub async fn snapshot(&self) -> Result<PageSnapshot, FetchError> {
        let html = self.page.content().await.map_err(browser_err)?;
        let raw: RawFields = self
            .page
            .evaluate(EXTRACT_SCRIPT)
            .await
            .map_err(browser_err)?
            .into_value()
            .map_err(browser_err)?;

        Ok(PageSnapshot {
            html,
            fields: PageFields {
                title: collapse_whitespace(&raw.title),
                meta_description: raw.meta.trim().to_string(),
                content_summary: summarize(&raw.text),
            },
        })
    }

    /// Move the pointer to a random point.
    pub async fn move_pointer(&self) {
        let (x, y) = {
            let mut rng = rand::rng();
            (
                rng.random_range(POINTER_MIN..=POINTER_MAX),
                rng.random_range(POINTER_MIN..=POINTER_MAX),
            )
        };
        let params = DispatchMouseEventParams::new(DispatchMouseEventType::MouseMoved, x, y);
        if let Err(e) = self.page.execute(params).await {
            debug!("Pointer move skipped: {}", e);
        }
    }

    /// Scroll by a small random amount.
    pub async fn scroll(&self) {
        if let Err(e) = self.page.evaluate(SCROLL_SCRIPT).await {
            debug!("Scroll skipped: {}", e);
        }
    }

    /// Capture the viewport as PNG at `path`.
    pub async fn screenshot(&self, path: &Path) -> Result<(), FetchError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(false)
            .build();
        let bytes = self.page.screenshot(params).await.map_err(browser_err)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(browser_err)?;
        }
        tokio::fs::write(path, bytes).await.map_err(browser_err)?;
        Ok(())
    }

    /// Close the page and browser, reap the process and drop the profile.
    pub async fn close(self) {
        let Self {
            browser,
            handler,
            page,
            profile,
        } = self;
        Self::shutdown(browser, handler, Some(page)).await;
        drop(profile);
    }

    async fn shutdown(mut browser: Browser, handler: JoinHandle<()>, page: Option<Page>) {
        if let Some(page) = page {
            let _ = page.close().await;
        }
        if let Err(e) = browser.close().await {
            debug!("Browser close failed: {}", e);
        }
        if let Err(e) = browser.wait().await {
            warn!("Failed to reap browser process: {}", e);
        }
        handler.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_dir_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let profile = ProfileDir::create(root.path()).unwrap();
        let path = profile.path().to_path_buf();
        std::fs::write(path.join("Local State"), "{}").unwrap();
        assert!(path.is_dir());

        drop(profile);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancelled_launch_leaves_no_profile_behind() {
        use std::os::unix::fs::PermissionsExt;

        // A "browser" that never announces its debugging endpoint
        let dir = tempfile::tempdir().unwrap();
        let chrome = dir.path().join("stalled-chrome");
        std::fs::write(&chrome, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&chrome, std::fs::Permissions::from_mode(0o755)).unwrap();
        let profiles = dir.path().join("profiles");
        std::fs::create_dir_all(&profiles).unwrap();

        let options = BrowserOptions {
            chrome_path: Some(chrome),
            profile_root: profiles.clone(),
            ..BrowserOptions::default()
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = BrowserSession::launch(&options, None, "ua", &cancel).await;

        assert!(matches!(result, Err(FetchError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(std::fs::read_dir(&profiles).unwrap().count(), 0);
    }
}
