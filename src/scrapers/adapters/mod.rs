//! Transport adapters: one per rung of the escalation ladder.
//!
//! Every adapter turns `(url, proxy, params)` into an [`Attempt`]. Failures
//! of any kind are folded into the attempt, so `attempt` never errors.

mod browser;
mod domain;
mod enhanced;
mod plain;

pub use browser::BrowserAdapter;
pub use domain::{candidate_urls, DomainProber};
pub use enhanced::EnhancedHttpAdapter;
pub use plain::PlainHttpAdapter;

use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::classifier::classify;
use super::extract::{extract_fields, PageFields};
use super::FetchError;
use crate::models::{Attempt, Strategy};

/// Per-attempt inputs chosen by the caller.
#[derive(Debug, Clone)]
pub struct StrategyParams {
    pub timeout: Duration,
    pub user_agent: String,
    /// Browser rungs write screenshots here.
    pub screenshot_dir: PathBuf,
    pub cancel: CancellationToken,
}

impl StrategyParams {
    pub fn new(timeout: Duration, user_agent: impl Into<String>) -> Self {
        Self {
            timeout,
            user_agent: user_agent.into(),
            screenshot_dir: PathBuf::from("screenshots"),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = dir.into();
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// One strategy for fetching a URL. Stateless across calls.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    fn strategy(&self) -> Strategy;

    async fn attempt(&self, url: &str, proxy: Option<&str>, params: &StrategyParams) -> Attempt;
}

/// What a content-fetching adapter got back from the server.
#[derive(Debug, Clone)]
pub(crate) struct FetchedPage {
    pub status: u16,
    pub final_url: String,
    pub html: String,
    pub fields: PageFields,
    pub screenshot_path: Option<String>,
}

impl FetchedPage {
    pub fn from_html(status: u16, final_url: String, html: String) -> Self {
        let fields = extract_fields(&html);
        Self {
            status,
            final_url,
            html,
            fields,
            screenshot_path: None,
        }
    }
}

/// Race `fut` against cancellation.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, FetchError>>,
) -> Result<T, FetchError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        result = fut => result,
    }
}

/// Fill the attempt from a fetch outcome and decide success.
///
/// A status >= 400 is an HTTP failure. A page the classifier flags is a
/// blocked soft failure. Anything else succeeded.
pub(crate) fn finish(
    mut attempt: Attempt,
    started: Instant,
    outcome: Result<FetchedPage, FetchError>,
) -> Attempt {
    attempt.load_time_ms = started.elapsed().as_millis() as u64;

    let page = match outcome {
        Ok(page) => page,
        Err(err) => {
            debug!(url = %attempt.url, strategy = %attempt.strategy_name, "Attempt failed: {}", err);
            return attempt.fail(err.kind(), err.to_string());
        }
    };

    attempt.status_code = page.status;
    attempt.final_url = page.final_url;
    attempt.title = page.fields.title;
    attempt.meta_description = page.fields.meta_description;
    attempt.content_summary = page.fields.content_summary;
    attempt.screenshot_path = page.screenshot_path;

    if page.status >= 400 {
        let err = FetchError::HttpStatus(page.status);
        return attempt.fail(err.kind(), err.to_string());
    }

    let verdict = classify(page.status, &page.html);
    if verdict.blocked {
        let err = FetchError::Blocked(verdict.reason);
        debug!(url = %attempt.url, "Blocked: {}", err);
        return attempt.fail(err.kind(), err.to_string());
    }

    attempt.succeed()
}
