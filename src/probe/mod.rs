//! Site access probing: one plain HTTP probe and one rendered-browser probe
//! per URL, summarized into a recommendation and a report row.

mod recommend;
mod report;

pub use recommend::{recommend, redirect_note, RATE_LIMIT_HEADERS};
pub use report::{
    default_report_path, load_urls, read_probe_report, scrape_list, worklist, write_probe_report,
    ProbeSummary, ReportError,
};

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Settings;
use crate::escalation::{pause, DelayRange};
use crate::models::{ErrorKind, ProbeRecord, ProbeResult, StrategyRecommendation};
use crate::scrapers::adapters::cancellable;
use crate::scrapers::{
    extract_fields, is_bot_wall, BrowserOptions, BrowserSession, FetchError, HttpClient,
    UserAgentPool, PROBE_HEADERS,
};
use crate::utils::normalize_url;

/// Everything learned about one URL.
#[derive(Debug, Clone)]
pub struct SiteProbe {
    pub url: String,
    pub plain: ProbeResult,
    pub rendered: ProbeResult,
    pub recommendation: StrategyRecommendation,
}

impl SiteProbe {
    pub fn record(&self) -> ProbeRecord {
        ProbeRecord::from_probes(&self.url, &self.plain, &self.rendered, &self.recommendation)
    }
}

pub struct SiteProber {
    user_agents: UserAgentPool,
    browser: BrowserOptions,
    plain_timeout: Duration,
    rendered_timeout: Duration,
}

impl SiteProber {
    pub fn new(user_agents: UserAgentPool, browser: BrowserOptions) -> Self {
        Self {
            user_agents,
            browser: browser.with_stealth(false),
            plain_timeout: Duration::from_secs(20),
            rendered_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            UserAgentPool::new(settings.effective_user_agents()),
            BrowserOptions::from_settings(settings),
        )
        .with_timeouts(
            Duration::from_secs(settings.timeouts.probe_plain),
            Duration::from_secs(settings.timeouts.probe_rendered),
        )
    }

    pub fn with_timeouts(mut self, plain: Duration, rendered: Duration) -> Self {
        self.plain_timeout = plain;
        self.rendered_timeout = rendered;
        self
    }

    /// Probe both transports and recommend a method. Probes cut short by
    /// `cancel` come back as `cancelled` failures.
    pub async fn probe(&self, url: &str, cancel: &CancellationToken) -> SiteProbe {
        let url = normalize_url(url);
        let plain = cancellable(cancel, async {
            Ok::<_, FetchError>(self.probe_plain(&url).await)
        })
        .await
        .unwrap_or_else(|e| ProbeResult::failure(e.kind(), e.to_string()));
        let rendered = self.probe_rendered(&url, cancel).await;
        let recommendation = recommend(&url, &plain, &rendered);
        info!(
            url = %url,
            method = %recommendation.recommended_method,
            "Probe finished (plain: {}, browser: {})",
            plain.succeeded,
            rendered.succeeded
        );
        SiteProbe {
            url,
            plain,
            rendered,
            recommendation,
        }
    }

    /// Probe each URL in turn with a randomized pause between sites.
    /// `on_probe` sees each result as soon as it is ready.
    pub async fn probe_all<F>(
        &self,
        urls: &[String],
        delay: DelayRange,
        cancel: &CancellationToken,
        mut on_probe: F,
    ) -> Vec<SiteProbe>
    where
        F: FnMut(usize, &SiteProbe),
    {
        let mut probes = Vec::with_capacity(urls.len());
        for (i, url) in urls.iter().enumerate() {
            if i > 0 && !pause(delay.sample(), cancel).await {
                break;
            }
            if cancel.is_cancelled() {
                break;
            }
            let probe = self.probe(url, cancel).await;
            if cancel.is_cancelled() {
                debug!("Discarding probe of {} cut short by cancellation", url);
                break;
            }
            on_probe(i, &probe);
            probes.push(probe);
        }
        probes
    }

    /// GET with probe headers. Succeeds on status < 400.
    pub async fn probe_plain(&self, url: &str) -> ProbeResult {
        let started = Instant::now();
        let client = match HttpClient::new(self.user_agents.pick(), self.plain_timeout, None) {
            Ok(client) => client,
            Err(e) => return ProbeResult::failure(e.kind(), e.to_string()),
        };

        let response = match client.get(url, PROBE_HEADERS, &[]).await {
            Ok(response) => response,
            Err(e) => {
                debug!("Plain probe failed for {}: {}", url, e);
                return ProbeResult::failure(e.kind(), e.to_string())
                    .with_load_time(started.elapsed().as_millis() as u64);
            }
        };

        let fields = extract_fields(&response.body);
        let base = if response.status < 400 {
            ProbeResult::success(response.status, response.final_url.clone())
        } else {
            let err = FetchError::HttpStatus(response.status);
            ProbeResult::failure(err.kind(), err.to_string())
                .with_status(response.status)
                .with_final_url(response.final_url.clone())
        };

        base.with_load_time(response.elapsed.as_millis() as u64)
            .with_title(fields.title)
            .with_content_type(response.content_type())
            .with_content_length(response.content_length)
            .with_bot_detected(is_bot_wall(response.status, &response.body))
            .with_headers(response.headers)
    }

    /// Load the page in a fresh browser. Succeeds when the DOM is ready with
    /// status < 400; bot-wall detection is reported separately.
    pub async fn probe_rendered(&self, url: &str, cancel: &CancellationToken) -> ProbeResult {
        let started = Instant::now();
        let session =
            match BrowserSession::launch(&self.browser, None, self.user_agents.pick(), cancel)
                .await
            {
                Ok(session) => session,
                Err(e) => {
                    debug!("Browser probe could not start for {}: {}", url, e);
                    return ProbeResult::failure(e.kind(), e.to_string());
                }
            };

        let outcome = cancellable(cancel, async {
            let navigation = session.navigate(url, self.rendered_timeout).await?;
            let snapshot = session.snapshot().await?;
            Ok::<_, FetchError>((navigation, snapshot))
        })
        .await;
        session.close().await;

        let elapsed = started.elapsed().as_millis() as u64;
        match outcome {
            Ok((navigation, snapshot)) => {
                let bot_detected = is_bot_wall(navigation.status, &snapshot.html);
                let base = if navigation.status < 400 {
                    ProbeResult::success(navigation.status, navigation.final_url)
                } else {
                    ProbeResult::failure(
                        ErrorKind::HttpStatus,
                        FetchError::HttpStatus(navigation.status).to_string(),
                    )
                    .with_status(navigation.status)
                    .with_final_url(navigation.final_url)
                };
                base.with_load_time(elapsed)
                    .with_title(snapshot.fields.title)
                    .with_content_type("text/html")
                    .with_content_length(snapshot.html.len() as u64)
                    .with_bot_detected(bot_detected)
            }
            Err(e) => {
                debug!("Browser probe failed for {}: {}", url, e);
                ProbeResult::failure(e.kind(), e.to_string()).with_load_time(elapsed)
            }
        }
    }
}
