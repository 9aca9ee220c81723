//! The escalation controller: walks the ladder for one URL until a rung
//! succeeds, logging every attempt as it goes.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{pause, DelayPolicy};
use crate::config::{Settings, Timeouts};
use crate::models::{Attempt, Strategy, EXHAUSTED_LABEL, RELOCATED_STEALTH_LABEL};
use crate::repository::{AttemptLog, StoreError};
use crate::scrapers::{
    BrowserAdapter, BrowserOptions, DomainProber, EnhancedHttpAdapter, PlainHttpAdapter, ProxyPool,
    StrategyParams, TransportAdapter, UserAgentPool,
};
use crate::utils::{domain_of, normalize_url};

/// `session_<YYYYmmdd_HHMMSS>_<8 hex>`
pub fn new_session_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "session_{}_{}",
        Local::now().format("%Y%m%d_%H%M%S"),
        &suffix[..8]
    )
}

/// One adapter per rung.
#[derive(Clone)]
pub struct Ladder {
    plain: Arc<dyn TransportAdapter>,
    enhanced: Arc<dyn TransportAdapter>,
    rendered: Arc<dyn TransportAdapter>,
    stealth: Arc<dyn TransportAdapter>,
    domain: Arc<dyn TransportAdapter>,
}

impl Ladder {
    pub fn new(
        plain: Arc<dyn TransportAdapter>,
        enhanced: Arc<dyn TransportAdapter>,
        rendered: Arc<dyn TransportAdapter>,
        stealth: Arc<dyn TransportAdapter>,
        domain: Arc<dyn TransportAdapter>,
    ) -> Self {
        Self {
            plain,
            enhanced,
            rendered,
            stealth,
            domain,
        }
    }

    /// The real adapters, configured from settings.
    pub fn standard(settings: &Settings) -> Self {
        let browser = BrowserOptions::from_settings(settings);
        Self::new(
            Arc::new(PlainHttpAdapter),
            Arc::new(EnhancedHttpAdapter::new(settings.timeouts.priming_timeout())),
            Arc::new(BrowserAdapter::rendered(browser.clone())),
            Arc::new(BrowserAdapter::stealth(browser)),
            Arc::new(DomainProber),
        )
    }

    pub fn rung(&self, strategy: Strategy) -> &dyn TransportAdapter {
        match strategy {
            Strategy::PlainHttp => self.plain.as_ref(),
            Strategy::EnhancedHttp => self.enhanced.as_ref(),
            Strategy::RenderedBrowser => self.rendered.as_ref(),
            Strategy::StealthBrowser => self.stealth.as_ref(),
            Strategy::DomainVerification => self.domain.as_ref(),
        }
    }
}

/// Where a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A rung fetched the page. `method` is the persisted strategy label.
    Succeeded { method: String, final_url: String },
    /// The domain prober found where the site went, but the stealth retry
    /// there failed.
    Relocated { final_url: String },
    /// Every rung failed.
    Exhausted,
    Cancelled,
}

impl RunOutcome {
    /// Label for summaries.
    pub fn method_label(&self) -> &str {
        match self {
            Self::Succeeded { method, .. } => method,
            Self::Relocated { .. } => Strategy::DomainVerification.as_str(),
            Self::Exhausted => EXHAUSTED_LABEL,
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Controller state for one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Trying(Strategy),
    /// Stealth fetch against the URL the domain prober found.
    Retrying { relocated_to: String },
    Done(RunOutcome),
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Trying(strategy) => write!(f, "trying({})", strategy.ordinal()),
            Self::Retrying { relocated_to } => write!(f, "retrying({})", relocated_to),
            Self::Done(outcome) => write!(f, "done({})", outcome.method_label()),
        }
    }
}

/// The result of one run: the outcome plus every row it appended.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub url: String,
    pub session_id: String,
    pub outcome: RunOutcome,
    pub attempts: Vec<Attempt>,
}

/// Walks the ladder for one URL at a time. Cheap to share across workers.
pub struct EscalationController {
    ladder: Ladder,
    log: Arc<dyn AttemptLog>,
    session_id: String,
    delays: DelayPolicy,
    timeouts: Timeouts,
    user_agents: UserAgentPool,
    proxies: ProxyPool,
    screenshot_dir: PathBuf,
}

impl EscalationController {
    pub fn new(ladder: Ladder, log: Arc<dyn AttemptLog>) -> Self {
        Self {
            ladder,
            log,
            session_id: new_session_id(),
            delays: DelayPolicy::default(),
            timeouts: Timeouts::default(),
            user_agents: UserAgentPool::default(),
            proxies: ProxyPool::default(),
            screenshot_dir: PathBuf::from("screenshots"),
        }
    }

    /// Controller with the real adapters and every knob taken from settings.
    pub fn from_settings(settings: &Settings, log: Arc<dyn AttemptLog>) -> Self {
        Self::new(Ladder::standard(settings), log)
            .with_delays(settings.delays.clone())
            .with_timeouts(settings.timeouts.clone())
            .with_user_agents(UserAgentPool::new(settings.effective_user_agents()))
            .with_proxies(ProxyPool::new(settings.proxies.clone()))
            .with_screenshot_dir(settings.screenshots_dir.clone())
    }

    pub fn with_delays(mut self, delays: DelayPolicy) -> Self {
        self.delays = delays;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_user_agents(mut self, user_agents: UserAgentPool) -> Self {
        self.user_agents = user_agents;
        self
    }

    pub fn with_proxies(mut self, proxies: ProxyPool) -> Self {
        self.proxies = proxies;
        self
    }

    pub fn with_screenshot_dir(mut self, dir: PathBuf) -> Self {
        self.screenshot_dir = dir;
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Escalate `url` until a rung succeeds, the ladder is exhausted, or
    /// `cancel` fires. Only a failure to log an attempt is an error.
    pub async fn run(&self, url: &str, cancel: &CancellationToken) -> Result<RunReport, StoreError> {
        let url = normalize_url(url);
        let mut attempts = Vec::new();
        let mut state = RunState::Pending;

        let outcome = loop {
            debug!(url = %url, state = %state, "Escalation step");
            state = match state {
                RunState::Done(outcome) => break outcome,
                other => self.step(other, &url, cancel, &mut attempts).await?,
            };
        };

        match &outcome {
            RunOutcome::Succeeded { method, final_url } => {
                info!(url = %url, method = %method, "Escalation succeeded at {}", final_url)
            }
            RunOutcome::Relocated { final_url } => {
                warn!(url = %url, "Site moved to {} but content could not be fetched", final_url)
            }
            RunOutcome::Exhausted => warn!(url = %url, "All strategies failed"),
            RunOutcome::Cancelled => info!(url = %url, "Escalation cancelled"),
        }

        Ok(RunReport {
            url,
            session_id: self.session_id.clone(),
            outcome,
            attempts,
        })
    }

    /// Fetch `url` with exactly one rung and log the attempt. Used for sites
    /// whose probe already showed which method works; a failure is reported
    /// as exhausted without climbing further.
    pub async fn fetch_once(
        &self,
        url: &str,
        strategy: Strategy,
        cancel: &CancellationToken,
    ) -> Result<RunReport, StoreError> {
        let url = normalize_url(url);
        let mut attempts = Vec::new();

        let outcome = if cancel.is_cancelled() {
            RunOutcome::Cancelled
        } else {
            info!(url = %url, strategy = %strategy, "Fetching with recommended strategy");
            let attempt = self.attempt(strategy, &url, &url, cancel).await;
            let outcome = if attempt.is_cancelled() {
                RunOutcome::Cancelled
            } else if attempt.succeeded {
                RunOutcome::Succeeded {
                    method: strategy.as_str().to_string(),
                    final_url: attempt.final_url.clone(),
                }
            } else {
                warn!(
                    url = %url,
                    strategy = %strategy,
                    "Recommended strategy failed: {}",
                    attempt.error_message.as_deref().unwrap_or("unknown error")
                );
                RunOutcome::Exhausted
            };
            self.record(attempt, &mut attempts).await?;
            outcome
        };

        Ok(RunReport {
            url,
            session_id: self.session_id.clone(),
            outcome,
            attempts,
        })
    }

    /// One transition of the state machine.
    async fn step(
        &self,
        state: RunState,
        url: &str,
        cancel: &CancellationToken,
        attempts: &mut Vec<Attempt>,
    ) -> Result<RunState, StoreError> {
        let next = match state {
            RunState::Pending => RunState::Trying(Strategy::PlainHttp),

            RunState::Trying(strategy) => {
                if cancel.is_cancelled() {
                    return Ok(RunState::Done(RunOutcome::Cancelled));
                }
                info!(url = %url, rung = strategy.ordinal(), strategy = %strategy, "Trying strategy");

                let attempt = self.attempt(strategy, url, url, cancel).await;

                if attempt.is_cancelled() {
                    self.record(attempt, attempts).await?;
                    RunState::Done(RunOutcome::Cancelled)
                } else if attempt.succeeded {
                    let final_url = attempt.final_url.clone();
                    self.record(attempt, attempts).await?;
                    if strategy == Strategy::DomainVerification {
                        RunState::Retrying {
                            relocated_to: final_url,
                        }
                    } else {
                        RunState::Done(RunOutcome::Succeeded {
                            method: strategy.as_str().to_string(),
                            final_url,
                        })
                    }
                } else {
                    debug!(
                        url = %url,
                        strategy = %strategy,
                        "Strategy failed: {}",
                        attempt.error_message.as_deref().unwrap_or("unknown error")
                    );
                    match strategy.next() {
                        Some(next) => {
                            self.record(attempt, attempts).await?;
                            let delay = self.delays.after(strategy).sample();
                            if pause(delay, cancel).await {
                                RunState::Trying(next)
                            } else {
                                RunState::Done(RunOutcome::Cancelled)
                            }
                        }
                        None => {
                            self.record(attempt.relabel(EXHAUSTED_LABEL), attempts)
                                .await?;
                            RunState::Done(RunOutcome::Exhausted)
                        }
                    }
                }
            }

            RunState::Retrying { relocated_to } => {
                if cancel.is_cancelled() {
                    return Ok(RunState::Done(RunOutcome::Cancelled));
                }
                info!(url = %url, "Retrying stealth fetch at {}", relocated_to);

                let mut attempt = self
                    .attempt(Strategy::StealthBrowser, url, &relocated_to, cancel)
                    .await;
                // The retry shares the prober's rung
                attempt.strategy_ordinal = Strategy::DomainVerification.ordinal();

                if attempt.succeeded {
                    let final_url = attempt.final_url.clone();
                    self.record(attempt.relabel(RELOCATED_STEALTH_LABEL), attempts)
                        .await?;
                    RunState::Done(RunOutcome::Succeeded {
                        method: RELOCATED_STEALTH_LABEL.to_string(),
                        final_url,
                    })
                } else if attempt.is_cancelled() {
                    self.record(attempt, attempts).await?;
                    RunState::Done(RunOutcome::Cancelled)
                } else {
                    self.record(attempt, attempts).await?;
                    RunState::Done(RunOutcome::Relocated {
                        final_url: relocated_to,
                    })
                }
            }

            done @ RunState::Done(_) => done,
        };
        Ok(next)
    }

    /// Run one adapter. `target` is what gets fetched; the row is always
    /// filed under the run's `url`.
    async fn attempt(
        &self,
        strategy: Strategy,
        url: &str,
        target: &str,
        cancel: &CancellationToken,
    ) -> Attempt {
        let proxy = match strategy {
            Strategy::DomainVerification => None,
            _ => self.proxies.pick(),
        };
        let params = StrategyParams::new(self.timeouts.for_strategy(strategy), self.user_agents.pick())
            .with_screenshot_dir(self.screenshot_dir.clone())
            .with_cancel(cancel.clone());

        let mut attempt = self.ladder.rung(strategy).attempt(target, proxy, &params).await;
        if attempt.url != url {
            attempt.url = url.to_string();
            attempt.domain = domain_of(url);
        }
        attempt.with_session(&self.session_id)
    }

    async fn record(&self, attempt: Attempt, attempts: &mut Vec<Attempt>) -> Result<(), StoreError> {
        self.log.append(&attempt).await?;
        attempts.push(attempt);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::testing::{Fixture, MemoryLog, Step};
    use super::*;
    use crate::escalation::DelayRange;
    use crate::models::ErrorKind;

    const T: Step = Step::Fail(ErrorKind::Transport);

    fn rows(log: &MemoryLog) -> Vec<Attempt> {
        log.rows.lock().unwrap().clone()
    }

    fn ordinals(rows: &[Attempt]) -> Vec<u8> {
        rows.iter().map(|a| a.strategy_ordinal).collect()
    }

    #[test]
    fn test_session_id_format() {
        let id = new_session_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts[0], "session");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 6);
        assert_eq!(parts[3].len(), 8);
        assert!(parts[3].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_fetch_once_logs_one_row_with_recommended_method() {
        let fixture = Fixture::new(&[], &[], &[Step::Succeed(None)], &[], &[]);
        let log = Arc::new(MemoryLog::default());
        let report = fixture
            .controller(log.clone())
            .fetch_once("example.com", Strategy::RenderedBrowser, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome.method_label(), "rendered_browser");
        let rows = rows(&log);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].strategy_name, "rendered_browser");
        assert_eq!(rows[0].strategy_ordinal, 3);
        assert_eq!(rows[0].url, "https://example.com");
        assert!(rows[0].succeeded);
        assert_eq!(fixture.plain.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_once_failure_does_not_climb() {
        let fixture = Fixture::new(&[T], &[Step::Succeed(None)], &[], &[], &[]);
        let log = Arc::new(MemoryLog::default());
        let report = fixture
            .controller(log.clone())
            .fetch_once("https://example.com", Strategy::PlainHttp, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Exhausted);
        assert_eq!(ordinals(&rows(&log)), vec![1]);
        assert_eq!(fixture.enhanced.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_once_cancelled_writes_nothing() {
        let fixture = Fixture::new(&[Step::Succeed(None)], &[], &[], &[], &[]);
        let log = Arc::new(MemoryLog::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = fixture
            .controller(log.clone())
            .fetch_once("https://example.com", Strategy::PlainHttp, &cancel)
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert!(rows(&log).is_empty());
        assert_eq!(fixture.plain.call_count(), 0);
    }

    #[tokio::test]
    async fn test_first_success_stops_the_ladder() {
        let fixture = Fixture::new(&[T], &[Step::Succeed(None)], &[], &[], &[]);
        let log = Arc::new(MemoryLog::default());
        let report = fixture
            .controller(log.clone())
            .run("https://example.com", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            report.outcome,
            RunOutcome::Succeeded {
                method: "enhanced_http".into(),
                final_url: "https://example.com".into()
            }
        );
        let rows = rows(&log);
        assert_eq!(ordinals(&rows), vec![1, 2]);
        assert_eq!(fixture.rendered.call_count(), 0);
        assert_eq!(fixture.domain.call_count(), 0);
        assert!(rows.iter().all(|a| a.session_id == "session_test"));
        assert_eq!(report.attempts, rows);
    }

    #[tokio::test]
    async fn test_domain_retry_success_writes_six_rows() {
        let fixture = Fixture::new(
            &[T],
            &[T],
            &[T],
            &[T, Step::Succeed(None)],
            &[Step::Succeed(Some("https://www.dead-example.test"))],
        );
        let log = Arc::new(MemoryLog::default());
        let report = fixture
            .controller(log.clone())
            .run("http://dead-example.test", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome.method_label(), "domain_verification+stealth_browser");
        let rows = rows(&log);
        assert_eq!(rows.len(), 6);
        assert_eq!(ordinals(&rows), vec![1, 2, 3, 4, 5, 5]);
        assert!(rows.iter().all(|a| a.url == "http://dead-example.test"));

        assert_eq!(rows[4].strategy_name, "domain_verification");
        assert!(rows[4].succeeded);
        assert_eq!(rows[4].final_url, "https://www.dead-example.test");

        assert_eq!(rows[5].strategy_name, "domain_verification+stealth_browser");
        assert!(rows[5].succeeded);
        assert_eq!(rows[5].domain, "dead-example.test");
        assert_eq!(
            fixture.stealth.urls(),
            vec!["http://dead-example.test", "https://www.dead-example.test"]
        );
    }

    #[tokio::test]
    async fn test_all_rungs_fail_is_exhausted() {
        let fixture = Fixture::new(&[T], &[T], &[T], &[T], &[T]);
        let log = Arc::new(MemoryLog::default());
        let report = fixture
            .controller(log.clone())
            .run("http://dead-example.test", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Exhausted);
        let rows = rows(&log);
        assert_eq!(ordinals(&rows), vec![1, 2, 3, 4, 5]);
        assert_eq!(rows[4].strategy_name, "none");
        assert!(rows.iter().all(|a| !a.succeeded && a.error_message.is_some()));
        assert_eq!(rows[0].strategy_name, "plain_http");
    }

    #[tokio::test]
    async fn test_failed_retry_is_relocated() {
        let fixture = Fixture::new(
            &[T],
            &[T],
            &[T],
            &[T, Step::Fail(ErrorKind::Blocked)],
            &[Step::Succeed(Some("https://www.moved.test"))],
        );
        let log = Arc::new(MemoryLog::default());
        let report = fixture
            .controller(log.clone())
            .run("moved.test", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            report.outcome,
            RunOutcome::Relocated {
                final_url: "https://www.moved.test".into()
            }
        );
        let rows = rows(&log);
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[5].strategy_name, "stealth_browser");
        assert_eq!(rows[5].strategy_ordinal, 5);
        assert!(!rows[5].succeeded);
        assert_eq!(rows[5].url, "https://moved.test");
    }

    #[tokio::test]
    async fn test_ordinals_strictly_increase_before_retry() {
        for success_at in 1..=4usize {
            let mut scripts: Vec<Vec<Step>> = vec![vec![T]; 5];
            scripts[success_at - 1] = vec![Step::Succeed(None)];
            let fixture = Fixture::new(&scripts[0], &scripts[1], &scripts[2], &scripts[3], &scripts[4]);
            let log = Arc::new(MemoryLog::default());
            fixture
                .controller(log.clone())
                .run("https://example.com", &CancellationToken::new())
                .await
                .unwrap();

            let ords = ordinals(&rows(&log));
            assert_eq!(ords.len(), success_at);
            assert!(ords.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[tokio::test]
    async fn test_prober_never_gets_a_proxy() {
        let fixture = Fixture::new(&[T], &[T], &[T], &[T], &[T]);
        let log = Arc::new(MemoryLog::default());
        fixture
            .controller(log.clone())
            .with_proxies(ProxyPool::new(vec!["http://proxy:3128".to_string()]))
            .run("https://example.com", &CancellationToken::new())
            .await
            .unwrap();

        let rows = rows(&log);
        for row in &rows[..4] {
            assert_eq!(row.proxy_used.as_deref(), Some("http://proxy:3128"));
        }
        assert!(rows[4].proxy_used.is_none());
    }

    #[tokio::test]
    async fn test_cancel_mid_attempt_records_cancelled_row() {
        let fixture = Fixture::new(&[Step::Hang], &[], &[], &[], &[]);
        let log = Arc::new(MemoryLog::default());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let report = fixture
            .controller(log.clone())
            .run("https://example.com", &cancel)
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Cancelled);
        let rows = rows(&log);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].error_kind, Some(ErrorKind::Cancelled));
        assert_eq!(fixture.enhanced.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_delay_stops_promptly() {
        let fixture = Fixture::new(&[T], &[], &[], &[], &[]);
        let log = Arc::new(MemoryLog::default());
        let cancel = CancellationToken::new();
        let long = DelayRange::from_secs(60, 60);
        let controller = fixture
            .controller(log.clone())
            .with_delays(DelayPolicy::new(long, long, long, long));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let report = controller.run("https://example.com", &cancel).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(rows(&log).len(), 1);
        assert_eq!(fixture.enhanced.call_count(), 0);
    }

    #[tokio::test]
    async fn test_already_cancelled_runs_nothing() {
        let fixture = Fixture::new(&[], &[], &[], &[], &[]);
        let log = Arc::new(MemoryLog::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = fixture.controller(log.clone()).run("https://example.com", &cancel).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert!(rows(&log).is_empty());
        assert_eq!(fixture.plain.call_count(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_surfaced() {
        let fixture = Fixture::new(&[Step::Succeed(None)], &[], &[], &[], &[]);
        let log = Arc::new(MemoryLog {
            fail: true,
            ..MemoryLog::default()
        });
        let result = fixture
            .controller(log)
            .run("https://example.com", &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(StoreError::Io(_))));
    }

    #[test]
    fn test_run_state_display() {
        assert_eq!(RunState::Trying(Strategy::StealthBrowser).to_string(), "trying(4)");
        assert_eq!(RunState::Done(RunOutcome::Exhausted).to_string(), "done(none)");
    }
}
