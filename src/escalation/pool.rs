//! Bounded worker pool that runs the controller across distinct domains.
//!
//! URLs sharing a domain are handled by one worker, one after another, with
//! a randomized pause between them. Distinct domains may run in parallel.

use std::collections::VecDeque;
use std::sync::Arc;

use indicatif::ProgressBar;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{pause, DelayRange, EscalationController, RunReport};
use crate::models::{Strategy, WorkItem};
use crate::repository::StoreError;
use crate::utils::site_key;

/// Split items into per-site queues, keeping first-seen order. Hosts that
/// differ only by a `www.` prefix or a port share a queue.
pub fn group_by_domain(items: Vec<WorkItem>) -> Vec<Vec<(usize, WorkItem)>> {
    let mut groups: Vec<(String, Vec<(usize, WorkItem)>)> = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        let domain = site_key(&item.url);
        match groups.iter_mut().find(|(d, _)| *d == domain) {
            Some((_, group)) => group.push((index, item)),
            None => groups.push((domain, vec![(index, item)])),
        }
    }
    groups.into_iter().map(|(_, group)| group).collect()
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    /// Climb the ladder.
    Escalate,
    /// One attempt with the recommended rung.
    Direct,
}

pub struct EscalationPool {
    controller: Arc<EscalationController>,
    workers: usize,
    site_delay: DelayRange,
    progress: Option<ProgressBar>,
}

impl EscalationPool {
    pub fn new(controller: Arc<EscalationController>, workers: usize) -> Self {
        Self {
            controller,
            workers: workers.max(1),
            site_delay: DelayRange::from_secs(5, 10),
            progress: None,
        }
    }

    pub fn with_site_delay(mut self, site_delay: DelayRange) -> Self {
        self.site_delay = site_delay;
        self
    }

    /// Tick `progress` once per finished URL.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Escalate every item. Reports come back in input order; items skipped
    /// because of cancellation are absent. The first store failure stops all
    /// workers and is returned.
    pub async fn run(
        &self,
        items: Vec<WorkItem>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RunReport>, StoreError> {
        self.dispatch(items, Mode::Escalate, cancel).await
    }

    /// Fetch every item once with the rung its recommended method maps to,
    /// falling back to plain HTTP. Same ordering and failure rules as `run`.
    pub async fn scrape(
        &self,
        items: Vec<WorkItem>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RunReport>, StoreError> {
        self.dispatch(items, Mode::Direct, cancel).await
    }

    async fn dispatch(
        &self,
        items: Vec<WorkItem>,
        mode: Mode,
        cancel: &CancellationToken,
    ) -> Result<Vec<RunReport>, StoreError> {
        let groups = group_by_domain(items);
        let workers = self.workers.min(groups.len());
        debug!("Processing {} domains with {} workers ({:?})", groups.len(), workers, mode);

        let queue: Arc<Mutex<VecDeque<Vec<(usize, WorkItem)>>>> =
            Arc::new(Mutex::new(groups.into_iter().collect()));
        let reports: Arc<Mutex<Vec<(usize, RunReport)>>> = Arc::new(Mutex::new(Vec::new()));
        let failure: Arc<Mutex<Option<StoreError>>> = Arc::new(Mutex::new(None));
        // Store failures stop the other workers without cancelling the caller
        let stop = cancel.child_token();

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let queue = queue.clone();
            let reports = reports.clone();
            let failure = failure.clone();
            let stop = stop.clone();
            let controller = self.controller.clone();
            let site_delay = self.site_delay;
            let progress = self.progress.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let group = {
                        let mut queue = queue.lock().await;
                        queue.pop_front()
                    };
                    let Some(group) = group else { break };

                    for (position, (index, item)) in group.into_iter().enumerate() {
                        if position > 0 && !pause(site_delay.sample(), &stop).await {
                            return;
                        }
                        if stop.is_cancelled() {
                            return;
                        }
                        if let Some(pb) = &progress {
                            pb.set_message(item.url.clone());
                        }

                        let result = match mode {
                            Mode::Escalate => controller.run(&item.url, &stop).await,
                            Mode::Direct => {
                                let strategy = item
                                    .method
                                    .and_then(|m| m.direct_strategy())
                                    .unwrap_or(Strategy::PlainHttp);
                                controller.fetch_once(&item.url, strategy, &stop).await
                            }
                        };
                        match result {
                            Ok(report) => reports.lock().await.push((index, report)),
                            Err(e) => {
                                error!("Failed to record attempt for {}: {}", item.url, e);
                                failure.lock().await.get_or_insert(e);
                                stop.cancel();
                                return;
                            }
                        }
                        if let Some(pb) = &progress {
                            pb.inc(1);
                        }
                    }
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Pool worker panicked: {}", e);
            }
        }

        if let Some(e) = failure.lock().await.take() {
            return Err(e);
        }

        let mut reports = std::mem::take(&mut *reports.lock().await);
        reports.sort_by_key(|(index, _)| *index);
        Ok(reports.into_iter().map(|(_, report)| report).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::controller::testing::{Fixture, MemoryLog, Step};
    use crate::escalation::RunOutcome;

    fn items(urls: &[&str]) -> Vec<WorkItem> {
        urls.iter().map(|u| WorkItem::new(*u)).collect()
    }

    #[test]
    fn test_group_by_domain_keeps_order() {
        let groups = group_by_domain(items(&[
            "https://a.com/1",
            "https://b.com/1",
            "https://a.com/2",
            "b.com/2",
        ]));
        assert_eq!(groups.len(), 2);
        let a: Vec<usize> = groups[0].iter().map(|(i, _)| *i).collect();
        let b: Vec<usize> = groups[1].iter().map(|(i, _)| *i).collect();
        assert_eq!(a, vec![0, 2]);
        assert_eq!(b, vec![1, 3]);
    }

    #[test]
    fn test_group_by_domain_merges_www_and_port_variants() {
        let groups = group_by_domain(items(&[
            "https://example.com/a",
            "https://www.example.com/b",
            "http://example.com:8080/c",
            "https://shop.example.com/d",
        ]));
        assert_eq!(groups.len(), 2);
        let first: Vec<usize> = groups[0].iter().map(|(i, _)| *i).collect();
        assert_eq!(first, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_pool_returns_reports_in_input_order() {
        let ok = Step::Succeed(None);
        let fixture = Fixture::new(&[ok.clone(), ok.clone(), ok.clone()], &[], &[], &[], &[]);
        let log = Arc::new(MemoryLog::default());
        let controller = Arc::new(fixture.controller(log.clone()));
        let pool = EscalationPool::new(controller, 4).with_site_delay(DelayRange::ZERO);

        let reports = pool
            .run(
                items(&["https://a.com", "https://b.com", "https://a.com/x"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let urls: Vec<&str> = reports.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.com", "https://b.com", "https://a.com/x"]);
        assert!(reports.iter().all(|r| r.outcome.is_success()));
        assert_eq!(log.rows.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_same_domain_runs_sequentially() {
        let fixture = Fixture::new(
            &[Step::Succeed(None), Step::Succeed(None)],
            &[],
            &[],
            &[],
            &[],
        );
        let log = Arc::new(MemoryLog::default());
        let controller = Arc::new(fixture.controller(log.clone()));
        let pool = EscalationPool::new(controller, 8).with_site_delay(DelayRange::ZERO);

        pool.run(
            items(&["https://a.com/1", "https://a.com/2"]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(
            fixture.plain.urls(),
            vec!["https://a.com/1", "https://a.com/2"]
        );
    }

    #[tokio::test]
    async fn test_scrape_uses_recommended_rung_once_per_site() {
        use crate::models::ScrapeMethod;

        let fixture = Fixture::new(
            &[Step::Succeed(None), Step::Succeed(None)],
            &[],
            &[Step::Succeed(None)],
            &[],
            &[],
        );
        let log = Arc::new(MemoryLog::default());
        let controller = Arc::new(fixture.controller(log.clone()));
        let pool = EscalationPool::new(controller, 2).with_site_delay(DelayRange::ZERO);

        let mut rendered = WorkItem::new("https://spa.test");
        rendered.method = Some(ScrapeMethod::RenderedBrowser);
        let mut structured = WorkItem::new("https://feed.test");
        structured.method = Some(ScrapeMethod::StructuredData);
        let unlabelled = WorkItem::new("https://plain.test");

        let reports = pool
            .scrape(vec![rendered, structured, unlabelled], &CancellationToken::new())
            .await
            .unwrap();

        let methods: Vec<&str> = reports.iter().map(|r| r.outcome.method_label()).collect();
        assert_eq!(methods, vec!["rendered_browser", "plain_http", "plain_http"]);
        assert!(reports.iter().all(|r| r.attempts.len() == 1));
        assert_eq!(log.rows.lock().unwrap().len(), 3);
        assert_eq!(fixture.rendered.urls(), vec!["https://spa.test"]);
        assert_eq!(fixture.enhanced.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_pool_runs_nothing() {
        let fixture = Fixture::new(&[], &[], &[], &[], &[]);
        let log = Arc::new(MemoryLog::default());
        let controller = Arc::new(fixture.controller(log.clone()));
        let pool = EscalationPool::new(controller, 2);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let reports = pool.run(items(&["https://a.com"]), &cancel).await.unwrap();
        assert!(reports.is_empty());
        assert_eq!(fixture.plain.call_count(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_stops_pool() {
        let fixture = Fixture::new(&[Step::Succeed(None)], &[], &[], &[], &[]);
        let log = Arc::new(MemoryLog {
            fail: true,
            ..MemoryLog::default()
        });
        let controller = Arc::new(fixture.controller(log));
        let pool = EscalationPool::new(controller, 1).with_site_delay(DelayRange::ZERO);

        let result = pool
            .run(items(&["https://a.com", "https://a.com/2"]), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(StoreError::Io(_))));
        assert_eq!(fixture.plain.call_count(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_items_still_reported() {
        let fail = Step::Fail(crate::models::ErrorKind::Transport);
        let fixture = Fixture::new(&[fail.clone()], &[fail.clone()], &[fail.clone()], &[fail.clone()], &[fail]);
        let log = Arc::new(MemoryLog::default());
        let controller = Arc::new(fixture.controller(log));
        let pool = EscalationPool::new(controller, 1);

        let reports = pool
            .run(items(&["https://gone.test"]), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reports[0].outcome, RunOutcome::Exhausted);
    }
}
