//! Escalation runs reconstructed from the attempt log.

use chrono::{DateTime, Utc};

use super::{Attempt, EXHAUSTED_LABEL};

/// All attempts for one URL made by one controller session, in append order.
#[derive(Debug, Clone, PartialEq)]
pub struct EscalationRun {
    pub url: String,
    pub session_id: String,
    pub attempts: Vec<Attempt>,
}

impl EscalationRun {
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.attempts.first().map(|a| a.scraped_at)
    }

    pub fn last_attempt(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    /// Label of the final row: the winning strategy, or `none` when exhausted.
    pub fn final_method(&self) -> &str {
        self.last_attempt()
            .map(|a| a.strategy_name.as_str())
            .unwrap_or(EXHAUSTED_LABEL)
    }

    /// Any row in the run succeeded, including a relocation without content.
    pub fn succeeded(&self) -> bool {
        self.attempts.iter().any(|a| a.succeeded)
    }
}

/// Group attempts (already ordered) into runs keyed by `(url, session_id)`,
/// preserving first-seen order of the runs.
pub fn group_runs(attempts: Vec<Attempt>) -> Vec<EscalationRun> {
    let mut runs: Vec<EscalationRun> = Vec::new();
    for attempt in attempts {
        match runs
            .iter_mut()
            .find(|r| r.url == attempt.url && r.session_id == attempt.session_id)
        {
            Some(run) => run.attempts.push(attempt),
            None => runs.push(EscalationRun {
                url: attempt.url.clone(),
                session_id: attempt.session_id.clone(),
                attempts: vec![attempt],
            }),
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ErrorKind, Strategy};

    fn row(session: &str, strategy: Strategy, ok: bool) -> Attempt {
        let attempt = Attempt::new("https://example.com", strategy).with_session(session);
        if ok {
            attempt.succeed()
        } else {
            attempt.fail(ErrorKind::Transport, "refused")
        }
    }

    #[test]
    fn test_group_by_session() {
        let runs = group_runs(vec![
            row("s1", Strategy::PlainHttp, false),
            row("s2", Strategy::PlainHttp, true),
            row("s1", Strategy::EnhancedHttp, true),
        ]);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].session_id, "s1");
        assert_eq!(runs[0].attempts.len(), 2);
        assert_eq!(runs[0].final_method(), "enhanced_http");
        assert!(runs[1].succeeded());
    }

    #[test]
    fn test_exhausted_run() {
        let runs = group_runs(vec![
            row("s1", Strategy::PlainHttp, false),
            row("s1", Strategy::DomainVerification, false).relabel(EXHAUSTED_LABEL),
        ]);
        assert!(!runs[0].succeeded());
        assert_eq!(runs[0].final_method(), "none");
    }
}
