//! Randomized, cancellable pauses between ladder rungs and between sites.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::models::Strategy;

/// Inclusive bounds for a uniformly random pause, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange {
        min_ms: 0,
        max_ms: 0,
    };

    pub const fn from_secs(min: u64, max: u64) -> Self {
        Self {
            min_ms: min * 1000,
            max_ms: max * 1000,
        }
    }

    /// Draw a duration within the bounds. A reversed range yields `min_ms`.
    pub fn sample(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::rng().random_range(self.min_ms..=self.max_ms))
    }

    pub fn is_zero(&self) -> bool {
        self.max_ms == 0
    }
}

/// Pause bounds applied after each failed rung. Cheap HTTP rungs wait less
/// than browser rungs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayPolicy {
    after_plain: DelayRange,
    after_enhanced: DelayRange,
    after_rendered: DelayRange,
    after_stealth: DelayRange,
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self {
            after_plain: DelayRange::from_secs(1, 3),
            after_enhanced: DelayRange::from_secs(2, 4),
            after_rendered: DelayRange::from_secs(2, 5),
            after_stealth: DelayRange::from_secs(2, 5),
        }
    }
}

impl DelayPolicy {
    /// No pauses at all.
    pub fn none() -> Self {
        Self {
            after_plain: DelayRange::ZERO,
            after_enhanced: DelayRange::ZERO,
            after_rendered: DelayRange::ZERO,
            after_stealth: DelayRange::ZERO,
        }
    }

    pub fn new(
        after_plain: DelayRange,
        after_enhanced: DelayRange,
        after_rendered: DelayRange,
        after_stealth: DelayRange,
    ) -> Self {
        Self {
            after_plain,
            after_enhanced,
            after_rendered,
            after_stealth,
        }
    }

    /// Bounds for the pause that follows a failed `strategy`.
    pub fn after(&self, strategy: Strategy) -> DelayRange {
        match strategy {
            Strategy::PlainHttp => self.after_plain,
            Strategy::EnhancedHttp => self.after_enhanced,
            Strategy::RenderedBrowser => self.after_rendered,
            Strategy::StealthBrowser => self.after_stealth,
            Strategy::DomainVerification => DelayRange::ZERO,
        }
    }
}

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `false` if the sleep was cut short by cancellation.
pub async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if duration.is_zero() {
        return true;
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_within_bounds() {
        let range = DelayRange {
            min_ms: 10,
            max_ms: 20,
        };
        for _ in 0..100 {
            let d = range.sample().as_millis() as u64;
            assert!((10..=20).contains(&d));
        }
    }

    #[test]
    fn test_degenerate_range() {
        let range = DelayRange {
            min_ms: 50,
            max_ms: 10,
        };
        assert_eq!(range.sample(), Duration::from_millis(50));
        assert_eq!(DelayRange::ZERO.sample(), Duration::ZERO);
    }

    #[test]
    fn test_default_bounds_widen_with_cost() {
        let policy = DelayPolicy::default();
        assert_eq!(policy.after(Strategy::PlainHttp), DelayRange::from_secs(1, 3));
        assert_eq!(policy.after(Strategy::EnhancedHttp), DelayRange::from_secs(2, 4));
        assert_eq!(policy.after(Strategy::RenderedBrowser), DelayRange::from_secs(2, 5));
        assert_eq!(policy.after(Strategy::StealthBrowser), DelayRange::from_secs(2, 5));
        assert!(policy.after(Strategy::DomainVerification).is_zero());
    }

    #[tokio::test]
    async fn test_pause_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let completed = pause(Duration::from_secs(60), &cancel).await;
        assert!(!completed);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_pause_completes() {
        let cancel = CancellationToken::new();
        assert!(pause(Duration::from_millis(5), &cancel).await);
    }
}
