//! Data models for fetchladder.

mod attempt;
mod probe;
mod recommendation;
mod report;
mod run;

pub use attempt::{Attempt, Strategy, EXHAUSTED_LABEL, RELOCATED_STEALTH_LABEL};
pub use probe::{ErrorKind, ProbeResult};
pub use recommendation::{ScrapeMethod, StrategyRecommendation};
pub use report::{ProbeRecord, WorkItem};
pub use run::{group_runs, EscalationRun};
