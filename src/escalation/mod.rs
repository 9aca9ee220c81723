//! Escalation: the per-URL ladder controller, its delay policy, and the
//! worker pool that spreads URLs across domains.

mod controller;
mod delay;
mod pool;

pub use controller::{
    new_session_id, EscalationController, Ladder, RunOutcome, RunReport, RunState,
};
pub use delay::{pause, DelayPolicy, DelayRange};
pub use pool::{group_by_domain, EscalationPool};
