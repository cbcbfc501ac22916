//! Controller (§4.6): makes the host route via the selected member,
//! atomically and reversibly. Three implementations share the
//! [`Controller`] contract — primary (policy-daemon), fallback (route
//! metric mutation), and dry-run.

pub mod dry_run;
pub mod fallback;
pub mod policy_daemon;

pub use dry_run::DryRunController;
pub use fallback::{FallbackRouteController, RouteTable};
pub use policy_daemon::{PolicyDaemonClient, PolicyDaemonController};

use linkwarden_common::MemberId;
use std::time::Duration;

/// Result of one `Apply` call (§4.6 "Contracts").
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    pub applied: bool,
    pub verified: bool,
    pub rolled_back: bool,
    pub reason: String,
}

impl ApplyOutcome {
    pub fn success(reason: impl Into<String>) -> Self {
        ApplyOutcome {
            applied: true,
            verified: true,
            rolled_back: false,
            reason: reason.into(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        ApplyOutcome {
            applied: false,
            verified: false,
            rolled_back: false,
            reason: reason.into(),
        }
    }
}

/// Makes the host prefer `target` for outbound traffic. Synchronous,
/// bounded by `deadline`, idempotent (§4.6 "Contracts").
pub trait Controller: Send + Sync {
    fn apply(&self, target: &MemberId, all_members: &[MemberId], deadline: Duration) -> ApplyOutcome;
}
