//! Primary controller path (§4.6): drives the host's routing-policy daemon
//! by rewriting member weights, committing, and verifying the result.

use super::{ApplyOutcome, Controller};
use linkwarden_common::MemberId;
use std::collections::HashMap;
use std::time::Duration;

/// Weight the target member is set to while selected.
pub const HIGH_WEIGHT: u32 = 100;
/// Weight every other member is set to while not selected.
pub const LOW_WEIGHT: u32 = 10;

/// Abstraction over the policy daemon's config RPC (e.g. mwan3/netifd-style
/// weighted member tables), so the controller is testable without a real
/// daemon.
pub trait PolicyDaemonClient: Send + Sync {
    fn read_weights(&self) -> Result<HashMap<MemberId, u32>, String>;
    fn write_weights(&self, weights: &HashMap<MemberId, u32>) -> Result<(), String>;
    fn commit_reload(&self) -> Result<(), String>;
    fn read_active_weights(&self) -> Result<HashMap<MemberId, u32>, String>;
}

pub struct PolicyDaemonController<C: PolicyDaemonClient> {
    client: C,
    verify_retries: u32,
    verify_retry_delay: Duration,
}

impl<C: PolicyDaemonClient> PolicyDaemonController<C> {
    pub fn new(client: C) -> Self {
        PolicyDaemonController {
            client,
            verify_retries: 3,
            verify_retry_delay: Duration::from_millis(200),
        }
    }

    pub fn with_verify_retry_delay(mut self, delay: Duration) -> Self {
        self.verify_retry_delay = delay;
        self
    }

    fn expected_matches(&self, active: &HashMap<MemberId, u32>, target: &MemberId) -> bool {
        active.get(target).copied() == Some(HIGH_WEIGHT)
    }
}

impl<C: PolicyDaemonClient> Controller for PolicyDaemonController<C> {
    fn apply(&self, target: &MemberId, all_members: &[MemberId], _deadline: Duration) -> ApplyOutcome {
        let prior = match self.client.read_weights() {
            Ok(w) => w,
            Err(e) => return ApplyOutcome::failure(format!("read_weights failed: {e}")),
        };

        let mut desired = prior.clone();
        for id in all_members {
            desired.insert(
                id.clone(),
                if id == target { HIGH_WEIGHT } else { LOW_WEIGHT },
            );
        }

        if let Err(e) = self.client.write_weights(&desired) {
            return ApplyOutcome::failure(format!("write_weights failed: {e}"));
        }
        if let Err(e) = self.client.commit_reload() {
            return ApplyOutcome::failure(format!("commit_reload failed: {e}"));
        }

        for attempt in 0..self.verify_retries {
            if let Ok(active) = self.client.read_active_weights() {
                if self.expected_matches(&active, target) {
                    return ApplyOutcome::success("verified");
                }
            }
            if attempt + 1 < self.verify_retries {
                std::thread::sleep(self.verify_retry_delay);
            }
        }

        // Verification never observed the expected state: roll back.
        let rollback_ok = self.client.write_weights(&prior).is_ok() && self.client.commit_reload().is_ok();
        ApplyOutcome {
            applied: true,
            verified: false,
            rolled_back: rollback_ok,
            reason: "verification_failed".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeDaemon {
        active: Mutex<HashMap<MemberId, u32>>,
        fail_verify_forever: bool,
    }

    impl PolicyDaemonClient for FakeDaemon {
        fn read_weights(&self) -> Result<HashMap<MemberId, u32>, String> {
            Ok(self.active.lock().unwrap().clone())
        }
        fn write_weights(&self, weights: &HashMap<MemberId, u32>) -> Result<(), String> {
            if !self.fail_verify_forever {
                *self.active.lock().unwrap() = weights.clone();
            }
            Ok(())
        }
        fn commit_reload(&self) -> Result<(), String> {
            Ok(())
        }
        fn read_active_weights(&self) -> Result<HashMap<MemberId, u32>, String> {
            Ok(self.active.lock().unwrap().clone())
        }
    }

    fn members() -> Vec<MemberId> {
        vec![MemberId::from("a"), MemberId::from("b")]
    }

    #[test]
    fn successful_apply_verifies_high_weight_on_target() {
        let daemon = FakeDaemon {
            active: Mutex::new(HashMap::from([
                (MemberId::from("a"), 100),
                (MemberId::from("b"), 100),
            ])),
            fail_verify_forever: false,
        };
        let controller = PolicyDaemonController::new(daemon);
        let outcome = controller.apply(&MemberId::from("b"), &members(), Duration::from_secs(5));
        assert!(outcome.applied);
        assert!(outcome.verified);
        assert!(!outcome.rolled_back);
    }

    #[test]
    fn verification_failure_triggers_rollback() {
        let daemon = FakeDaemon {
            active: Mutex::new(HashMap::from([
                (MemberId::from("a"), 100),
                (MemberId::from("b"), 10),
            ])),
            fail_verify_forever: true, // writes never actually take effect
        };
        let controller =
            PolicyDaemonController::new(daemon).with_verify_retry_delay(Duration::from_millis(1));
        let outcome = controller.apply(&MemberId::from("b"), &members(), Duration::from_secs(5));
        assert!(!outcome.verified);
        assert!(outcome.rolled_back);
        assert_eq!(outcome.reason, "verification_failed");
    }
}
