//! Fallback controller path (§4.6): used when no policy daemon is present.
//! Mutates default-route metrics directly rather than a weighted member
//! table, gated behind `use_policy_daemon=false` / `fallback_route_mutation`
//! (§9 Open Question — resolved in favor of route metric mutation).

use super::{ApplyOutcome, Controller};
use linkwarden_common::MemberId;
use std::time::Duration;

/// Route metric assigned to the preferred interface's default route.
pub const PREFERRED_METRIC: u32 = 100;
/// Route metric assigned to every non-preferred interface's default route.
pub const OTHER_METRIC: u32 = 600;

/// Abstraction over the kernel route table / netdev-control RPC.
pub trait RouteTable: Send + Sync {
    fn current_default_iface(&self) -> Result<Option<String>, String>;
    fn set_metric(&self, iface: &str, metric: u32) -> Result<(), String>;
}

pub struct FallbackRouteController<R: RouteTable> {
    routes: R,
    /// Maps a member id to its backing netdev, since the route table deals
    /// in interfaces, not member identities.
    iface_of: Box<dyn Fn(&MemberId) -> String + Send + Sync>,
}

impl<R: RouteTable> FallbackRouteController<R> {
    pub fn new(routes: R, iface_of: impl Fn(&MemberId) -> String + Send + Sync + 'static) -> Self {
        FallbackRouteController {
            routes,
            iface_of: Box::new(iface_of),
        }
    }
}

impl<R: RouteTable> Controller for FallbackRouteController<R> {
    fn apply(&self, target: &MemberId, all_members: &[MemberId], _deadline: Duration) -> ApplyOutcome {
        let target_iface = (self.iface_of)(target);
        for id in all_members {
            let iface = (self.iface_of)(id);
            let metric = if id == target { PREFERRED_METRIC } else { OTHER_METRIC };
            if let Err(e) = self.routes.set_metric(&iface, metric) {
                return ApplyOutcome::failure(format!("set_metric({iface}) failed: {e}"));
            }
        }

        match self.routes.current_default_iface() {
            Ok(Some(active)) if active == target_iface => ApplyOutcome::success("verified"),
            Ok(_) => ApplyOutcome {
                applied: true,
                verified: false,
                rolled_back: false,
                reason: "route_not_observed".to_string(),
            },
            Err(e) => ApplyOutcome {
                applied: true,
                verified: false,
                rolled_back: false,
                reason: format!("verify_failed: {e}"),
            },
        }
    }
}
