//! Dry-run controller (§4.6): never mutates host state; logs intent.

use super::{ApplyOutcome, Controller};
use linkwarden_common::MemberId;
use std::time::Duration;
use tracing::info;

pub struct DryRunController;

impl Controller for DryRunController {
    fn apply(&self, target: &MemberId, all_members: &[MemberId], _deadline: Duration) -> ApplyOutcome {
        info!(target = %target, members = ?all_members, "dry-run: would apply selection");
        ApplyOutcome::success("dry_run")
    }
}
