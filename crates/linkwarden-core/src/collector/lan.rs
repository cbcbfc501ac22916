//! LAN/other collector (§4.2): common TCP probe only, no class-specific RPC.

use super::common::common_probe;
use super::{now_ms, CollectOutcome, Collector};
use linkwarden_common::{Class, Member, MetricsSample};
use std::net::SocketAddr;
use std::time::Duration;

pub struct LanCollector {
    class: Class,
    targets: Vec<SocketAddr>,
}

impl LanCollector {
    pub fn new(class: Class, targets: Vec<SocketAddr>) -> Self {
        LanCollector { class, targets }
    }
}

impl Collector for LanCollector {
    fn class(&self) -> Class {
        self.class
    }

    fn collect(&self, member: &Member, deadline: Duration) -> CollectOutcome {
        let probe = common_probe(&self.targets, deadline);
        if probe.all_failed() {
            return CollectOutcome::FailTransient(format!(
                "common probe found no reachable target for {}",
                member.iface
            ));
        }
        let mut sample = MetricsSample::new(member.id.clone(), now_ms());
        sample.latency_ms = probe.latency_ms;
        sample.loss_pct = probe.loss_pct;
        sample.jitter_ms = probe.jitter_ms;
        CollectOutcome::Sample(sample)
    }
}
