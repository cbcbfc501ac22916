//! Satellite collector (§4.2): terminal management RPC primary, common
//! TCP-probe fallback.

use super::common::common_probe;
use super::{now_ms, CollectOutcome, Collector};
use linkwarden_common::{Class, Member, MetricsSample};
use std::net::SocketAddr;
use std::time::Duration;

/// Telemetry pulled from the satellite terminal's management RPC.
#[derive(Debug, Clone)]
pub struct SatelliteTelemetry {
    pub latency_ms: f64,
    pub loss_pct: f64,
    pub jitter_ms: Option<f64>,
    pub obstruction_pct: f64,
    pub snr_above_noise_floor: bool,
    pub snr_persistently_low: bool,
    pub uptime_s: u64,
}

/// Abstraction over the terminal's management RPC (e.g. Starlink's gRPC
/// `dish_get_status`), so the collector is testable without a real dish.
pub trait SatelliteRpc: Send + Sync {
    fn query(&self, iface: &str, timeout: Duration) -> Result<SatelliteTelemetry, String>;
}

pub struct SatelliteCollector<R: SatelliteRpc> {
    rpc: R,
    fallback_targets: Vec<SocketAddr>,
}

impl<R: SatelliteRpc> SatelliteCollector<R> {
    pub fn new(rpc: R, fallback_targets: Vec<SocketAddr>) -> Self {
        SatelliteCollector {
            rpc,
            fallback_targets,
        }
    }
}

impl<R: SatelliteRpc> Collector for SatelliteCollector<R> {
    fn class(&self) -> Class {
        Class::Satellite
    }

    fn collect(&self, member: &Member, deadline: Duration) -> CollectOutcome {
        match self.rpc.query(&member.iface, deadline) {
            Ok(t) => {
                let mut sample = MetricsSample::new(member.id.clone(), now_ms());
                sample.latency_ms = Some(t.latency_ms);
                sample.loss_pct = t.loss_pct;
                sample.jitter_ms = t.jitter_ms;
                sample.obstruction_pct = Some(t.obstruction_pct);
                sample.snr_above_noise_floor = Some(t.snr_above_noise_floor);
                sample.snr_persistently_low = Some(t.snr_persistently_low);
                sample.uptime_s = Some(t.uptime_s);
                CollectOutcome::Sample(sample)
            }
            Err(reason) => {
                let probe = common_probe(&self.fallback_targets, deadline);
                if probe.all_failed() {
                    CollectOutcome::FailTransient(format!(
                        "satellite RPC failed ({reason}) and fallback probe found no response"
                    ))
                } else {
                    let mut sample = MetricsSample::new(member.id.clone(), now_ms());
                    sample.latency_ms = probe.latency_ms;
                    sample.loss_pct = probe.loss_pct;
                    sample.jitter_ms = probe.jitter_ms;
                    CollectOutcome::Sample(sample)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkwarden_common::MemberId;

    struct OkRpc;
    impl SatelliteRpc for OkRpc {
        fn query(&self, _iface: &str, _timeout: Duration) -> Result<SatelliteTelemetry, String> {
            Ok(SatelliteTelemetry {
                latency_ms: 45.0,
                loss_pct: 0.1,
                jitter_ms: Some(3.0),
                obstruction_pct: 0.0,
                snr_above_noise_floor: true,
                snr_persistently_low: false,
                uptime_s: 3600,
            })
        }
    }

    struct FailingRpc;
    impl SatelliteRpc for FailingRpc {
        fn query(&self, _iface: &str, _timeout: Duration) -> Result<SatelliteTelemetry, String> {
            Err("terminal unreachable".into())
        }
    }

    fn member() -> Member {
        Member::new(MemberId::from("sat0"), Class::Satellite, "wwan0")
    }

    #[test]
    fn rpc_success_populates_satellite_fields() {
        let c = SatelliteCollector::new(OkRpc, vec![]);
        match c.collect(&member(), Duration::from_secs(2)) {
            CollectOutcome::Sample(s) => {
                assert_eq!(s.obstruction_pct, Some(0.0));
                assert_eq!(s.snr_above_noise_floor, Some(true));
            }
            other => panic!("expected sample, got {other:?}"),
        }
    }

    #[test]
    fn rpc_failure_with_no_fallback_targets_is_transient() {
        let c = SatelliteCollector::new(FailingRpc, vec![]);
        match c.collect(&member(), Duration::from_millis(200)) {
            CollectOutcome::FailTransient(_) => {}
            other => panic!("expected FailTransient, got {other:?}"),
        }
    }
}
