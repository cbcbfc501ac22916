//! Cellular collector (§4.2): mobile-bus RPC (ModemManager-style) primary,
//! raw modem control-channel fallback, netdev sysfs counters as the last
//! resort. The RPC transport itself is out of scope (§10.3); only the
//! trait shape is defined here. RF fields populated here feed
//! [`crate::scoring::CellularRadioWindow`] downstream — the window itself is
//! owned per-member by the core loop, not by the collector, since it
//! accumulates across ticks rather than per collection.

use super::common::common_probe;
use super::{now_ms, CollectOutcome, Collector};
use linkwarden_common::{Class, Member, MetricsSample};
use std::net::SocketAddr;
use std::time::Duration;

/// Radio + session telemetry pulled from the mobile bus.
#[derive(Debug, Clone)]
pub struct CellularTelemetry {
    pub rsrp_dbm: f64,
    pub rsrq_db: f64,
    pub sinr_db: f64,
    pub cqi: Option<u8>,
    pub operator: Option<String>,
    pub band: Option<String>,
    pub cell_id: Option<String>,
    pub roaming: bool,
    pub rx_bytes: Option<u64>,
    pub tx_bytes: Option<u64>,
}

/// Mobile-bus RPC surface (e.g. `org.freedesktop.ModemManager1` over D-Bus).
pub trait CellularRpc: Send + Sync {
    fn query(&self, iface: &str, timeout: Duration) -> Result<CellularTelemetry, String>;
}

/// Raw modem control-channel fallback (e.g. AT commands over a serial/USB
/// AT port) used when the mobile bus itself is unreachable. Narrower than
/// [`CellularRpc`]: only the fields commonly available via `AT+CESQ`/`AT+COPS`.
pub trait ModemControlChannel: Send + Sync {
    fn query(&self, iface: &str, timeout: Duration) -> Result<CellularTelemetry, String>;
}

/// Reads `/sys/class/net/<iface>/statistics/{rx,tx}_bytes` — the last-resort
/// fallback when neither the mobile bus nor the control channel respond.
/// Carries no RF fields, only throughput counters and the common TCP probe.
pub struct SysfsCounters;

impl SysfsCounters {
    fn read_counter(iface: &str, file: &str) -> Option<u64> {
        std::fs::read_to_string(format!(
            "/sys/class/net/{iface}/statistics/{file}"
        ))
        .ok()?
        .trim()
        .parse()
        .ok()
    }
}

pub struct CellularCollector<R: CellularRpc, M: ModemControlChannel> {
    rpc: R,
    control_channel: M,
    fallback_targets: Vec<SocketAddr>,
}

impl<R: CellularRpc, M: ModemControlChannel> CellularCollector<R, M> {
    pub fn new(rpc: R, control_channel: M, fallback_targets: Vec<SocketAddr>) -> Self {
        CellularCollector {
            rpc,
            control_channel,
            fallback_targets,
        }
    }

    fn fill_rf(sample: &mut MetricsSample, t: &CellularTelemetry) {
        sample.rsrp_dbm = Some(t.rsrp_dbm);
        sample.rsrq_db = Some(t.rsrq_db);
        sample.sinr_db = Some(t.sinr_db);
        sample.cqi = t.cqi;
        sample.operator = t.operator.clone();
        sample.band = t.band.clone();
        sample.cell_id = t.cell_id.clone();
        sample.roaming = Some(t.roaming);
        sample.rx_bytes = t.rx_bytes;
        sample.tx_bytes = t.tx_bytes;
    }
}

impl<R: CellularRpc, M: ModemControlChannel> Collector for CellularCollector<R, M> {
    fn class(&self) -> Class {
        Class::Cellular
    }

    fn collect(&self, member: &Member, deadline: Duration) -> CollectOutcome {
        let mut sample = MetricsSample::new(member.id.clone(), now_ms());
        let telemetry = self
            .rpc
            .query(&member.iface, deadline)
            .or_else(|_| self.control_channel.query(&member.iface, deadline));

        let probe = common_probe(&self.fallback_targets, deadline);
        sample.latency_ms = probe.latency_ms;
        sample.loss_pct = probe.loss_pct;
        sample.jitter_ms = probe.jitter_ms;

        match telemetry {
            Ok(t) => {
                Self::fill_rf(&mut sample, &t);
                CollectOutcome::Sample(sample)
            }
            Err(reason) => {
                sample.rx_bytes = SysfsCounters::read_counter(&member.iface, "rx_bytes");
                sample.tx_bytes = SysfsCounters::read_counter(&member.iface, "tx_bytes");
                if probe.all_failed() && sample.rx_bytes.is_none() {
                    CollectOutcome::FailTransient(format!(
                        "cellular mobile bus and control channel both failed ({reason}), no sysfs counters available"
                    ))
                } else {
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
    impl CellularRpc for OkRpc {
        fn query(&self, _iface: &str, _timeout: Duration) -> Result<CellularTelemetry, String> {
            Ok(CellularTelemetry {
                rsrp_dbm: -85.0,
                rsrq_db: -10.0,
                sinr_db: 12.0,
                cqi: Some(10),
                operator: Some("TestTel".into()),
                band: Some("B3".into()),
                cell_id: Some("abc123".into()),
                roaming: false,
                rx_bytes: Some(1000),
                tx_bytes: Some(500),
            })
        }
    }

    struct FailingRpc;
    impl CellularRpc for FailingRpc {
        fn query(&self, _iface: &str, _timeout: Duration) -> Result<CellularTelemetry, String> {
            Err("bus unreachable".into())
        }
    }

    struct FailingControl;
    impl ModemControlChannel for FailingControl {
        fn query(&self, _iface: &str, _timeout: Duration) -> Result<CellularTelemetry, String> {
            Err("no AT port".into())
        }
    }

    fn member() -> Member {
        Member::new(MemberId::from("cell0"), Class::Cellular, "wwan0")
    }

    #[test]
    fn rpc_success_populates_rf_fields() {
        let c = CellularCollector::new(OkRpc, FailingControl, vec![]);
        match c.collect(&member(), Duration::from_millis(200)) {
            CollectOutcome::Sample(s) => {
                assert_eq!(s.rsrp_dbm, Some(-85.0));
                assert_eq!(s.operator.as_deref(), Some("TestTel"));
            }
            other => panic!("expected sample, got {other:?}"),
        }
    }

    #[test]
    fn both_rpc_paths_failing_with_no_sysfs_is_transient() {
        let c = CellularCollector::new(FailingRpc, FailingControl, vec![]);
        match c.collect(&member(), Duration::from_millis(200)) {
            CollectOutcome::FailTransient(_) => {}
            other => panic!("expected FailTransient on a nonexistent iface, got {other:?}"),
        }
    }
}
