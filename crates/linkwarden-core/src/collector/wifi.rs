//! Wi-Fi STA collector (§4.2): wireless-info RPC (e.g. `wpa_supplicant`
//! over D-Bus) primary, `/proc/net/wireless` fallback, `iw` tool invocation
//! last resort. SNR is derived assuming a -95 dBm noise floor when the
//! provider doesn't report noise directly.

use super::common::common_probe;
use super::{now_ms, CollectOutcome, Collector};
use linkwarden_common::{Class, Member, MetricsSample};
use std::net::SocketAddr;
use std::process::Command;
use std::time::Duration;

/// Noise floor assumed when a provider reports RSSI but not noise (§4.2).
const ASSUMED_NOISE_FLOOR_DBM: f64 = -95.0;

#[derive(Debug, Clone)]
pub struct WifiTelemetry {
    pub rssi_dbm: f64,
    pub noise_dbm: Option<f64>,
    pub bitrate_mbps: Option<f64>,
}

/// Primary provider: a wireless-info RPC surface.
pub trait WifiRpc: Send + Sync {
    fn query(&self, iface: &str, timeout: Duration) -> Result<WifiTelemetry, String>;
}

fn derive_snr(t: &WifiTelemetry) -> f64 {
    t.rssi_dbm - t.noise_dbm.unwrap_or(ASSUMED_NOISE_FLOOR_DBM)
}

/// `/proc/net/wireless` fallback: `Iface | Status | Link | Level | Noise | ...`.
fn read_proc_net_wireless(iface: &str) -> Option<WifiTelemetry> {
    let content = std::fs::read_to_string("/proc/net/wireless").ok()?;
    for line in content.lines().skip(2) {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix(iface) else {
            continue;
        };
        let rest = rest.trim_start_matches(':').trim();
        let fields: Vec<&str> = rest.split_whitespace().collect();
        // fields: status link level noise ...
        if fields.len() < 3 {
            continue;
        }
        let level: f64 = fields[1].trim_end_matches('.').parse().ok()?;
        let noise: Option<f64> = fields.get(2).and_then(|s| s.trim_end_matches('.').parse().ok());
        return Some(WifiTelemetry {
            rssi_dbm: level,
            noise_dbm: noise,
            bitrate_mbps: None,
        });
    }
    None
}

/// Last-resort fallback: shell out to `iw dev <iface> link`.
fn read_iw_tool(iface: &str) -> Option<WifiTelemetry> {
    let output = Command::new("iw").arg("dev").arg(iface).arg("link").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let mut rssi = None;
    let mut bitrate = None;
    for line in text.lines() {
        let line = line.trim();
        if let Some(v) = line.strip_prefix("signal:") {
            rssi = v.trim().split_whitespace().next()?.parse::<f64>().ok();
        } else if let Some(v) = line.strip_prefix("tx bitrate:") {
            bitrate = v.trim().split_whitespace().next()?.parse::<f64>().ok();
        }
    }
    rssi.map(|rssi_dbm| WifiTelemetry {
        rssi_dbm,
        noise_dbm: None,
        bitrate_mbps: bitrate,
    })
}

pub struct WifiCollector<R: WifiRpc> {
    rpc: R,
    fallback_targets: Vec<SocketAddr>,
}

impl<R: WifiRpc> WifiCollector<R> {
    pub fn new(rpc: R, fallback_targets: Vec<SocketAddr>) -> Self {
        WifiCollector {
            rpc,
            fallback_targets,
        }
    }
}

impl<R: WifiRpc> Collector for WifiCollector<R> {
    fn class(&self) -> Class {
        Class::Wifi
    }

    fn collect(&self, member: &Member, deadline: Duration) -> CollectOutcome {
        let mut sample = MetricsSample::new(member.id.clone(), now_ms());
        let probe = common_probe(&self.fallback_targets, deadline);
        sample.latency_ms = probe.latency_ms;
        sample.loss_pct = probe.loss_pct;
        sample.jitter_ms = probe.jitter_ms;
        sample.is_sta = Some(true);

        let telemetry = self
            .rpc
            .query(&member.iface, deadline)
            .ok()
            .or_else(|| read_proc_net_wireless(&member.iface))
            .or_else(|| read_iw_tool(&member.iface));

        match telemetry {
            Some(t) => {
                sample.rssi_dbm = Some(t.rssi_dbm);
                sample.wifi_snr_db = Some(derive_snr(&t));
                sample.wifi_bitrate_mbps = t.bitrate_mbps;
                CollectOutcome::Sample(sample)
            }
            None if probe.all_failed() => CollectOutcome::FailTransient(format!(
                "wifi RPC, proc-fs and iw all failed to report {}",
                member.iface
            )),
            None => CollectOutcome::Sample(sample),
        }
    }
}
