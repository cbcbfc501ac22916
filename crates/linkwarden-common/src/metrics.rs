//! Metrics sample — the uniform record every collector produces (§3, §4.2).

use crate::member::MemberId;
use serde::{Deserialize, Serialize};

/// Timestamped metrics record produced by a collector for one member.
///
/// Invariants (checked by [`MetricsSample::validate`]):
/// - `0 <= loss_pct <= 100`
/// - `latency_ms >= 0.0` when present
/// - timestamps are monotonic per member (enforced by the telemetry ring,
///   not by this type, since a single sample has no history to compare to)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSample {
    pub member: MemberId,
    /// Milliseconds since the Unix epoch — monotonic per member.
    pub ts_ms: i64,
    pub latency_ms: Option<f64>,
    pub loss_pct: f64,
    pub jitter_ms: Option<f64>,

    // ── Satellite-specific ──
    pub obstruction_pct: Option<f64>,
    pub snr_above_noise_floor: Option<bool>,
    pub snr_persistently_low: Option<bool>,
    pub uptime_s: Option<u64>,

    // ── Cellular-specific ──
    pub rsrp_dbm: Option<f64>,
    pub rsrq_db: Option<f64>,
    pub sinr_db: Option<f64>,
    pub cqi: Option<u8>,
    pub operator: Option<String>,
    pub band: Option<String>,
    pub cell_id: Option<String>,
    pub roaming: Option<bool>,

    // ── Wi-Fi-specific ──
    pub rssi_dbm: Option<f64>,
    pub wifi_bitrate_mbps: Option<f64>,
    pub wifi_snr_db: Option<f64>,
    pub is_sta: Option<bool>,

    // ── Generic throughput / predictive hints ──
    pub rx_bytes: Option<u64>,
    pub tx_bytes: Option<u64>,
    pub gps_valid: Option<bool>,
}

/// Error returned by [`MetricsSample::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SampleInvariantError {
    #[error("loss_pct {0} out of range [0, 100]")]
    LossOutOfRange(String),
    #[error("latency_ms {0} is negative")]
    NegativeLatency(String),
}

impl MetricsSample {
    pub fn new(member: MemberId, ts_ms: i64) -> Self {
        MetricsSample {
            member,
            ts_ms,
            latency_ms: None,
            loss_pct: 0.0,
            jitter_ms: None,
            obstruction_pct: None,
            snr_above_noise_floor: None,
            snr_persistently_low: None,
            uptime_s: None,
            rsrp_dbm: None,
            rsrq_db: None,
            sinr_db: None,
            cqi: None,
            operator: None,
            band: None,
            cell_id: None,
            roaming: None,
            rssi_dbm: None,
            wifi_bitrate_mbps: None,
            wifi_snr_db: None,
            is_sta: None,
            rx_bytes: None,
            tx_bytes: None,
            gps_valid: None,
        }
    }

    pub fn validate(&self) -> Result<(), SampleInvariantError> {
        if !(0.0..=100.0).contains(&self.loss_pct) {
            return Err(SampleInvariantError::LossOutOfRange(format!(
                "{}",
                self.loss_pct
            )));
        }
        if let Some(lat) = self.latency_ms {
            if lat < 0.0 {
                return Err(SampleInvariantError::NegativeLatency(format!("{lat}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_sample_passes() {
        let mut s = MetricsSample::new(MemberId::from("wan0"), 1000);
        s.latency_ms = Some(50.0);
        s.loss_pct = 0.5;
        assert!(s.validate().is_ok());
    }

    #[test]
    fn loss_out_of_range_rejected() {
        let mut s = MetricsSample::new(MemberId::from("wan0"), 1000);
        s.loss_pct = 150.0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn negative_latency_rejected() {
        let mut s = MetricsSample::new(MemberId::from("wan0"), 1000);
        s.latency_ms = Some(-1.0);
        assert!(s.validate().is_err());
    }
}
