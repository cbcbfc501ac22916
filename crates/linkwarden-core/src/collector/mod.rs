//! Per-class metric collectors (§4.2).
//!
//! A single capability set — `Collect`, `desired_interval` — with a tagged
//! variant of class-specific sample fields (§9 "Heterogeneous collectors"):
//! composition of [`common::common_probe`] plus class-specific extractors,
//! never deep inheritance.

pub mod cellular;
pub mod common;
pub mod lan;
pub mod satellite;
pub mod wifi;

pub use cellular::{CellularCollector, CellularRpc, CellularTelemetry};
pub use lan::LanCollector;
pub use satellite::{SatelliteCollector, SatelliteRpc, SatelliteTelemetry};
pub use wifi::{WifiCollector, WifiRpc, WifiTelemetry};

use linkwarden_common::{Class, Member, MetricsSample};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Outcome of one collection attempt (§4.2 "Failure contract").
#[derive(Debug, Clone)]
pub enum CollectOutcome {
    Sample(MetricsSample),
    /// A single probe failed; engine still scores with degraded confidence.
    FailTransient(String),
    /// Unreachable on this class; engine marks the member ineligible after
    /// N consecutive permanents.
    FailPermanent(String),
}

pub trait Collector: Send + Sync {
    fn class(&self) -> Class;
    /// Runs the probe chain for `member`, bounded by `deadline`. Must not
    /// block past `deadline` (§4.2, §5 "Cancellation & timeouts").
    fn collect(&self, member: &Member, deadline: Duration) -> CollectOutcome;
}

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Negotiated per-member sampling cadence (§4.2 "Adaptive sampling", §5
/// "Backpressure"): starts at the class base rate and backs off by ×1.5 per
/// consecutive deadline overrun, capped at `max_interval_s`; metered
/// members are additionally slowed.
pub struct AdaptiveSampler {
    multiplier: f64,
}

impl AdaptiveSampler {
    const BACKOFF_FACTOR: f64 = 1.5;
    const MAX_MULTIPLIER: f64 = 8.0;
    const METERED_FACTOR: f64 = 1.5;

    pub fn new() -> Self {
        AdaptiveSampler { multiplier: 1.0 }
    }

    /// Call when a collection exceeded its class budget.
    pub fn record_overrun(&mut self) {
        self.multiplier = (self.multiplier * Self::BACKOFF_FACTOR).min(Self::MAX_MULTIPLIER);
    }

    /// Call when a collection completed within budget.
    pub fn record_on_time(&mut self) {
        self.multiplier = 1.0;
    }

    pub fn interval(&self, class: Class, metered: bool, max_interval_s: u64) -> Duration {
        let mut secs = class.base_interval_s() as f64 * self.multiplier;
        if metered {
            secs *= Self::METERED_FACTOR;
        }
        Duration::from_secs_f64(secs.min(max_interval_s as f64).max(1.0))
    }
}

impl Default for AdaptiveSampler {
    fn default() -> Self {
        AdaptiveSampler::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_starts_at_class_base_rate() {
        let sampler = AdaptiveSampler::new();
        assert_eq!(
            sampler.interval(Class::Cellular, false, 120),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn overrun_backs_off_interval() {
        let mut sampler = AdaptiveSampler::new();
        sampler.record_overrun();
        assert_eq!(
            sampler.interval(Class::Satellite, false, 120),
            Duration::from_secs_f64(7.5)
        );
    }

    #[test]
    fn interval_never_exceeds_max() {
        let mut sampler = AdaptiveSampler::new();
        for _ in 0..10 {
            sampler.record_overrun();
        }
        assert!(sampler.interval(Class::Cellular, false, 40).as_secs_f64() <= 40.0);
    }

    #[test]
    fn metered_slows_cadence() {
        let sampler = AdaptiveSampler::new();
        let normal = sampler.interval(Class::Cellular, false, 120);
        let metered = sampler.interval(Class::Cellular, true, 120);
        assert!(metered > normal);
    }

    #[test]
    fn on_time_resets_backoff() {
        let mut sampler = AdaptiveSampler::new();
        sampler.record_overrun();
        sampler.record_overrun();
        sampler.record_on_time();
        assert_eq!(
            sampler.interval(Class::Wifi, false, 120),
            Duration::from_secs(10)
        );
    }
}
