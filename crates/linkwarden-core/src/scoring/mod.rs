//! Scoring (§4.3): per-sample instant score, rolling EWMA/window, and the
//! cellular stability composite.

mod cellular;

pub use cellular::{CellularRadioWindow, CellularStabilityTracker};

use linkwarden_common::config::MainSection;
use linkwarden_common::{Class, MetricsSample, Score};
use std::collections::VecDeque;

/// EWMA smoothing factor on `instant` (§3, §4.3).
pub const EWMA_ALPHA: f64 = 0.2;

/// Per-metric ok/bad thresholds feeding [`norm`] (§4.3 defaults).
#[derive(Debug, Clone, Copy)]
pub struct ScoringDefaults {
    pub latency_ok_ms: f64,
    pub latency_bad_ms: f64,
    pub loss_ok_pct: f64,
    pub loss_bad_pct: f64,
    pub jitter_ok_ms: f64,
    pub jitter_bad_ms: f64,
    pub obstruction_ok_pct: f64,
    pub obstruction_bad_pct: f64,
}

impl Default for ScoringDefaults {
    fn default() -> Self {
        ScoringDefaults {
            latency_ok_ms: 50.0,
            latency_bad_ms: 1500.0,
            loss_ok_pct: 0.0,
            loss_bad_pct: 10.0,
            jitter_ok_ms: 5.0,
            jitter_bad_ms: 200.0,
            obstruction_ok_pct: 0.0,
            obstruction_bad_pct: 10.0,
        }
    }
}

/// Piecewise-linear normalization to `[0, 1]`, inverted for "lower is
/// better" metrics: `1.0` at or below `ok`, `0.0` at or above `bad` (§4.3).
pub fn norm(x: f64, ok: f64, bad: f64) -> f64 {
    if (bad - ok).abs() < f64::EPSILON {
        return if x <= ok { 1.0 } else { 0.0 };
    }
    ((bad - x) / (bad - ok)).clamp(0.0, 1.0)
}

/// Linear clamp to `[0, 1]` for "higher is better" metrics, used by the
/// cellular level score (§4.3): `0.0` at or below `lo`, `1.0` at or above `hi`.
pub fn normalize(x: f64, lo: f64, hi: f64) -> f64 {
    if (hi - lo).abs() < f64::EPSILON {
        return if x >= hi { 1.0 } else { 0.0 };
    }
    ((x - lo) / (hi - lo)).clamp(0.0, 1.0)
}

/// Fixed point penalties applied after the class-weighted base score
/// (§4.3: "roaming penalty ... Wi-Fi weak-signal penalty ... small warm-up
/// penalty"). Warm-up itself is tracked via [`Score::warmup_remaining`],
/// not a score penalty, so members in warm-up are excluded from selection
/// outright (§4.5 step 1) rather than merely scored lower.
#[derive(Debug, Clone, Copy)]
pub struct Penalties {
    pub roaming_penalty: f64,
    pub wifi_weak_rssi_dbm: f64,
    pub wifi_weak_penalty: f64,
    pub satellite_snr_low_penalty: f64,
    pub satellite_snr_below_floor_penalty: f64,
}

impl Penalties {
    pub fn from_config(cfg: &MainSection) -> Self {
        Penalties {
            roaming_penalty: cfg.roaming_penalty,
            wifi_weak_rssi_dbm: cfg.wifi_weak_rssi_dbm,
            wifi_weak_penalty: cfg.wifi_weak_penalty,
            satellite_snr_low_penalty: 15.0,
            satellite_snr_below_floor_penalty: 10.0,
        }
    }
}

/// Per-class base weighting of the common latency/loss/jitter triple plus
/// the class-specific term (obstruction for satellite, radio stability for
/// cellular, signal for Wi-Fi) (§4.3: "class weights").
struct ClassWeights {
    latency: f64,
    loss: f64,
    jitter: f64,
    specific: f64,
}

fn class_weights(class: Class) -> ClassWeights {
    match class {
        Class::Satellite => ClassWeights {
            latency: 0.25,
            loss: 0.25,
            jitter: 0.10,
            specific: 0.40, // obstruction fraction
        },
        Class::Cellular => ClassWeights {
            latency: 0.20,
            loss: 0.20,
            jitter: 0.10,
            specific: 0.50, // radio stability score
        },
        Class::Wifi => ClassWeights {
            latency: 0.35,
            loss: 0.35,
            jitter: 0.10,
            specific: 0.20, // RSSI-derived signal term
        },
        Class::Lan | Class::Other => ClassWeights {
            latency: 0.45,
            loss: 0.45,
            jitter: 0.10,
            specific: 0.0,
        },
    }
}

/// Computes the instant score (§4.3) for one sample. `cellular_stability`
/// must be supplied (already hysteresis-gated) when `class == Cellular`;
/// ignored otherwise. `prefer_roaming` and `in_warmup` come from config /
/// decision-engine state respectively.
pub fn instant_score(
    sample: &MetricsSample,
    class: Class,
    defaults: &ScoringDefaults,
    penalties: &Penalties,
    cellular_stability: Option<f64>,
    prefer_roaming: bool,
) -> f64 {
    let w = class_weights(class);

    let latency_n = sample
        .latency_ms
        .map(|l| norm(l, defaults.latency_ok_ms, defaults.latency_bad_ms))
        .unwrap_or(0.5);
    let loss_n = norm(sample.loss_pct, defaults.loss_ok_pct, defaults.loss_bad_pct);
    let jitter_n = sample
        .jitter_ms
        .map(|j| norm(j, defaults.jitter_ok_ms, defaults.jitter_bad_ms))
        .unwrap_or(0.5);

    let specific_n = match class {
        Class::Satellite => sample
            .obstruction_pct
            .map(|o| norm(o, defaults.obstruction_ok_pct, defaults.obstruction_bad_pct))
            .unwrap_or(0.5),
        Class::Cellular => cellular_stability.map(|s| s / 100.0).unwrap_or(0.5),
        Class::Wifi => sample
            .rssi_dbm
            .map(|r| normalize(r, -90.0, -40.0))
            .unwrap_or(0.5),
        Class::Lan | Class::Other => 0.0,
    };

    let raw = w.latency * latency_n + w.loss * loss_n + w.jitter * jitter_n + w.specific * specific_n;
    let mut score = (raw * 100.0).clamp(0.0, 100.0);

    if class == Class::Satellite {
        if sample.snr_persistently_low == Some(true) {
            score -= penalties.satellite_snr_low_penalty;
        }
        if sample.snr_above_noise_floor == Some(false) {
            score -= penalties.satellite_snr_below_floor_penalty;
        }
    }

    if class == Class::Wifi {
        if let Some(rssi) = sample.rssi_dbm {
            if rssi <= penalties.wifi_weak_rssi_dbm {
                score -= penalties.wifi_weak_penalty;
            }
        }
    }

    if !prefer_roaming && sample.roaming == Some(true) {
        score -= penalties.roaming_penalty;
    }

    score.clamp(0.0, 100.0)
}

/// Maintains EWMA and downsampled window average for one member (§3, §4.3).
pub struct ScoreTracker {
    ewma: Option<f64>,
    window: VecDeque<(i64, f64)>,
    window_s: u64,
}

impl ScoreTracker {
    pub fn new(window_s: u64) -> Self {
        ScoreTracker {
            ewma: None,
            window: VecDeque::new(),
            window_s,
        }
    }

    /// Feed one instant score; returns the updated [`Score`] triple.
    pub fn update(&mut self, ts_ms: i64, instant: f64) -> Score {
        let ewma = match self.ewma {
            None => instant,
            Some(prev) => EWMA_ALPHA * instant + (1.0 - EWMA_ALPHA) * prev,
        };
        self.ewma = Some(ewma);

        self.window.push_back((ts_ms, instant));
        let cutoff = ts_ms - (self.window_s as i64) * 1000;
        while let Some(&(t0, _)) = self.window.front() {
            if t0 < cutoff {
                self.window.pop_front();
            } else {
                break;
            }
        }
        let window_avg = if self.window.is_empty() {
            instant
        } else {
            self.window.iter().map(|(_, v)| v).sum::<f64>() / self.window.len() as f64
        };

        Score::new(instant, ewma, window_avg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkwarden_common::MemberId;

    #[test]
    fn norm_is_one_at_ok_and_zero_at_bad() {
        assert!((norm(50.0, 50.0, 1500.0) - 1.0).abs() < 1e-9);
        assert!((norm(1500.0, 50.0, 1500.0) - 0.0).abs() < 1e-9);
        assert!(norm(800.0, 50.0, 1500.0) > 0.0 && norm(800.0, 50.0, 1500.0) < 1.0);
    }

    #[test]
    fn normalize_is_zero_at_lo_and_one_at_hi() {
        assert!((normalize(-130.0, -130.0, -60.0) - 0.0).abs() < 1e-9);
        assert!((normalize(-60.0, -130.0, -60.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn perfect_lan_sample_scores_high() {
        let mut sample = MetricsSample::new(MemberId::from("lan0"), 0);
        sample.latency_ms = Some(5.0);
        sample.loss_pct = 0.0;
        sample.jitter_ms = Some(1.0);
        let score = instant_score(
            &sample,
            Class::Lan,
            &ScoringDefaults::default(),
            &Penalties {
                roaming_penalty: 15.0,
                wifi_weak_rssi_dbm: -75.0,
                wifi_weak_penalty: 10.0,
                satellite_snr_low_penalty: 15.0,
                satellite_snr_below_floor_penalty: 10.0,
            },
            None,
            true,
        );
        assert!(score > 95.0, "expected near-perfect score, got {score}");
    }

    #[test]
    fn roaming_penalty_applies_when_not_preferred() {
        let mut sample = MetricsSample::new(MemberId::from("cell0"), 0);
        sample.latency_ms = Some(60.0);
        sample.loss_pct = 0.0;
        sample.jitter_ms = Some(5.0);
        sample.roaming = Some(true);
        let penalties = Penalties {
            roaming_penalty: 15.0,
            wifi_weak_rssi_dbm: -75.0,
            wifi_weak_penalty: 10.0,
            satellite_snr_low_penalty: 15.0,
            satellite_snr_below_floor_penalty: 10.0,
        };
        let with_roaming_disliked = instant_score(
            &sample,
            Class::Cellular,
            &ScoringDefaults::default(),
            &penalties,
            Some(90.0),
            false,
        );
        let with_roaming_ok = instant_score(
            &sample,
            Class::Cellular,
            &ScoringDefaults::default(),
            &penalties,
            Some(90.0),
            true,
        );
        assert!(with_roaming_disliked < with_roaming_ok);
    }

    #[test]
    fn weak_wifi_signal_penalized() {
        let mut sample = MetricsSample::new(MemberId::from("wifi0"), 0);
        sample.latency_ms = Some(20.0);
        sample.loss_pct = 0.0;
        sample.jitter_ms = Some(2.0);
        sample.rssi_dbm = Some(-80.0);
        let penalties = Penalties {
            roaming_penalty: 15.0,
            wifi_weak_rssi_dbm: -75.0,
            wifi_weak_penalty: 10.0,
            satellite_snr_low_penalty: 15.0,
            satellite_snr_below_floor_penalty: 10.0,
        };
        let weak = instant_score(&sample, Class::Wifi, &ScoringDefaults::default(), &penalties, None, true);
        sample.rssi_dbm = Some(-50.0);
        let strong = instant_score(&sample, Class::Wifi, &ScoringDefaults::default(), &penalties, None, true);
        assert!(weak < strong);
    }

    #[test]
    fn ewma_converges_toward_sustained_input() {
        let mut tracker = ScoreTracker::new(600);
        let mut last = Score::default();
        for i in 0..50 {
            last = tracker.update(i * 1000, 80.0);
        }
        assert!((last.ewma - 80.0).abs() < 1.0);
    }

    #[test]
    fn window_evicts_samples_outside_history() {
        let mut tracker = ScoreTracker::new(10);
        tracker.update(0, 0.0);
        let later = tracker.update(20_000, 100.0);
        // the first sample (ts=0) is now outside the 10s window at ts=20s
        assert!((later.window_avg - 100.0).abs() < 1e-9);
    }
}
