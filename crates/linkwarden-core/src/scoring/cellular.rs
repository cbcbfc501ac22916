//! Cellular stability composite (§4.3) and its hysteresis.

use super::normalize;
use std::collections::VecDeque;

const DEFAULT_WINDOW_S: i64 = 600;
/// Cell-edge heuristic used by the below-threshold penalty component.
const RSRP_EDGE_DBM: f64 = -110.0;

#[derive(Debug, Clone, Copy)]
struct RadioSample {
    ts_ms: i64,
    rsrp_dbm: f64,
    rsrq_db: f64,
    sinr_db: f64,
    cell_id: Option<u64>,
}

/// Rolling window (default 10 min) of a cellular member's radio samples,
/// feeding the §4.3 stability composite:
///
/// ```text
/// stability = 0.6*level_score + 0.4*variability_score
/// level_score = avg(normalize(RSRP,-130,-60), normalize(RSRQ,-20,-6), normalize(SINR,-5,20))
/// variability_score = 100*(1 - (0.5*sigma_penalty + 0.3*cell_change_penalty + 0.2*below_threshold_penalty))
/// ```
pub struct CellularRadioWindow {
    samples: VecDeque<RadioSample>,
    window_ms: i64,
}

impl CellularRadioWindow {
    pub fn new() -> Self {
        CellularRadioWindow::with_window_s(DEFAULT_WINDOW_S as u64)
    }

    pub fn with_window_s(window_s: u64) -> Self {
        CellularRadioWindow {
            samples: VecDeque::new(),
            window_ms: window_s as i64 * 1000,
        }
    }

    pub fn push(
        &mut self,
        ts_ms: i64,
        rsrp_dbm: f64,
        rsrq_db: f64,
        sinr_db: f64,
        cell_id: Option<u64>,
    ) {
        self.samples.push_back(RadioSample {
            ts_ms,
            rsrp_dbm,
            rsrq_db,
            sinr_db,
            cell_id,
        });
        let cutoff = ts_ms - self.window_ms;
        while let Some(front) = self.samples.front() {
            if front.ts_ms < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Composite stability score in `[0, 100]`. `None` until the window has
    /// at least one sample.
    pub fn stability(&self) -> Option<f64> {
        let last = self.samples.back()?;
        let level = (normalize(last.rsrp_dbm, -130.0, -60.0)
            + normalize(last.rsrq_db, -20.0, -6.0)
            + normalize(last.sinr_db, -5.0, 20.0))
            / 3.0
            * 100.0;

        let n = self.samples.len();
        let variability = if n < 2 {
            100.0
        } else {
            let mean_sinr: f64 = self.samples.iter().map(|s| s.sinr_db).sum::<f64>() / n as f64;
            let variance: f64 = self
                .samples
                .iter()
                .map(|s| (s.sinr_db - mean_sinr).powi(2))
                .sum::<f64>()
                / n as f64;
            let sigma = variance.sqrt();
            let sigma_penalty = (sigma / 10.0).clamp(0.0, 1.0);

            let mut changes = 0usize;
            let mut pairs = 0usize;
            for w in self.samples.iter().collect::<Vec<_>>().windows(2) {
                if let (Some(a), Some(b)) = (w[0].cell_id, w[1].cell_id) {
                    pairs += 1;
                    if a != b {
                        changes += 1;
                    }
                }
            }
            let cell_change_penalty = if pairs > 0 {
                changes as f64 / pairs as f64
            } else {
                0.0
            };

            let below = self
                .samples
                .iter()
                .filter(|s| s.rsrp_dbm < RSRP_EDGE_DBM)
                .count();
            let below_threshold_penalty = below as f64 / n as f64;

            (100.0
                * (1.0
                    - (0.5 * sigma_penalty + 0.3 * cell_change_penalty + 0.2 * below_threshold_penalty)))
                .clamp(0.0, 100.0)
        };

        Some((0.6 * level + 0.4 * variability).clamp(0.0, 100.0))
    }
}

impl Default for CellularRadioWindow {
    fn default() -> Self {
        CellularRadioWindow::new()
    }
}

/// Hysteresis gate on cellular stability status (§4.3: "require 60s above
/// threshold before marking healthy, 30s below before unhealthy").
pub struct CellularStabilityTracker {
    healthy: bool,
    pending_since_ms: Option<i64>,
    threshold: f64,
}

impl CellularStabilityTracker {
    const HEALTHY_REQUIRE_MS: i64 = 60_000;
    const UNHEALTHY_REQUIRE_MS: i64 = 30_000;

    pub fn new(threshold: f64) -> Self {
        CellularStabilityTracker {
            healthy: false,
            pending_since_ms: None,
            threshold,
        }
    }

    /// Feed the latest stability score; returns the gated healthy/unhealthy
    /// status after applying hysteresis.
    pub fn update(&mut self, stability_score: f64, now_ms: i64) -> bool {
        let wants_healthy = stability_score >= self.threshold;
        if wants_healthy == self.healthy {
            self.pending_since_ms = None;
            return self.healthy;
        }

        let since = *self.pending_since_ms.get_or_insert(now_ms);
        let required_ms = if wants_healthy {
            Self::HEALTHY_REQUIRE_MS
        } else {
            Self::UNHEALTHY_REQUIRE_MS
        };
        if now_ms - since >= required_ms {
            self.healthy = wants_healthy;
            self.pending_since_ms = None;
        }
        self.healthy
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }
}
