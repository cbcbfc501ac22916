//! Predictor (§4.4): independent signals composed by a small aggregator,
//! plus the eligibility gate and global rate limit that decide whether a
//! fire is allowed to preempt the deterministic decision path.

pub mod signals;

pub use signals::{anomaly, obstruction_acceleration, pattern, snr_degradation, trend_fire, Signal};

use linkwarden_common::MemberId;

/// Aggregate outcome across all signals for one member this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictorOutcome {
    pub fire: bool,
    pub confidence: f64,
    pub reason: String,
}

impl PredictorOutcome {
    fn quiet() -> Self {
        PredictorOutcome {
            fire: false,
            confidence: 0.0,
            reason: String::new(),
        }
    }
}

/// Combines independently-evaluated signals: the highest-confidence firing
/// signal wins, since any one plug-in firing is enough to preempt (§4.4
/// lists signals as alternatives, not a vote).
pub fn aggregate(signals: &[Signal]) -> PredictorOutcome {
    signals
        .iter()
        .filter(|s| s.fire)
        .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap())
        .map(|s| PredictorOutcome {
            fire: true,
            confidence: s.confidence,
            reason: s.reason.clone(),
        })
        .unwrap_or_else(PredictorOutcome::quiet)
}

/// Whether a predictor fire on `firing` is eligible to act (§4.4): the
/// firing member must be the current one, and some other member's `final`
/// must already clear half the normal switch margin.
pub fn is_eligible_for_action(
    firing: &MemberId,
    current: &MemberId,
    current_final: f64,
    other_finals: &[(MemberId, f64)],
    switch_margin: f64,
) -> bool {
    if firing != current {
        return false;
    }
    other_finals
        .iter()
        .any(|(_, final_score)| final_score - current_final >= switch_margin / 2.0)
}

/// Global rate limit on predictor-driven switches (§4.4: "one per
/// `5·fail_min_duration_s`"). Repeated fires inside one window collapse to
/// at most one allowed action (§8 invariant).
pub struct RateLimiter {
    last_allowed_ms: Option<i64>,
}

impl RateLimiter {
    pub fn new() -> Self {
        RateLimiter {
            last_allowed_ms: None,
        }
    }

    pub fn allow(&mut self, now_ms: i64, fail_min_duration_s: u64) -> bool {
        let window_ms = 5 * fail_min_duration_s as i64 * 1000;
        match self.last_allowed_ms {
            Some(last) if now_ms - last < window_ms => false,
            _ => {
                self.last_allowed_ms = Some(now_ms);
                true
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        RateLimiter::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(fire: bool, confidence: f64, reason: &str) -> Signal {
        Signal {
            fire,
            confidence,
            reason: reason.to_string(),
        }
    }

    #[test]
    fn aggregate_picks_highest_confidence_firing_signal() {
        let signals = vec![
            sig(true, 0.5, "predictive.trend_latency"),
            sig(true, 0.9, "predictive.anomaly"),
            sig(false, 0.0, "predictive.pattern"),
        ];
        let out = aggregate(&signals);
        assert!(out.fire);
        assert_eq!(out.reason, "predictive.anomaly");
    }

    #[test]
    fn aggregate_quiet_when_nothing_fires() {
        let signals = vec![sig(false, 0.0, "a"), sig(false, 0.0, "b")];
        assert!(!aggregate(&signals).fire);
    }

    #[test]
    fn eligibility_requires_firing_member_to_be_current() {
        let current = MemberId::from("a");
        let other = MemberId::from("b");
        let others = vec![(other.clone(), 90.0)];
        assert!(!is_eligible_for_action(&other, &current, 40.0, &others, 10.0));
        assert!(is_eligible_for_action(&current, &current, 40.0, &others, 10.0));
    }

    #[test]
    fn eligibility_requires_half_margin_on_some_other_member() {
        let current = MemberId::from("a");
        let b = MemberId::from("b");
        let barely_not_enough = vec![(b.clone(), 44.0)]; // 4 < 10/2
        assert!(!is_eligible_for_action(&current, &current, 40.0, &barely_not_enough, 10.0));
        let enough = vec![(b, 45.0)]; // 5 >= 10/2
        assert!(is_eligible_for_action(&current, &current, 40.0, &enough, 10.0));
    }

    #[test]
    fn rate_limiter_allows_first_then_blocks_within_window() {
        let mut limiter = RateLimiter::new();
        assert!(limiter.allow(0, 10));
        assert!(!limiter.allow(30_000, 10), "inside the 50s window");
        assert!(limiter.allow(50_000, 10), "exactly at window edge");
    }
}
