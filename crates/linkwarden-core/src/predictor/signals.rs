//! Individual predictor signals (§4.4). Each is a pure function over a
//! window of samples, independently testable and carrying its own
//! confidence — the aggregator in [`super`] composes them, never the other
//! way around.

/// Outcome of one predictor signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub fire: bool,
    pub confidence: f64,
    pub reason: String,
}

impl Signal {
    fn quiet(reason: &str) -> Self {
        Signal {
            fire: false,
            confidence: 0.0,
            reason: reason.to_string(),
        }
    }
}

/// Ordinary least squares over `(x, y)` pairs. Returns `(slope, r_squared)`.
fn linear_regression(points: &[(f64, f64)]) -> (f64, f64) {
    let n = points.len() as f64;
    if points.len() < 2 {
        return (0.0, 0.0);
    }
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    for &(x, y) in points {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
    }
    if var_x < f64::EPSILON {
        return (0.0, 0.0);
    }
    let slope = cov / var_x;
    let intercept = mean_y - slope * mean_x;
    let ss_tot: f64 = points.iter().map(|(_, y)| (y - mean_y).powi(2)).sum();
    let ss_res: f64 = points
        .iter()
        .map(|(x, y)| (y - (slope * x + intercept)).powi(2))
        .sum();
    let r2 = if ss_tot < f64::EPSILON {
        1.0
    } else {
        (1.0 - ss_res / ss_tot).max(0.0)
    };
    (slope, r2)
}

/// R² floor required before a regression slope is trusted (§4.4).
pub const MIN_TREND_R2: f64 = 0.4;

/// Linear-regression slope over `(ts_ms, value)` samples exceeding
/// `slope_threshold_per_s` with R² ≥ 0.4 (§4.4 "Trend fire").
pub fn trend_fire(samples: &[(i64, f64)], slope_threshold_per_s: f64, metric: &str) -> Signal {
    if samples.len() < 3 {
        return Signal::quiet(&format!("predictive.trend_{metric}"));
    }
    let t0 = samples[0].0 as f64;
    let points: Vec<(f64, f64)> = samples
        .iter()
        .map(|(ts, v)| ((*ts as f64 - t0) / 1000.0, *v))
        .collect();
    let (slope, r2) = linear_regression(&points);
    let fire = slope.abs() >= slope_threshold_per_s && r2 >= MIN_TREND_R2;
    Signal {
        fire,
        confidence: if fire { r2.min(1.0) } else { 0.0 },
        reason: format!("predictive.trend_{metric}"),
    }
}

/// Second derivative of obstruction fraction over time, averaged across the
/// window (§4.4 "Obstruction acceleration", satellite-only).
pub fn obstruction_acceleration(samples: &[(i64, f64)], threshold_per_s2: f64) -> Signal {
    if samples.len() < 3 {
        return Signal::quiet("predictive.obstruction_acceleration");
    }
    let mut accelerations = Vec::with_capacity(samples.len() - 2);
    for w in samples.windows(3) {
        let (t0, y0) = w[0];
        let (t1, y1) = w[1];
        let (t2, y2) = w[2];
        let dt1 = (t1 - t0) as f64 / 1000.0;
        let dt2 = (t2 - t1) as f64 / 1000.0;
        if dt1 <= 0.0 || dt2 <= 0.0 {
            continue;
        }
        // Non-uniform-step second derivative via divided differences.
        let d1 = (y1 - y0) / dt1;
        let d2 = (y2 - y1) / dt2;
        let accel = (d2 - d1) / ((dt1 + dt2) / 2.0);
        accelerations.push(accel);
    }
    if accelerations.is_empty() {
        return Signal::quiet("predictive.obstruction_acceleration");
    }
    let avg_accel = accelerations.iter().sum::<f64>() / accelerations.len() as f64;
    let fire = avg_accel.abs() >= threshold_per_s2;
    Signal {
        fire,
        confidence: if fire {
            (avg_accel.abs() / (threshold_per_s2 * 2.0)).clamp(0.0, 1.0)
        } else {
            0.0
        },
        reason: "predictive.obstruction_acceleration".to_string(),
    }
}

/// Sustained `is_snr_persistently_low` flag across the last
/// `required_windows` samples (§4.4 "SNR degradation", default 2).
pub fn snr_degradation(recent_flags: &[bool], required_windows: usize) -> Signal {
    let fire = recent_flags.len() >= required_windows
        && recent_flags
            .iter()
            .rev()
            .take(required_windows)
            .all(|&f| f);
    Signal {
        fire,
        confidence: if fire { 1.0 } else { 0.0 },
        reason: "predictive.snr_degradation".to_string(),
    }
}

/// Minimum sample count before the anomaly baseline is trusted (§4.4).
pub const ANOMALY_MIN_SAMPLES: usize = 10;
const ANOMALY_EMA_ALPHA: f64 = 0.2;

/// z-score of the latest value against an online EMA mean / EMA mean-abs-
/// deviation baseline built from the samples preceding it (§4.4 "Anomaly").
pub fn anomaly(samples: &[f64], z_threshold: f64) -> Signal {
    if samples.len() < ANOMALY_MIN_SAMPLES {
        return Signal::quiet("predictive.anomaly");
    }
    let (history, latest) = samples.split_at(samples.len() - 1);
    let latest = latest[0];

    let mut ema_mean = history[0];
    let mut ema_mad = 0.0;
    for &v in &history[1..] {
        ema_mean = ANOMALY_EMA_ALPHA * v + (1.0 - ANOMALY_EMA_ALPHA) * ema_mean;
        ema_mad = ANOMALY_EMA_ALPHA * (v - ema_mean).abs() + (1.0 - ANOMALY_EMA_ALPHA) * ema_mad;
    }

    let spread = ema_mad.max(1e-6);
    let z = (latest - ema_mean).abs() / spread;
    let fire = z >= z_threshold;
    Signal {
        fire,
        confidence: if fire { (z / (z_threshold * 2.0)).clamp(0.0, 1.0) } else { 0.0 },
        reason: "predictive.anomaly".to_string(),
    }
}

/// Normalized autocorrelation at `lag` over `values` (mean-centered).
fn autocorrelation(values: &[f64], lag: usize) -> f64 {
    let n = values.len();
    if lag == 0 || lag >= n {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let denom: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    if denom < f64::EPSILON {
        return 0.0;
    }
    let num: f64 = (0..n - lag)
        .map(|i| (values[i] - mean) * (values[i + lag] - mean))
        .sum();
    num / denom
}

/// Cyclic-autocorrelation pattern match against previously-labeled bad
/// windows (§4.4 "Pattern"): the strongest autocorrelation over plausible
/// lags must clear `threshold` (default 0.8, UCI-tunable per §9).
pub fn pattern(values: &[f64], threshold: f64) -> Signal {
    if values.len() < 6 {
        return Signal::quiet("predictive.pattern");
    }
    let max_lag = values.len() / 2;
    let best = (1..=max_lag)
        .map(|lag| autocorrelation(values, lag))
        .fold(f64::MIN, f64::max);
    let fire = best >= threshold;
    Signal {
        fire,
        confidence: if fire { best.clamp(0.0, 1.0) } else { 0.0 },
        reason: "predictive.pattern".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trend_fires_on_strong_linear_rise() {
        let samples: Vec<(i64, f64)> = (0..20)
            .map(|i| (i * 1000, 60.0 + (900.0 - 60.0) * (i as f64 / 19.0)))
            .collect();
        let s = trend_fire(&samples, 10.0, "latency");
        assert!(s.fire);
        assert!(s.confidence > 0.8);
    }

    #[test]
    fn trend_does_not_fire_on_flat_series() {
        let samples: Vec<(i64, f64)> = (0..20).map(|i| (i * 1000, 50.0)).collect();
        let s = trend_fire(&samples, 1.0, "latency");
        assert!(!s.fire);
    }

    #[test]
    fn trend_does_not_fire_on_noisy_series_with_low_r2() {
        let vals = [10.0, 90.0, 5.0, 95.0, 15.0, 88.0, 3.0, 92.0, 20.0, 80.0];
        let samples: Vec<(i64, f64)> = vals.iter().enumerate().map(|(i, v)| (i as i64 * 1000, *v)).collect();
        let s = trend_fire(&samples, 0.1, "loss");
        assert!(!s.fire, "noisy series should fail the R^2 gate");
    }

    #[test]
    fn obstruction_acceleration_fires_on_sharply_increasing_fraction() {
        let samples: Vec<(i64, f64)> = (0..10).map(|i| (i * 1000, (i * i) as f64)).collect();
        let s = obstruction_acceleration(&samples, 0.5);
        assert!(s.fire);
    }

    #[test]
    fn obstruction_acceleration_quiet_on_linear_growth() {
        let samples: Vec<(i64, f64)> = (0..10).map(|i| (i * 1000, i as f64)).collect();
        let s = obstruction_acceleration(&samples, 0.5);
        assert!(!s.fire, "constant-rate growth has ~zero acceleration");
    }

    #[test]
    fn snr_degradation_requires_sustained_flag() {
        assert!(!snr_degradation(&[true, false], 2).fire);
        assert!(snr_degradation(&[false, true, true], 2).fire);
    }

    #[test]
    fn anomaly_quiet_below_min_samples() {
        let s = anomaly(&[1.0, 2.0, 3.0], 3.0);
        assert!(!s.fire);
    }

    #[test]
    fn anomaly_fires_on_sudden_spike() {
        let mut samples = vec![50.0; 15];
        samples.push(900.0);
        let s = anomaly(&samples, 3.0);
        assert!(s.fire);
    }

    #[test]
    fn anomaly_quiet_on_stable_series() {
        let samples = vec![50.0; 15];
        let s = anomaly(&samples, 3.0);
        assert!(!s.fire);
    }

    #[test]
    fn pattern_detects_strong_periodicity() {
        let values: Vec<f64> = (0..24).map(|i| ((i % 6) as f64)).collect();
        let s = pattern(&values, 0.5);
        assert!(s.fire);
    }

    #[test]
    fn pattern_quiet_on_random_like_series() {
        let values = vec![1.0, 9.0, 2.0, 8.0, 3.0, 7.0, 4.0, 6.0, 5.0, 0.0];
        let s = pattern(&values, 0.9);
        assert!(!s.fire);
    }
}
