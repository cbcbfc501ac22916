//! Two-state Kalman filter for smoothing noisy RF/transport metrics.
//!
//! State vector `[value, velocity]`. The velocity term is the basis for
//! §4.4's predictive trend signals and for `status()`'s `predicted_sinr`
//! style readouts (§11.2): a single filter class serves both smoothing and
//! trend prediction instead of stacking a separate regression.

/// A two-state Kalman filter: `[value, velocity]`.
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    x: f64,
    v: f64,

    p00: f64,
    p01: f64,
    p11: f64,

    q_value: f64,
    q_velocity: f64,
    r: f64,

    initialized: bool,
}

/// Tuning for a [`KalmanFilter`] instance.
#[derive(Debug, Clone)]
pub struct KalmanConfig {
    pub q_value: f64,
    pub q_velocity: f64,
    pub r: f64,
}

impl KalmanConfig {
    /// RTT / latency smoothing (milliseconds).
    pub fn for_latency() -> Self {
        KalmanConfig {
            q_value: 0.5,
            q_velocity: 0.1,
            r: 10.0,
        }
    }

    /// RF signal smoothing (RSRP/RSRQ/SINR in dBm/dB).
    pub fn for_signal() -> Self {
        KalmanConfig {
            q_value: 1.0,
            q_velocity: 0.2,
            r: 5.0,
        }
    }

    /// Loss-rate smoothing ([0, 1] fraction).
    pub fn for_loss() -> Self {
        KalmanConfig {
            q_value: 0.01,
            q_velocity: 0.001,
            r: 0.05,
        }
    }
}

impl KalmanFilter {
    pub fn new(config: &KalmanConfig) -> Self {
        KalmanFilter {
            x: 0.0,
            v: 0.0,
            p00: 1000.0,
            p01: 0.0,
            p11: 1000.0,
            q_value: config.q_value,
            q_velocity: config.q_velocity,
            r: config.r,
            initialized: false,
        }
    }

    pub fn value(&self) -> f64 {
        self.x
    }

    pub fn velocity(&self) -> f64 {
        self.v
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn uncertainty(&self) -> f64 {
        self.p00.sqrt()
    }

    fn predict(&mut self) {
        self.x += self.v;
        let new_p00 = self.p00 + 2.0 * self.p01 + self.p11 + self.q_value;
        let new_p01 = self.p01 + self.p11 + self.q_velocity;
        let new_p11 = self.p11 + self.q_velocity;
        self.p00 = new_p00;
        self.p01 = new_p01;
        self.p11 = new_p11;
    }

    pub fn update(&mut self, measurement: f64) {
        if !self.initialized {
            self.x = measurement;
            self.v = 0.0;
            self.initialized = true;
            return;
        }

        self.predict();

        let y = measurement - self.x;
        let s = self.p00 + self.r;
        let k0 = self.p00 / s;
        let k1 = self.p01 / s;

        self.x += k0 * y;
        self.v += k1 * y;

        let new_p00 = self.p00 - k0 * self.p00;
        let new_p01 = self.p01 - k0 * self.p01;
        let new_p11 = self.p11 - k1 * self.p01;
        self.p00 = new_p00;
        self.p01 = new_p01;
        self.p11 = new_p11;
    }

    /// Estimated value `steps` ticks ahead, without mutating state. The
    /// basis for §4.4's trend-fire primitive and §11.2's `predicted_sinr`.
    pub fn predict_ahead(&self, steps: u32) -> f64 {
        self.x + self.v * steps as f64
    }

    pub fn reset(&mut self) {
        self.x = 0.0;
        self.v = 0.0;
        self.p00 = 1000.0;
        self.p01 = 0.0;
        self.p11 = 1000.0;
        self.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_measurement_sets_value() {
        let mut kf = KalmanFilter::new(&KalmanConfig::for_latency());
        assert!(!kf.is_initialized());
        kf.update(50.0);
        assert!(kf.is_initialized());
        assert!((kf.value() - 50.0).abs() < 0.01);
    }

    #[test]
    fn smooths_noisy_measurements() {
        let mut kf = KalmanFilter::new(&KalmanConfig::for_latency());
        for &m in &[55.0, 48.0, 52.0, 47.0, 53.0, 49.0, 51.0, 50.0, 48.0, 52.0] {
            kf.update(m);
        }
        assert!((kf.value() - 50.0).abs() < 5.0);
    }

    #[test]
    fn detects_increasing_trend() {
        let mut kf = KalmanFilter::new(&KalmanConfig::for_latency());
        for i in 0..20 {
            kf.update(50.0 + i as f64 * 2.0);
        }
        assert!(kf.velocity() > 0.5);
    }

    #[test]
    fn predict_ahead_extrapolates_trend() {
        let mut kf = KalmanFilter::new(&KalmanConfig::for_latency());
        for i in 0..20 {
            kf.update(10.0 + i as f64 * 5.0);
        }
        let current = kf.value();
        let future = kf.predict_ahead(5);
        assert!(future > current);
    }

    #[test]
    fn reset_clears_state() {
        let mut kf = KalmanFilter::new(&KalmanConfig::for_latency());
        kf.update(50.0);
        kf.reset();
        assert!(!kf.is_initialized());
        assert!((kf.value() - 0.0).abs() < 0.01);
    }
}
