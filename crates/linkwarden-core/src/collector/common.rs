//! Shared TCP-connect-timing probe (§4.2 "common probe"), used directly by
//! the LAN/other collector and as the fallback leg of every RPC-backed
//! collector when its primary provider fails.

use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

/// Number of connect attempts per probe burst.
const ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeResult {
    pub latency_ms: Option<f64>,
    pub loss_pct: f64,
    pub jitter_ms: Option<f64>,
}

impl ProbeResult {
    pub fn all_failed(&self) -> bool {
        self.latency_ms.is_none()
    }
}

/// Runs a short burst of TCP connect attempts against `targets` (round
/// robin), bounded by `timeout` each. `loss_pct` is the fraction of failed
/// attempts; `jitter_ms` is the mean absolute delta between consecutive
/// successful connect times.
pub fn common_probe(targets: &[SocketAddr], timeout: Duration) -> ProbeResult {
    if targets.is_empty() {
        return ProbeResult {
            latency_ms: None,
            loss_pct: 100.0,
            jitter_ms: None,
        };
    }

    let mut latencies = Vec::with_capacity(ATTEMPTS);
    let mut failed = 0usize;
    for i in 0..ATTEMPTS {
        let addr = targets[i % targets.len()];
        let start = Instant::now();
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => latencies.push(start.elapsed().as_secs_f64() * 1000.0),
            Err(_) => failed += 1,
        }
    }

    let loss_pct = failed as f64 / ATTEMPTS as f64 * 100.0;
    let latency_ms = if latencies.is_empty() {
        None
    } else {
        Some(latencies.iter().sum::<f64>() / latencies.len() as f64)
    };
    let jitter_ms = if latencies.len() >= 2 {
        let diffs: Vec<f64> = latencies.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
        Some(diffs.iter().sum::<f64>() / diffs.len() as f64)
    } else {
        None
    };

    ProbeResult {
        latency_ms,
        loss_pct,
        jitter_ms,
    }
}
