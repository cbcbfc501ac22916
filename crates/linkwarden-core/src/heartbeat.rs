//! Heartbeat file (§6.4, SPEC_FULL §10.7): a small JSON document rewritten
//! every ~10s from the cleanup ticker for an external watchdog collaborator.

use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// `goroutines` keeps its original field name for watchdog compatibility —
/// this daemon has no goroutines, the field reports OS worker threads.
#[derive(Debug, Clone, Serialize)]
pub struct Heartbeat {
    pub ts: String,
    pub uptime_s: u64,
    pub version: String,
    pub status: String,
    pub last_failover_ts: Option<String>,
    pub mem_mb: f64,
    pub goroutines: u32,
    pub device_id: String,
}

impl Heartbeat {
    /// Writes to a temp file then renames into place so the watchdog never
    /// observes a half-written document.
    pub fn write_atomic(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_vec(self)?;
        let tmp_path = path.with_extension("tmp");
        {
            let mut f = std::fs::File::create(&tmp_path)?;
            f.write_all(&json)?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp_path, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_produces_valid_json() {
        let dir = std::env::temp_dir().join(format!("linkwarden-hb-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("heartbeat.json");

        let hb = Heartbeat {
            ts: "2026-01-01T00:00:00Z".into(),
            uptime_s: 42,
            version: "0.1.0".into(),
            status: "ok".into(),
            last_failover_ts: None,
            mem_mb: 8.5,
            goroutines: 6,
            device_id: "router-01".into(),
        };
        hb.write_atomic(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["uptime_s"], 42);
        assert_eq!(parsed["device_id"], "router-01");

        std::fs::remove_dir_all(&dir).ok();
    }
}
