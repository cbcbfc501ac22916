//! RPC/CLI surface (§6.2, SPEC_FULL §10.5): a thin in-process contract
//! external transports (CLI, web, notifiers) map onto. No transport lives
//! here — `CoreHandle` is the same object whether it's called directly from
//! `linkwardend`'s CLI or wrapped by a future socket/HTTP adapter.

use crate::decision::DecisionEngine;
use crate::error_log::ErrorRing;
use crate::modem::capacity::estimate_capacity_kbps;
use crate::telemetry::Telemetry;
use linkwarden_common::config::ConfigSnapshot;
use linkwarden_common::{DecisionEvent, Member, MemberId, MetricsSample};
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Action command accepted by [`CoreHandle::action`] (§6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionCmd {
    Failover,
    Restore,
    Recheck,
    SetLevel,
    Promote,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub current: Option<MemberId>,
    pub member_count: usize,
    pub last_event: Option<DecisionEvent>,
    pub uptime_s: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberReport {
    pub member: Member,
    pub last_sample: Option<MetricsSample>,
    /// CQI/SINR-derived throughput ceiling for cellular members (§11
    /// supplement); `None` for non-cellular classes or before any RF fields
    /// have been observed.
    pub capacity_kbps: Option<f64>,
}

/// Shared state the RPC surface reads. Owned by the core loop and handed
/// out as a clone-able handle (§10.5: "synchronous, idempotent").
#[derive(Clone)]
pub struct CoreHandle {
    inner: Arc<Mutex<CoreHandleInner>>,
}

struct CoreHandleInner {
    members: Vec<Member>,
    decision: DecisionEngine,
    telemetry: Telemetry,
    errors: ErrorRing,
    config: ConfigSnapshot,
    started_at_ms: i64,
    last_event: Option<DecisionEvent>,
}

impl CoreHandle {
    pub fn new(config: ConfigSnapshot, started_at_ms: i64) -> Self {
        let max_ram_mb = config.main.max_ram_mb;
        CoreHandle {
            inner: Arc::new(Mutex::new(CoreHandleInner {
                members: Vec::new(),
                decision: DecisionEngine::new(),
                telemetry: Telemetry::new(max_ram_mb),
                errors: ErrorRing::default(),
                config,
                started_at_ms,
                last_event: None,
            })),
        }
    }

    pub fn set_members(&self, members: Vec<Member>) {
        self.inner.lock().unwrap().members = members;
    }

    pub fn record_sample(&self, sample: MetricsSample) {
        self.inner.lock().unwrap().telemetry.record_sample(sample);
    }

    pub fn record_event(&self, event: DecisionEvent) {
        let mut inner = self.inner.lock().unwrap();
        inner.last_event = Some(event.clone());
        inner.telemetry.record_event(event);
    }

    pub fn decision_mut<R>(&self, f: impl FnOnce(&mut DecisionEngine) -> R) -> R {
        let mut inner = self.inner.lock().unwrap();
        f(&mut inner.decision)
    }

    pub fn status(&self, now_ms: i64) -> StatusReport {
        let inner = self.inner.lock().unwrap();
        StatusReport {
            current: inner.decision.current().cloned(),
            member_count: inner.members.len(),
            last_event: inner.last_event.clone(),
            uptime_s: ((now_ms - inner.started_at_ms).max(0) / 1000) as u64,
        }
    }

    pub fn members(&self) -> Vec<MemberReport> {
        let inner = self.inner.lock().unwrap();
        inner
            .members
            .iter()
            .map(|m| {
                let last_sample = inner.telemetry.latest(&m.id).cloned();
                let capacity_kbps = last_sample
                    .as_ref()
                    .and_then(|s| estimate_capacity_kbps(s.cqi, s.sinr_db));
                MemberReport {
                    member: m.clone(),
                    last_sample,
                    capacity_kbps,
                }
            })
            .collect()
    }

    pub fn metrics(&self, name: &MemberId, since_s: Option<u64>) -> Vec<MetricsSample> {
        self.inner.lock().unwrap().telemetry.history(name, since_s)
    }

    pub fn events(&self, limit: usize) -> Vec<DecisionEvent> {
        self.inner.lock().unwrap().telemetry.recent_events(limit)
    }

    pub fn config_get(&self) -> ConfigSnapshot {
        self.inner.lock().unwrap().config.clone()
    }

    pub fn config_set(&self, patch_toml: &str) -> Result<ConfigSnapshot, String> {
        let mut inner = self.inner.lock().unwrap();
        let (snapshot, _warnings) = inner.config.apply_patch(patch_toml)?;
        inner.config = snapshot.clone();
        Ok(snapshot)
    }

    pub fn errors_push(&self, ts_ms: i64, error: linkwarden_common::CoreError) {
        self.inner.lock().unwrap().errors.push(ts_ms, error);
    }

    pub fn recent_errors(&self) -> Vec<linkwarden_common::CoreError> {
        self.inner
            .lock()
            .unwrap()
            .errors
            .recent()
            .map(|r| r.error.clone())
            .collect()
    }
}
