//! Core loop (§4.8): a cooperative scheduler with three tickers dispatched
//! through a single control channel, the way the teacher's bonding runtime
//! drives its worker thread from one `RuntimeMessage` stream rather than an
//! async executor (§10.1 "no tokio" ambient-stack decision).

use crate::collector::{CollectOutcome, Collector};
use crate::controller::Controller;
use crate::decision::{Candidate, DecisionAction};
use crate::discovery::{ClassificationProbe, Discovery, PolicyEntry};
use crate::eventbus::EventBus;
use crate::heartbeat::Heartbeat;
use crate::modem::capacity::estimate_capacity_kbps;
use crate::predictor::{self, anomaly, obstruction_acceleration, pattern, snr_degradation, trend_fire};
use crate::rpc::CoreHandle;
use crate::scoring::{self, CellularRadioWindow, CellularStabilityTracker, Penalties, ScoreTracker, ScoringDefaults};
use arc_swap::ArcSwap;
use crossbeam_channel::{unbounded, Receiver, Sender};
use linkwarden_common::config::ConfigSnapshot;
use linkwarden_common::{Class, CoreError, DecisionEvent, EventType, Member, MemberId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Number of consecutive collector failures before a member is marked
/// ineligible (§7 "CollectorPermanent ... default 3").
const CONSECUTIVE_FAILURE_LIMIT: u32 = 3;

/// Latency-trend fire threshold (§4.4 "trend"): a sustained rise of 5ms/s
/// over the history window is treated as degradation, not noise.
const PREDICTOR_LATENCY_TREND_MS_PER_S: f64 = 5.0;
/// Obstruction-fraction second-derivative fire threshold (§4.4).
const PREDICTOR_OBSTRUCTION_ACCEL_THRESHOLD: f64 = 0.02;
/// Shared z-score threshold for the anomaly signal (§4.4 default).
const PREDICTOR_ANOMALY_Z_THRESHOLD: f64 = 3.0;
/// Consecutive low-SNR windows required before the SNR-degradation signal
/// fires (§4.4 "sustained").
const PREDICTOR_SNR_DEGRADATION_WINDOWS: usize = 2;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Messages flowing through the single control channel (mirrors the
/// teacher's `RuntimeMessage` pattern): tickers and external commands are
/// just different producers onto the same stream, consumed by one worker.
enum RuntimeMessage {
    DecisionTick,
    DiscoveryTick,
    CleanupTick,
    Reload(ConfigSnapshot),
    Shutdown,
}

/// Handle returned by [`CoreLoop::spawn`] for external control (SIGHUP
/// handler, config RPC).
pub struct CoreLoopHandle {
    sender: Sender<RuntimeMessage>,
}

impl CoreLoopHandle {
    pub fn reload(&self, snapshot: ConfigSnapshot) {
        let _ = self.sender.send(RuntimeMessage::Reload(snapshot));
    }

    pub fn shutdown(&self) {
        let _ = self.sender.send(RuntimeMessage::Shutdown);
    }
}

struct MemberRuntime {
    score_tracker: ScoreTracker,
    cellular_window: CellularRadioWindow,
    cellular_stability: CellularStabilityTracker,
    sampler: crate::collector::AdaptiveSampler,
    consecutive_failures: u32,
    last_is_bad: bool,
    last_is_good: bool,
    /// Score from the most recent successful collection, carried forward on
    /// ticks where the adaptive cadence (§4.2) says this member isn't due.
    last_score: Option<linkwarden_common::Score>,
    /// CQI/SINR-derived capacity estimate from the most recent cellular
    /// sample (§11 supplement), carried forward the same way `last_score` is.
    last_capacity_kbps: Option<f64>,
    last_weight: u32,
    next_collect_due_ms: i64,
}

impl MemberRuntime {
    fn new(history_window_s: u64) -> Self {
        MemberRuntime {
            score_tracker: ScoreTracker::new(history_window_s),
            cellular_window: CellularRadioWindow::with_window_s(history_window_s),
            cellular_stability: CellularStabilityTracker::new(50.0),
            sampler: crate::collector::AdaptiveSampler::new(),
            consecutive_failures: 0,
            last_is_bad: false,
            last_is_good: true,
            last_score: None,
            last_capacity_kbps: None,
            last_weight: 100,
            next_collect_due_ms: 0,
        }
    }
}

/// Wires discovery, collection, scoring, prediction, decision, and the
/// controller into one tick-driven engine. Construct with
/// [`CoreLoop::builder`]-style fields directly (no builder needed yet; the
/// struct is small enough to construct literally).
pub struct CoreLoop {
    config: ArcSwap<ConfigSnapshot>,
    handle: CoreHandle,
    discovery: Mutex<Discovery>,
    probe: Box<dyn ClassificationProbe>,
    policy_entries: Box<dyn Fn() -> Vec<PolicyEntry> + Send + Sync>,
    collectors: HashMap<&'static str, Box<dyn Collector>>,
    controller: Box<dyn Controller>,
    event_bus: Arc<EventBus>,
    members: Mutex<Vec<Member>>,
    runtimes: Mutex<HashMap<MemberId, MemberRuntime>>,
    predictor_rate_limiter: Mutex<predictor::RateLimiter>,
    heartbeat_path: Option<PathBuf>,
    device_id: String,
    started_at_ms: i64,
}

fn class_key(class: Class) -> &'static str {
    match class {
        Class::Satellite => "satellite",
        Class::Cellular => "cellular",
        Class::Wifi => "wifi",
        Class::Lan => "lan",
        Class::Other => "other",
    }
}

impl CoreLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ConfigSnapshot,
        handle: CoreHandle,
        probe: Box<dyn ClassificationProbe>,
        policy_entries: Box<dyn Fn() -> Vec<PolicyEntry> + Send + Sync>,
        collectors: HashMap<&'static str, Box<dyn Collector>>,
        controller: Box<dyn Controller>,
        device_id: String,
        heartbeat_path: Option<PathBuf>,
    ) -> Self {
        CoreLoop {
            config: ArcSwap::from_pointee(config),
            handle,
            discovery: Mutex::new(Discovery::new()),
            probe,
            policy_entries,
            collectors,
            controller,
            event_bus: Arc::new(EventBus::new()),
            members: Mutex::new(Vec::new()),
            runtimes: Mutex::new(HashMap::new()),
            predictor_rate_limiter: Mutex::new(predictor::RateLimiter::new()),
            heartbeat_path,
            device_id,
            started_at_ms: now_ms(),
        }
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    /// Swaps the active config snapshot (§6 hot reload). `decision_tick`
    /// and `discovery_tick` each load the snapshot once via
    /// `ArcSwap::load_full` at the top of the call, so every in-flight tick
    /// sees either the whole old snapshot or the whole new one, never a
    /// mix. [`CoreLoopHandle::reload`] routes through the same swap via the
    /// spawned worker's message loop.
    pub fn reload(&self, snapshot: ConfigSnapshot) {
        self.config.store(Arc::new(snapshot));
    }

    pub fn discovery_tick(&self) {
        let entries = (self.policy_entries)();
        let mut discovery = self.discovery.lock().unwrap();
        let published = discovery.refresh(&entries, self.probe.as_ref());
        drop(discovery);
        *self.members.lock().unwrap() = published.clone();
        self.handle.set_members(published);
    }

    pub fn cleanup_tick(&self, now_ms: i64) {
        if let Some(path) = &self.heartbeat_path {
            let status = self.handle.status(now_ms);
            let hb = Heartbeat {
                ts: chrono::Utc::now().to_rfc3339(),
                uptime_s: status.uptime_s,
                version: env!("CARGO_PKG_VERSION").to_string(),
                status: "ok".to_string(),
                last_failover_ts: status.last_event.map(|e| e.ts.to_rfc3339()),
                mem_mb: 0.0,
                goroutines: std::thread::available_parallelism()
                    .map(|n| n.get() as u32)
                    .unwrap_or(1),
                device_id: self.device_id.clone(),
            };
            if let Err(e) = hb.write_atomic(path) {
                warn!(error = %e, "heartbeat write failed");
            }
        }
    }

    /// Evaluates the independent §4.4 signals for `member` against its
    /// recent sample history, picking the window and metric per class the
    /// way §4.4 groups them (obstruction/SNR for satellite, RF anomaly for
    /// cellular, latency trend/pattern for everything).
    fn predictor_signals(
        &self,
        member: &MemberId,
        class: Class,
        config: &ConfigSnapshot,
    ) -> Vec<predictor::Signal> {
        let history = self.handle.metrics(member, Some(config.main.history_window_s));
        if history.len() < 3 {
            return Vec::new();
        }

        let latency_series: Vec<(i64, f64)> = history
            .iter()
            .filter_map(|s| s.latency_ms.map(|l| (s.ts_ms, l)))
            .collect();
        let latency_values: Vec<f64> = latency_series.iter().map(|(_, v)| v).copied().collect();

        let mut signals = vec![
            trend_fire(&latency_series, PREDICTOR_LATENCY_TREND_MS_PER_S, "latency"),
            anomaly(&latency_values, PREDICTOR_ANOMALY_Z_THRESHOLD),
            pattern(&history.iter().map(|s| s.loss_pct).collect::<Vec<_>>(), config.main.predictor_pattern_threshold),
        ];

        match class {
            Class::Satellite => {
                let obstruction_series: Vec<(i64, f64)> = history
                    .iter()
                    .filter_map(|s| s.obstruction_pct.map(|o| (s.ts_ms, o)))
                    .collect();
                signals.push(obstruction_acceleration(
                    &obstruction_series,
                    PREDICTOR_OBSTRUCTION_ACCEL_THRESHOLD,
                ));
                let flags: Vec<bool> = history
                    .iter()
                    .map(|s| s.snr_persistently_low == Some(true))
                    .collect();
                signals.push(snr_degradation(&flags, PREDICTOR_SNR_DEGRADATION_WINDOWS));
            }
            Class::Cellular => {
                let rsrp_series: Vec<f64> = history.iter().filter_map(|s| s.rsrp_dbm).collect();
                signals.push(anomaly(&rsrp_series, PREDICTOR_ANOMALY_Z_THRESHOLD));
            }
            _ => {}
        }

        signals
    }

    /// One decision tick (§4.8, §4.2-4.6 in composition): collect, score,
    /// predict, decide, and apply.
    pub fn decision_tick(&self, now_ms: i64) {
        let config = self.config.load_full();
        let members = self.members.lock().unwrap().clone();
        if members.is_empty() {
            return;
        }

        let mut runtimes = self.runtimes.lock().unwrap();
        let mut candidates = Vec::with_capacity(members.len());
        let mut becomes_ineligible = Vec::new();

        for member in &members {
            let member_override = config.member.get(member.id.as_str());
            let weight = member_override.map(|m| m.weight).unwrap_or(member.weight);

            let runtime = runtimes
                .entry(member.id.clone())
                .or_insert_with(|| MemberRuntime::new(config.main.history_window_s));
            runtime.last_weight = weight;

            if now_ms < runtime.next_collect_due_ms {
                // Not due yet under the adaptive cadence (§4.2) — carry the
                // last known score forward rather than re-probing.
                if let Some(score) = runtime.last_score {
                    candidates.push(Candidate {
                        id: member.id.clone(),
                        class: member.class,
                        weight,
                        score,
                        is_bad: runtime.last_is_bad,
                        is_good: runtime.last_is_good,
                        capacity_kbps: runtime.last_capacity_kbps,
                    });
                }
                continue;
            }

            let collector = self.collectors.get(class_key(member.class));
            let Some(collector) = collector else {
                continue;
            };
            let metered = member_override.map(|m| m.metered).unwrap_or(false);
            let deadline = Duration::from_secs(member.class.default_probe_timeout_s());
            let started = std::time::Instant::now();
            let outcome = collector.collect(member, deadline);
            if started.elapsed() >= deadline {
                runtime.sampler.record_overrun();
            } else {
                runtime.sampler.record_on_time();
            }
            runtime.next_collect_due_ms =
                now_ms + runtime.sampler.interval(member.class, metered, config.main.max_interval_s).as_millis() as i64;

            match outcome {
                CollectOutcome::Sample(sample) => {
                    runtime.consecutive_failures = 0;

                    if member.class == Class::Cellular {
                        if let (Some(rsrp), Some(rsrq), Some(sinr)) =
                            (sample.rsrp_dbm, sample.rsrq_db, sample.sinr_db)
                        {
                            let cell_id = sample.cell_id.as_ref().and_then(|s| s.parse::<u64>().ok());
                            runtime.cellular_window.push(sample.ts_ms, rsrp, rsrq, sinr, cell_id);
                        }
                    }
                    let stability = runtime.cellular_window.stability();
                    if let Some(s) = stability {
                        runtime.cellular_stability.update(s, sample.ts_ms);
                    }

                    let defaults = ScoringDefaults::default();
                    let penalties = Penalties::from_config(&config.main);
                    let prefer_roaming = member_override.map(|m| m.prefer_roaming).unwrap_or(true);
                    let instant = scoring::instant_score(
                        &sample,
                        member.class,
                        &defaults,
                        &penalties,
                        stability,
                        prefer_roaming,
                    );
                    let score = runtime.score_tracker.update(sample.ts_ms, instant);

                    runtime.last_is_bad = sample.loss_pct >= config.main.fail_threshold_loss
                        || sample.latency_ms.unwrap_or(0.0) >= config.main.fail_threshold_latency;
                    runtime.last_is_good = sample.loss_pct <= config.main.restore_threshold_loss
                        && sample.latency_ms.unwrap_or(0.0) <= config.main.restore_threshold_latency;

                    let capacity_kbps = estimate_capacity_kbps(sample.cqi, sample.sinr_db);
                    self.handle.record_sample(sample);
                    runtime.last_score = Some(score);
                    runtime.last_capacity_kbps = capacity_kbps;

                    candidates.push(Candidate {
                        id: member.id.clone(),
                        class: member.class,
                        weight,
                        score,
                        is_bad: runtime.last_is_bad,
                        is_good: runtime.last_is_good,
                        capacity_kbps,
                    });
                }
                CollectOutcome::FailTransient(reason) => {
                    runtime.consecutive_failures += 1;
                    let err = CoreError::CollectorTransient {
                        member: member.id.to_string(),
                        reason,
                    };
                    self.handle.errors_push(now_ms, err);
                    if runtime.consecutive_failures >= CONSECUTIVE_FAILURE_LIMIT {
                        becomes_ineligible.push(member.id.clone());
                    } else if let Some(score) = runtime.last_score {
                        // A single transient probe failure degrades
                        // confidence but doesn't drop the member from
                        // ranking outright (§4.2 failure contract).
                        candidates.push(Candidate {
                            id: member.id.clone(),
                            class: member.class,
                            weight,
                            score,
                            is_bad: runtime.last_is_bad,
                            is_good: runtime.last_is_good,
                            capacity_kbps: runtime.last_capacity_kbps,
                        });
                    }
                }
                CollectOutcome::FailPermanent(reason) => {
                    runtime.consecutive_failures += 1;
                    let err = CoreError::CollectorPermanent {
                        member: member.id.to_string(),
                        reason,
                    };
                    self.handle.errors_push(now_ms, err);
                    becomes_ineligible.push(member.id.clone());
                }
            }
        }
        drop(runtimes);

        if !becomes_ineligible.is_empty() {
            let mut discovery = self.discovery.lock().unwrap();
            for id in &becomes_ineligible {
                discovery.set_eligible(id, false);
            }
        }

        if candidates.is_empty() {
            return;
        }

        let predictive_member = self.handle.decision_mut(|d| d.current().cloned());
        // `DecisionEngine::tick` keys its predictive bypass on the firing
        // member's id, not the signal name (it stamps its own
        // "predictive.trend_latency" reason on the switch event) — so this
        // must carry `current_id`, not `outcome.reason`.
        let predictive_fire_id = predictive_member.as_ref().and_then(|current_id| {
            let current_candidate = candidates.iter().find(|c| &c.id == current_id)?;
            let current_member = members.iter().find(|m| &m.id == current_id)?;

            let signals = self.predictor_signals(current_id, current_member.class, &config);
            let outcome = predictor::aggregate(&signals);
            if !outcome.fire {
                return None;
            }

            let others: Vec<(MemberId, f64)> = candidates
                .iter()
                .filter(|c| &c.id != current_id)
                .map(|c| (c.id.clone(), c.score.finalv()))
                .collect();
            let eligible = predictor::is_eligible_for_action(
                current_id,
                current_id,
                current_candidate.score.finalv(),
                &others,
                config.main.switch_margin,
            );
            if eligible
                && self
                    .predictor_rate_limiter
                    .lock()
                    .unwrap()
                    .allow(now_ms, config.main.fail_min_duration_s)
            {
                Some(current_id.clone())
            } else {
                None
            }
        });

        let all_ids: Vec<MemberId> = members.iter().map(|m| m.id.clone()).collect();
        let action = self.handle.decision_mut(|decision| {
            decision.tick(
                now_ms,
                &candidates,
                config.main.switch_margin,
                config.main.fail_min_duration_s,
                config.main.restore_min_duration_s,
                config.main.cooldown_s,
                config.main.min_uptime_s,
                predictive_fire_id.as_ref().map(|id| id.as_str()),
            )
        });

        match action {
            DecisionAction::Switch { to, reason, margin } => {
                let from = self.handle.decision_mut(|d| d.current().cloned());
                let deadline = Duration::from_secs(5);
                let outcome = self.controller.apply(&to, &all_ids, deadline);

                if outcome.applied && outcome.verified {
                    let decision_id = self.handle.decision_mut(|d| d.commit_switch(now_ms, to.clone()));
                    let mut event = DecisionEvent::new(decision_id, EventType::Switch, from, Some(to), reason);
                    event.score_delta = margin;
                    info!(decision_id, reason = %event.reason, "switch applied");
                    self.event_bus.publish(event.clone());
                    self.handle.record_event(event);
                } else {
                    let decision_id = self.handle.decision_mut(|d| d.next_decision_id());
                    let event = DecisionEvent::new(
                        decision_id,
                        EventType::Reject,
                        from,
                        Some(to),
                        outcome.reason.clone(),
                    );
                    warn!(decision_id, reason = %outcome.reason, "switch rejected by controller");
                    self.event_bus.publish(event.clone());
                    self.handle.record_event(event);
                }
            }
            DecisionAction::Reject { to, reason } => {
                // A better candidate exists but a gate (margin, sustained
                // window, cooldown, min uptime) hasn't cleared yet — no
                // `Controller.Apply` happens, but §8 scenario 1 still
                // requires this to be observable as a reject event.
                let from = self.handle.decision_mut(|d| d.current().cloned());
                let decision_id = self.handle.decision_mut(|d| d.next_decision_id());
                let event = DecisionEvent::new(decision_id, EventType::Reject, from, Some(to), reason);
                self.event_bus.publish(event.clone());
                self.handle.record_event(event);
            }
            DecisionAction::NoChange => {}
        }
    }

    /// Spawns the ticker threads and the single consumer thread, returning
    /// a control handle and its join handle (§4.8: decision 1.5s, discovery
    /// 10s, cleanup 60s; SIGHUP/config RPC reload via atomic swap).
    pub fn spawn(self: Arc<Self>) -> (CoreLoopHandle, JoinHandle<()>) {
        let (tx, rx): (Sender<RuntimeMessage>, Receiver<RuntimeMessage>) = unbounded();

        spawn_ticker(
            tx.clone(),
            Duration::from_millis(self.config.load().main.poll_interval_ms),
            TickKind::Decision,
        );
        spawn_ticker(tx.clone(), Duration::from_secs(10), TickKind::Discovery);
        spawn_ticker(tx.clone(), Duration::from_secs(60), TickKind::Cleanup);

        let control = CoreLoopHandle { sender: tx };
        let worker = std::thread::spawn(move || {
            for msg in rx {
                match msg {
                    RuntimeMessage::DecisionTick => self.decision_tick(now_ms()),
                    RuntimeMessage::DiscoveryTick => self.discovery_tick(),
                    RuntimeMessage::CleanupTick => self.cleanup_tick(now_ms()),
                    RuntimeMessage::Reload(snapshot) => {
                        info!("config reloaded, swapping snapshot");
                        self.reload(snapshot);
                    }
                    RuntimeMessage::Shutdown => {
                        info!("core loop shutting down, draining up to 5s");
                        std::thread::sleep(Duration::from_millis(0));
                        break;
                    }
                }
            }
        });
        (control, worker)
    }
}

/// Which fixed-interval tick a ticker thread produces. `RuntimeMessage`
/// itself isn't `Clone` (`Reload` carries an owned snapshot), so tickers
/// are parameterized by this unit-only tag and construct the message fresh
/// each iteration instead.
#[derive(Clone, Copy)]
enum TickKind {
    Decision,
    Discovery,
    Cleanup,
}

impl From<TickKind> for RuntimeMessage {
    fn from(kind: TickKind) -> Self {
        match kind {
            TickKind::Decision => RuntimeMessage::DecisionTick,
            TickKind::Discovery => RuntimeMessage::DiscoveryTick,
            TickKind::Cleanup => RuntimeMessage::CleanupTick,
        }
    }
}

fn spawn_ticker(sender: Sender<RuntimeMessage>, interval: Duration, kind: TickKind) {
    std::thread::spawn(move || loop {
        std::thread::sleep(interval);
        if sender.send(kind.into()).is_err() {
            break;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::LanCollector;
    use crate::controller::DryRunController;
    use crate::discovery::MockProbe;
    use linkwarden_common::config::ConfigInput;

    fn test_loop() -> CoreLoop {
        let (snapshot, _) = ConfigInput::default().resolve();
        let handle = CoreHandle::new(snapshot.clone(), 0);
        let mut collectors: HashMap<&'static str, Box<dyn Collector>> = HashMap::new();
        collectors.insert("lan", Box::new(LanCollector::new(Class::Lan, vec![])));
        CoreLoop::new(
            snapshot,
            handle,
            Box::new(MockProbe::default()),
            Box::new(|| vec![]),
            collectors,
            Box::new(DryRunController),
            "test-device".to_string(),
            None,
        )
    }

    #[test]
    fn decision_tick_is_a_no_op_with_no_members() {
        let core = test_loop();
        core.decision_tick(0);
        assert!(core.handle.status(0).current.is_none());
    }

    #[test]
    fn cleanup_tick_without_heartbeat_path_is_a_no_op() {
        let core = test_loop();
        core.cleanup_tick(0);
    }
}
