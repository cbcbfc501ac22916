//! Decision events — the output of the decision engine (§3) and the stable
//! JSON payload shape consumed by telemetry/notifiers (§6.6).

use crate::member::MemberId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Decision event type (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Switch,
    Restore,
    Reject,
    Warmup,
    Cooldown,
}

/// A decision event. Field names follow the stable payload keys in §6.6
/// (`ts`, `reason`, `decision_id`, …) so the event *is* the JSON the
/// telemetry ring and notifiers consume — no separate DTO translation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub ts: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub from: Option<MemberId>,
    pub to: Option<MemberId>,
    pub reason: String,
    pub score_delta: f64,
    pub windows_ms: u64,
    pub decision_id: u64,

    // ── §6.6 context fields, present when relevant to `reason` ──
    pub member: Option<MemberId>,
    pub class: Option<String>,
    pub state: Option<String>,
    pub lat_ms: Option<f64>,
    pub loss_pct: Option<f64>,
    pub jitter_ms: Option<f64>,
    pub obstruction_pct: Option<f64>,
    pub rsrp: Option<f64>,
    pub rsrq: Option<f64>,
    pub sinr: Option<f64>,
    pub bad_window_s: Option<f64>,
    pub good_window_s: Option<f64>,
    pub switch_margin: Option<f64>,
    pub policy: Option<String>,
}

impl DecisionEvent {
    /// Builds a minimal event; callers fill in context fields as needed.
    pub fn new(
        decision_id: u64,
        event_type: EventType,
        from: Option<MemberId>,
        to: Option<MemberId>,
        reason: impl Into<String>,
    ) -> Self {
        DecisionEvent {
            ts: Utc::now(),
            event_type,
            from,
            to,
            reason: reason.into(),
            score_delta: 0.0,
            windows_ms: 0,
            decision_id,
            member: None,
            class: None,
            state: None,
            lat_ms: None,
            loss_pct: None,
            jitter_ms: None,
            obstruction_pct: None,
            rsrp: None,
            rsrq: None,
            sinr: None,
            bad_window_s: None,
            good_window_s: None,
            switch_margin: None,
            policy: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_event_serializes_type_field() {
        let ev = DecisionEvent::new(
            1,
            EventType::Switch,
            Some(MemberId::from("sat0")),
            Some(MemberId::from("wwan0")),
            "threshold",
        );
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"type\":\"switch\""));
        assert!(json.contains("\"reason\":\"threshold\""));
    }
}
