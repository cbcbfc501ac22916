//! Decision engine (§4.5): picks the member the controller should route
//! through, applying hysteresis, cooldowns, and the deterministic/predictive
//! switch-gating split.

use linkwarden_common::{Class, MemberId, Score};
use std::collections::HashMap;

/// Per-member candidate snapshot for one tick.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: MemberId,
    pub class: Class,
    pub weight: u32,
    pub score: Score,
    /// Below the configured fail thresholds (§4.5 step 5 "bad").
    pub is_bad: bool,
    /// Above the configured restore thresholds (§4.5 step 5 "good").
    pub is_good: bool,
    /// CQI/SINR-derived throughput ceiling (§11 supplement), `None` for
    /// non-cellular classes or when the RF fields weren't populated this
    /// tick. Only consulted as a cellular-vs-cellular tiebreak in step 2.
    pub capacity_kbps: Option<f64>,
}

/// Per-member state tracked across ticks (§4.5 "State per member").
#[derive(Debug, Clone)]
struct MemberState {
    /// Earliest time this member may become a switch target again after
    /// being marked ineligible (e.g. a collector permanent failure).
    cooldown_until_ms: i64,
    /// Last time this member transitioned to or from being `current`.
    last_change_ms: i64,
}

impl Default for MemberState {
    fn default() -> Self {
        MemberState {
            cooldown_until_ms: 0,
            last_change_ms: 0,
        }
    }
}

/// Outcome of one [`DecisionEngine::tick`] call. Never mutates engine state
/// directly — the caller applies the controller action first and reports
/// back via [`DecisionEngine::commit_switch`] or [`DecisionEngine::reject`].
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionAction {
    /// `top == current`, or no eligible candidate cleared the gates.
    NoChange,
    /// A better candidate exists but a gate (margin, sustained window,
    /// cooldown, or min uptime) isn't satisfied yet — surfaced as a
    /// `reject` event (§8 scenario 1) rather than silently dropped.
    Reject { to: MemberId, reason: String },
    /// A switch is due; the caller must call `Controller.Apply(to)`.
    Switch {
        to: MemberId,
        reason: String,
        margin: f64,
    },
}

/// Reason codes for [`DecisionAction::Reject`] (§8 scenario 1's
/// `reason="window_not_met"`).
mod reject_reason {
    pub const MARGIN_NOT_MET: &str = "margin_not_met";
    pub const WINDOW_NOT_MET: &str = "window_not_met";
    pub const COOLDOWN_ACTIVE: &str = "cooldown_active";
    pub const MIN_UPTIME_NOT_MET: &str = "min_uptime_not_met";
}

/// Lower rank sorts first when `final` scores tie (§4.5 step 2 "class
/// preference"): wired beats wireless beats metered beats satellite.
fn class_rank(class: Class) -> u8 {
    match class {
        Class::Lan => 0,
        Class::Wifi => 1,
        Class::Cellular => 2,
        Class::Satellite => 3,
        Class::Other => 4,
    }
}

pub struct DecisionEngine {
    members: HashMap<MemberId, MemberState>,
    current: Option<MemberId>,
    last_switch_ms: i64,
    fail_window_start_ms: Option<i64>,
    restore_window_start_ms: Option<i64>,
    decision_seq: u64,
}

impl DecisionEngine {
    pub fn new() -> Self {
        DecisionEngine {
            members: HashMap::new(),
            current: None,
            last_switch_ms: i64::MIN / 2,
            fail_window_start_ms: None,
            restore_window_start_ms: None,
            decision_seq: 0,
        }
    }

    pub fn current(&self) -> Option<&MemberId> {
        self.current.as_ref()
    }

    /// Marks a member ineligible until `now_ms + cooldown_s*1000` (§7: a
    /// collector permanent failure removes a member from selection).
    pub fn set_cooldown(&mut self, id: &MemberId, now_ms: i64, cooldown_s: u64) {
        self.members.entry(id.clone()).or_default().cooldown_until_ms =
            now_ms + cooldown_s as i64 * 1000;
    }

    /// Runs one decision tick (§4.5 steps 1-6). `predictive_fire` is the
    /// predictor's aggregate outcome for the current member, already
    /// eligibility-checked by `predictor::is_eligible_for_action` and
    /// rate-limited by `predictor::RateLimiter`.
    #[allow(clippy::too_many_arguments)]
    pub fn tick(
        &mut self,
        now_ms: i64,
        candidates: &[Candidate],
        switch_margin: f64,
        fail_min_duration_s: u64,
        restore_min_duration_s: u64,
        cooldown_s: u64,
        min_uptime_s: u64,
        predictive_fire: Option<&str>,
    ) -> DecisionAction {
        // Step 1: drop members in warmup, ineligible, or member-level cooldown.
        let mut ranked: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| c.score.eligible && !c.score.in_warmup())
            .filter(|c| {
                self.members
                    .get(&c.id)
                    .map(|m| now_ms >= m.cooldown_until_ms)
                    .unwrap_or(true)
            })
            .collect();
        if ranked.is_empty() {
            return DecisionAction::NoChange;
        }

        // Step 2: sort by final desc, tiebreak cellular capacity desc (§11
        // supplement, only meaningful between two cellular candidates),
        // then weight desc, then class rank.
        ranked.sort_by(|a, b| {
            b.score
                .finalv()
                .partial_cmp(&a.score.finalv())
                .unwrap()
                .then_with(|| {
                    if a.class == Class::Cellular && b.class == Class::Cellular {
                        b.capacity_kbps.partial_cmp(&a.capacity_kbps).unwrap_or(std::cmp::Ordering::Equal)
                    } else {
                        std::cmp::Ordering::Equal
                    }
                })
                .then_with(|| b.weight.cmp(&a.weight))
                .then_with(|| class_rank(a.class).cmp(&class_rank(b.class)))
        });
        let top = ranked[0];

        // Step 3: already on the best member.
        if Some(&top.id) == self.current.as_ref() {
            self.fail_window_start_ms = None;
            if top.is_good {
                self.restore_window_start_ms.get_or_insert(now_ms);
            } else {
                self.restore_window_start_ms = None;
            }
            return DecisionAction::NoChange;
        }

        let current_candidate = self
            .current
            .as_ref()
            .and_then(|id| candidates.iter().find(|c| &c.id == id));

        let Some(current) = current_candidate else {
            // No current member yet (bootstrap): take the top candidate outright.
            return DecisionAction::Switch {
                to: top.id.clone(),
                reason: "bootstrap".to_string(),
                margin: top.score.finalv(),
            };
        };

        let margin = top.score.finalv() - current.score.finalv();
        let is_predictive = predictive_fire == Some(current.id.as_str());

        // Step 4: deterministic path requires the full switch margin;
        // predictive path already cleared half-margin eligibility upstream.
        if !is_predictive && margin < switch_margin {
            return DecisionAction::Reject {
                to: top.id.clone(),
                reason: reject_reason::MARGIN_NOT_MET.to_string(),
            };
        }

        if current.is_bad {
            self.fail_window_start_ms.get_or_insert(now_ms);
        } else {
            self.fail_window_start_ms = None;
        }
        if top.is_good {
            self.restore_window_start_ms.get_or_insert(now_ms);
        } else {
            self.restore_window_start_ms = None;
        }

        let bad_elapsed_s = self
            .fail_window_start_ms
            .map(|t| (now_ms - t) as f64 / 1000.0)
            .unwrap_or(0.0);
        let good_elapsed_s = self
            .restore_window_start_ms
            .map(|t| (now_ms - t) as f64 / 1000.0)
            .unwrap_or(0.0);

        // Step 5: deterministic requires sustained bad/good; predictive may
        // bypass the bad-duration requirement but still needs `top` good.
        let restore_ready = good_elapsed_s >= restore_min_duration_s as f64;
        let fail_ready = bad_elapsed_s >= fail_min_duration_s as f64;
        if !restore_ready || !(fail_ready || is_predictive) {
            return DecisionAction::Reject {
                to: top.id.clone(),
                reason: reject_reason::WINDOW_NOT_MET.to_string(),
            };
        }

        // Step 6: global cooldown and per-member min uptime on `current`.
        if now_ms - self.last_switch_ms < cooldown_s as i64 * 1000 {
            return DecisionAction::Reject {
                to: top.id.clone(),
                reason: reject_reason::COOLDOWN_ACTIVE.to_string(),
            };
        }
        let current_last_change = self
            .members
            .get(&current.id)
            .map(|m| m.last_change_ms)
            .unwrap_or(i64::MIN / 2);
        if now_ms - current_last_change < min_uptime_s as i64 * 1000 {
            return DecisionAction::Reject {
                to: top.id.clone(),
                reason: reject_reason::MIN_UPTIME_NOT_MET.to_string(),
            };
        }

        let reason = if is_predictive {
            "predictive.trend_latency".to_string()
        } else {
            "threshold".to_string()
        };
        DecisionAction::Switch {
            to: top.id.clone(),
            reason,
            margin,
        }
    }

    /// Records a successful `Controller.Apply` (§4.5 step 7). Returns the
    /// decision id to stamp on the emitted event.
    pub fn commit_switch(&mut self, now_ms: i64, to: MemberId) -> u64 {
        if let Some(prev) = &self.current {
            self.members.entry(prev.clone()).or_default().last_change_ms = now_ms;
        }
        self.members.entry(to.clone()).or_default().last_change_ms = now_ms;
        self.current = Some(to);
        self.last_switch_ms = now_ms;
        self.fail_window_start_ms = None;
        self.restore_window_start_ms = None;
        self.decision_seq += 1;
        self.decision_seq
    }

    /// A controller `Apply` that never ran, or ran and failed — state does
    /// not change (§4.5: "on failure: leave current, emit reject event").
    pub fn next_decision_id(&mut self) -> u64 {
        self.decision_seq += 1;
        self.decision_seq
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        DecisionEngine::new()
    }
}
