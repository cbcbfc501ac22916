//! Configuration snapshot (§3, §6.1).
//!
//! Follows the teacher's `*Input` (all-`Option` `Deserialize`) →
//! `.resolve()` → validated, defaulted, `Clone`-cheap snapshot pattern.
//! `ConfigSnapshot` is immutable once built; the core loop swaps it behind
//! an `arc_swap::ArcSwap` (§5) — readers hold the `Arc` for one tick.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const CONFIG_VERSION: u32 = 1;

/// Data-cap awareness mode for metered collectors (§6.1 `data_cap_mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCapMode {
    Balanced,
    Conservative,
    Aggressive,
}

impl Default for DataCapMode {
    fn default() -> Self {
        DataCapMode::Balanced
    }
}

/// Log verbosity (§6.1 `log_level`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// A single field falling back to a default or getting clamped during
/// `resolve()`. The core loop logs these at `WARN` (§6.1, §7 `ConfigInvalid`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub field: String,
    pub detail: String,
}

// ─────────────────────────── Raw (input) shape ───────────────────────────

/// Raw `main` section as parsed from TOML. Every field optional so partial
/// documents (and `config.set(patch)` diffs, §10.4) deserialize cleanly.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MainSectionInput {
    pub enable: Option<bool>,
    pub use_policy_daemon: Option<bool>,
    pub poll_interval_ms: Option<u64>,
    pub history_window_s: Option<u64>,
    pub retention_hours: Option<u64>,
    pub max_ram_mb: Option<u64>,
    pub data_cap_mode: Option<DataCapMode>,
    pub predictive: Option<bool>,
    pub switch_margin: Option<f64>,
    pub min_uptime_s: Option<u64>,
    pub cooldown_s: Option<u64>,
    pub fail_threshold_loss: Option<f64>,
    pub fail_threshold_latency: Option<f64>,
    pub fail_min_duration_s: Option<u64>,
    pub restore_threshold_loss: Option<f64>,
    pub restore_threshold_latency: Option<f64>,
    pub restore_min_duration_s: Option<u64>,
    pub log_level: Option<LogLevel>,
    pub roaming_penalty: Option<f64>,
    pub wifi_weak_rssi_dbm: Option<f64>,
    pub wifi_weak_penalty: Option<f64>,
    pub predictor_pattern_threshold: Option<f64>,
    pub fallback_route_mutation: Option<bool>,
    pub max_collectors_in_flight: Option<usize>,
    pub max_interval_s: Option<u64>,
}

/// Per-member override section (§6.1).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MemberOverrideInput {
    pub class: Option<String>,
    pub weight: Option<u32>,
    pub min_uptime_s: Option<u64>,
    pub cooldown_s: Option<u64>,
    pub prefer_roaming: Option<bool>,
    pub metered: Option<bool>,
}

/// Top-level input document: `[main]` plus `[member.<name>]` tables.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigInput {
    pub version: Option<u32>,
    pub main: MainSectionInput,
    pub member: HashMap<String, MemberOverrideInput>,
}

// ──────────────────────────── Resolved shape ──────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainSection {
    pub enable: bool,
    pub use_policy_daemon: bool,
    pub poll_interval_ms: u64,
    pub history_window_s: u64,
    pub retention_hours: u64,
    pub max_ram_mb: u64,
    pub data_cap_mode: DataCapMode,
    pub predictive: bool,
    pub switch_margin: f64,
    pub min_uptime_s: u64,
    pub cooldown_s: u64,
    pub fail_threshold_loss: f64,
    pub fail_threshold_latency: f64,
    pub fail_min_duration_s: u64,
    pub restore_threshold_loss: f64,
    pub restore_threshold_latency: f64,
    pub restore_min_duration_s: u64,
    pub log_level: LogLevel,
    pub roaming_penalty: f64,
    pub wifi_weak_rssi_dbm: f64,
    pub wifi_weak_penalty: f64,
    pub predictor_pattern_threshold: f64,
    pub fallback_route_mutation: bool,
    pub max_collectors_in_flight: usize,
    pub max_interval_s: u64,
}

impl Default for MainSection {
    fn default() -> Self {
        MainSection {
            enable: true,
            use_policy_daemon: true,
            poll_interval_ms: 1500,
            history_window_s: 600,
            retention_hours: 24,
            max_ram_mb: 16,
            data_cap_mode: DataCapMode::default(),
            predictive: true,
            switch_margin: 10.0,
            min_uptime_s: 20,
            cooldown_s: 20,
            fail_threshold_loss: 10.0,
            fail_threshold_latency: 1500.0,
            fail_min_duration_s: 10,
            restore_threshold_loss: 1.0,
            restore_threshold_latency: 300.0,
            restore_min_duration_s: 30,
            log_level: LogLevel::default(),
            roaming_penalty: 15.0,
            wifi_weak_rssi_dbm: -75.0,
            wifi_weak_penalty: 10.0,
            predictor_pattern_threshold: 0.8,
            fallback_route_mutation: true,
            max_collectors_in_flight: 16,
            max_interval_s: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberOverride {
    pub class: Option<String>,
    pub weight: u32,
    pub min_uptime_s: u64,
    pub cooldown_s: u64,
    pub prefer_roaming: bool,
    pub metered: bool,
}

impl Default for MemberOverride {
    fn default() -> Self {
        MemberOverride {
            class: None,
            weight: 100,
            min_uptime_s: 20,
            cooldown_s: 20,
            prefer_roaming: true,
            metered: false,
        }
    }
}

/// Immutable, validated configuration snapshot. `Clone` is cheap enough for
/// `arc_swap` pointer-swap semantics — callers clone the `Arc`, not this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub version: u32,
    pub main: MainSection,
    pub member: HashMap<String, MemberOverride>,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        ConfigSnapshot {
            version: CONFIG_VERSION,
            main: MainSection::default(),
            member: HashMap::new(),
        }
    }
}

fn warn_if_missing<T: Clone>(
    field: &str,
    value: Option<T>,
    default: T,
    warnings: &mut Vec<ConfigWarning>,
) -> T {
    match value {
        Some(v) => v,
        None => {
            warnings.push(ConfigWarning {
                field: field.to_string(),
                detail: "missing, using default".to_string(),
            });
            default
        }
    }
}

fn clamp_f64(
    field: &str,
    value: f64,
    lo: f64,
    hi: f64,
    warnings: &mut Vec<ConfigWarning>,
) -> f64 {
    let clamped = value.clamp(lo, hi);
    if (clamped - value).abs() > f64::EPSILON {
        warnings.push(ConfigWarning {
            field: field.to_string(),
            detail: format!("{value} out of range [{lo}, {hi}], clamped to {clamped}"),
        });
    }
    clamped
}

impl ConfigInput {
    /// Validate, default, and clamp into a [`ConfigSnapshot`], collecting a
    /// warning for every field that fell back or was clamped (§6.1, §7).
    pub fn resolve(self) -> (ConfigSnapshot, Vec<ConfigWarning>) {
        let mut warnings = Vec::new();
        let d = MainSection::default();
        let m = self.main;

        let version = self.version.unwrap_or(CONFIG_VERSION);

        let main = MainSection {
            enable: warn_if_missing("main.enable", m.enable, d.enable, &mut warnings),
            use_policy_daemon: warn_if_missing(
                "main.use_policy_daemon",
                m.use_policy_daemon,
                d.use_policy_daemon,
                &mut warnings,
            ),
            poll_interval_ms: warn_if_missing(
                "main.poll_interval_ms",
                m.poll_interval_ms,
                d.poll_interval_ms,
                &mut warnings,
            )
            .max(100),
            history_window_s: warn_if_missing(
                "main.history_window_s",
                m.history_window_s,
                d.history_window_s,
                &mut warnings,
            ),
            retention_hours: warn_if_missing(
                "main.retention_hours",
                m.retention_hours,
                d.retention_hours,
                &mut warnings,
            ),
            max_ram_mb: warn_if_missing(
                "main.max_ram_mb",
                m.max_ram_mb,
                d.max_ram_mb,
                &mut warnings,
            )
            .max(1),
            data_cap_mode: warn_if_missing(
                "main.data_cap_mode",
                m.data_cap_mode,
                d.data_cap_mode,
                &mut warnings,
            ),
            predictive: warn_if_missing("main.predictive", m.predictive, d.predictive, &mut warnings),
            switch_margin: clamp_f64(
                "main.switch_margin",
                warn_if_missing(
                    "main.switch_margin",
                    m.switch_margin,
                    d.switch_margin,
                    &mut warnings,
                ),
                0.0,
                100.0,
                &mut warnings,
            ),
            min_uptime_s: warn_if_missing(
                "main.min_uptime_s",
                m.min_uptime_s,
                d.min_uptime_s,
                &mut warnings,
            ),
            cooldown_s: warn_if_missing("main.cooldown_s", m.cooldown_s, d.cooldown_s, &mut warnings),
            fail_threshold_loss: clamp_f64(
                "main.fail_threshold_loss",
                warn_if_missing(
                    "main.fail_threshold_loss",
                    m.fail_threshold_loss,
                    d.fail_threshold_loss,
                    &mut warnings,
                ),
                0.0,
                100.0,
                &mut warnings,
            ),
            fail_threshold_latency: warn_if_missing(
                "main.fail_threshold_latency",
                m.fail_threshold_latency,
                d.fail_threshold_latency,
                &mut warnings,
            )
            .max(0.0),
            fail_min_duration_s: warn_if_missing(
                "main.fail_min_duration_s",
                m.fail_min_duration_s,
                d.fail_min_duration_s,
                &mut warnings,
            ),
            restore_threshold_loss: clamp_f64(
                "main.restore_threshold_loss",
                warn_if_missing(
                    "main.restore_threshold_loss",
                    m.restore_threshold_loss,
                    d.restore_threshold_loss,
                    &mut warnings,
                ),
                0.0,
                100.0,
                &mut warnings,
            ),
            restore_threshold_latency: warn_if_missing(
                "main.restore_threshold_latency",
                m.restore_threshold_latency,
                d.restore_threshold_latency,
                &mut warnings,
            )
            .max(0.0),
            restore_min_duration_s: warn_if_missing(
                "main.restore_min_duration_s",
                m.restore_min_duration_s,
                d.restore_min_duration_s,
                &mut warnings,
            ),
            log_level: warn_if_missing("main.log_level", m.log_level, d.log_level, &mut warnings),
            roaming_penalty: warn_if_missing(
                "main.roaming_penalty",
                m.roaming_penalty,
                d.roaming_penalty,
                &mut warnings,
            )
            .max(0.0),
            wifi_weak_rssi_dbm: warn_if_missing(
                "main.wifi_weak_rssi_dbm",
                m.wifi_weak_rssi_dbm,
                d.wifi_weak_rssi_dbm,
                &mut warnings,
            ),
            wifi_weak_penalty: warn_if_missing(
                "main.wifi_weak_penalty",
                m.wifi_weak_penalty,
                d.wifi_weak_penalty,
                &mut warnings,
            )
            .max(0.0),
            predictor_pattern_threshold: clamp_f64(
                "main.predictor_pattern_threshold",
                warn_if_missing(
                    "main.predictor_pattern_threshold",
                    m.predictor_pattern_threshold,
                    d.predictor_pattern_threshold,
                    &mut warnings,
                ),
                0.0,
                1.0,
                &mut warnings,
            ),
            fallback_route_mutation: warn_if_missing(
                "main.fallback_route_mutation",
                m.fallback_route_mutation,
                d.fallback_route_mutation,
                &mut warnings,
            ),
            max_collectors_in_flight: warn_if_missing(
                "main.max_collectors_in_flight",
                m.max_collectors_in_flight,
                d.max_collectors_in_flight,
                &mut warnings,
            )
            .max(1),
            max_interval_s: warn_if_missing(
                "main.max_interval_s",
                m.max_interval_s,
                d.max_interval_s,
                &mut warnings,
            )
            .max(1),
        };

        let mut member = HashMap::new();
        for (name, ov) in self.member {
            let dflt = MemberOverride::default();
            member.insert(
                name,
                MemberOverride {
                    class: ov.class,
                    weight: ov.weight.unwrap_or(dflt.weight),
                    min_uptime_s: ov.min_uptime_s.unwrap_or(main.min_uptime_s),
                    cooldown_s: ov.cooldown_s.unwrap_or(main.cooldown_s),
                    prefer_roaming: ov.prefer_roaming.unwrap_or(dflt.prefer_roaming),
                    metered: ov.metered.unwrap_or(dflt.metered),
                },
            );
        }

        (
            ConfigSnapshot {
                version,
                main,
                member,
            },
            warnings,
        )
    }
}

impl ConfigSnapshot {
    /// Parse a UCI-like TOML document into a validated snapshot (§6.1,
    /// §10.4). Empty input resolves to all-default.
    pub fn from_toml_str(input: &str) -> Result<(ConfigSnapshot, Vec<ConfigWarning>), String> {
        if input.trim().is_empty() {
            return Ok(ConfigInput::default().resolve());
        }
        let parsed: ConfigInput =
            toml::from_str(input).map_err(|e| format!("invalid config TOML: {e}"))?;
        Ok(parsed.resolve())
    }

    /// Serialize back to TOML. Used for `config.get()` (§6.2) and the
    /// round-trip law in §8.
    pub fn to_toml_string(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("failed to serialize config: {e}"))
    }

    /// Merge a partial TOML patch onto this snapshot's input representation
    /// and re-resolve as a whole (§10.4 `config.set(patch)` semantics:
    /// atomic on success, rejected without mutation on failure).
    pub fn apply_patch(&self, patch_toml: &str) -> Result<(ConfigSnapshot, Vec<ConfigWarning>), String> {
        let mut base: ConfigInput =
            toml::from_str(&self.to_toml_string()?).map_err(|e| format!("internal: {e}"))?;
        let patch: ConfigInput =
            toml::from_str(patch_toml).map_err(|e| format!("invalid patch TOML: {e}"))?;

        macro_rules! merge_opt {
            ($field:ident) => {
                if patch.main.$field.is_some() {
                    base.main.$field = patch.main.$field;
                }
            };
        }
        merge_opt!(enable);
        merge_opt!(use_policy_daemon);
        merge_opt!(poll_interval_ms);
        merge_opt!(history_window_s);
        merge_opt!(retention_hours);
        merge_opt!(max_ram_mb);
        merge_opt!(data_cap_mode);
        merge_opt!(predictive);
        merge_opt!(switch_margin);
        merge_opt!(min_uptime_s);
        merge_opt!(cooldown_s);
        merge_opt!(fail_threshold_loss);
        merge_opt!(fail_threshold_latency);
        merge_opt!(fail_min_duration_s);
        merge_opt!(restore_threshold_loss);
        merge_opt!(restore_threshold_latency);
        merge_opt!(restore_min_duration_s);
        merge_opt!(log_level);
        merge_opt!(roaming_penalty);
        merge_opt!(wifi_weak_rssi_dbm);
        merge_opt!(wifi_weak_penalty);
        merge_opt!(predictor_pattern_threshold);
        merge_opt!(fallback_route_mutation);
        merge_opt!(max_collectors_in_flight);
        merge_opt!(max_interval_s);

        for (name, ov) in patch.member {
            base.member.insert(name, ov);
        }
        if let Some(v) = patch.version {
            base.version = Some(v);
        }

        Ok(base.resolve())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_resolves_to_defaults() {
        let (snap, warnings) = ConfigSnapshot::from_toml_str("").unwrap();
        assert_eq!(snap.main, MainSection::default());
        assert!(!warnings.is_empty(), "every field defaulted should warn");
    }

    #[test]
    fn explicit_values_avoid_warnings_for_those_fields() {
        let toml = r#"
            [main]
            enable = true
            use_policy_daemon = true
            poll_interval_ms = 2000
            history_window_s = 600
            retention_hours = 24
            max_ram_mb = 16
            data_cap_mode = "balanced"
            predictive = true
            switch_margin = 12
            min_uptime_s = 20
            cooldown_s = 20
            fail_threshold_loss = 10
            fail_threshold_latency = 1500
            fail_min_duration_s = 10
            restore_threshold_loss = 1
            restore_threshold_latency = 300
            restore_min_duration_s = 30
            log_level = "info"
            roaming_penalty = 15
            wifi_weak_rssi_dbm = -75
            wifi_weak_penalty = 10
            predictor_pattern_threshold = 0.8
            fallback_route_mutation = true
            max_collectors_in_flight = 16
            max_interval_s = 120
        "#;
        let (snap, warnings) = ConfigSnapshot::from_toml_str(toml).unwrap();
        assert_eq!(snap.main.poll_interval_ms, 2000);
        assert!(
            warnings.is_empty(),
            "fully specified config should not warn, got {warnings:?}"
        );
    }

    #[test]
    fn switch_margin_clamped_out_of_range() {
        let toml = "[main]\nswitch_margin = 500";
        let (snap, warnings) = ConfigSnapshot::from_toml_str(toml).unwrap();
        assert_eq!(snap.main.switch_margin, 100.0);
        assert!(warnings.iter().any(|w| w.field == "main.switch_margin"));
    }

    #[test]
    fn member_override_inherits_main_cooldown_by_default() {
        let toml = r#"
            [main]
            cooldown_s = 45

            [member.wwan0]
            weight = 50
        "#;
        let (snap, _) = ConfigSnapshot::from_toml_str(toml).unwrap();
        let ov = snap.member.get("wwan0").unwrap();
        assert_eq!(ov.weight, 50);
        assert_eq!(ov.cooldown_s, 45);
    }

    #[test]
    fn roundtrip_parse_serialize_parse_is_identity() {
        let toml = r#"
            [main]
            switch_margin = 15
            cooldown_s = 30

            [member.sat0]
            weight = 200
        "#;
        let (snap1, _) = ConfigSnapshot::from_toml_str(toml).unwrap();
        let serialized = snap1.to_toml_string().unwrap();
        let (snap2, _) = ConfigSnapshot::from_toml_str(&serialized).unwrap();
        assert_eq!(snap1, snap2);
    }

    #[test]
    fn apply_patch_merges_onto_existing_snapshot() {
        let (base, _) = ConfigSnapshot::from_toml_str("[main]\nswitch_margin = 10").unwrap();
        let (patched, _) = base.apply_patch("[main]\nswitch_margin = 25").unwrap();
        assert_eq!(patched.main.switch_margin, 25.0);
        // untouched fields survive the merge
        assert_eq!(patched.main.cooldown_s, base.main.cooldown_s);
    }

    #[test]
    fn apply_patch_rejects_invalid_without_mutating() {
        let (base, _) = ConfigSnapshot::from_toml_str("").unwrap();
        let result = base.apply_patch("[main]\nswitch_margin = \"not a number\"");
        assert!(result.is_err());
    }

    #[test]
    fn version_zero_or_missing_defaults_to_current() {
        let (snap, _) = ConfigSnapshot::from_toml_str("").unwrap();
        assert_eq!(snap.version, CONFIG_VERSION);
    }
}
