//! Member identity and classification.
//!
//! A `Member` is a candidate uplink. Identity is a stable name; the rest of
//! the record carries classification and per-class hints. Discovery owns
//! creation and mutation (see `linkwarden_core::discovery`); every other
//! component reads copies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier for a member — the name the host routing policy uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(pub String);

impl MemberId {
    pub fn new(name: impl Into<String>) -> Self {
        MemberId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MemberId {
    fn from(s: &str) -> Self {
        MemberId(s.to_string())
    }
}

impl From<String> for MemberId {
    fn from(s: String) -> Self {
        MemberId(s)
    }
}

/// Uplink family. Determines which collector and scoring weights apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Class {
    Satellite,
    Cellular,
    Wifi,
    Lan,
    Other,
}

impl Class {
    pub fn as_str(&self) -> &'static str {
        match self {
            Class::Satellite => "satellite",
            Class::Cellular => "cellular",
            Class::Wifi => "wifi",
            Class::Lan => "lan",
            Class::Other => "other",
        }
    }

    /// Base collector probe cadence (§4.2 "Adaptive sampling").
    pub fn base_interval_s(&self) -> u64 {
        match self {
            Class::Satellite => 5,
            Class::Cellular => 30,
            Class::Wifi => 10,
            Class::Lan => 5,
            Class::Other => 10,
        }
    }

    /// Default per-class probe timeout (§4.2: "default 3–8s").
    pub fn default_probe_timeout_s(&self) -> u64 {
        match self {
            Class::Satellite => 4,
            Class::Cellular => 6,
            Class::Wifi => 3,
            Class::Lan => 3,
            Class::Other => 3,
        }
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a member's classification came from, kept for observability and
/// for `members()` (§6.2) so operators can tell a forced override from an
/// auto-detected class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    /// Detected by a heuristic/probe (§4.1 classification order).
    Auto,
    /// Forced by a per-member config override.
    ConfigOverride,
}

/// Cellular-specific discovery hint (§3 "per-class hints").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellularHint {
    pub sim_slot: Option<u8>,
}

/// A candidate uplink.
///
/// Lifecycle: created by discovery, mutated only by discovery and the core
/// loop, removed on disappearance after a debounce (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub class: Class,
    /// Backing netdev, e.g. "wwan0", "eth1".
    pub iface: String,
    /// Operator-assigned preference weight; used as a rank tiebreak (§4.5 step 2).
    pub weight: u32,
    /// Whether this member is currently eligible for selection (§4.5 step 1).
    pub eligible: bool,
    pub discovery_source: DiscoverySource,
    pub cellular: Option<CellularHint>,
    /// Consecutive refresh cycles this member has been continuously present,
    /// used for appearance debounce (§4.1).
    pub present_cycles: u32,
    /// Consecutive refresh cycles this member has been continuously absent,
    /// used for disappearance debounce (§4.1).
    pub absent_cycles: u32,
}

impl Member {
    pub fn new(id: impl Into<MemberId>, class: Class, iface: impl Into<String>) -> Self {
        Member {
            id: id.into(),
            class,
            iface: iface.into(),
            weight: 100,
            eligible: true,
            discovery_source: DiscoverySource::Auto,
            cellular: None,
            present_cycles: 0,
            absent_cycles: 0,
        }
    }
}
