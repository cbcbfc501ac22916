//! CQI/SINR → throughput mapping for cellular capacity estimation (§11
//! supplement), ported from the teacher's `modem::health` lookup tables.
//! Feeds the cellular class's §4.5 step 2 tiebreak and the per-member
//! capacity estimate surfaced via [`crate::rpc::MemberReport`].

/// CQI → approximate maximum throughput mapping (3GPP TS 36.213 Table 7.2.3-1).
///
/// Returns throughput in kbps for a 10 MHz LTE channel.
pub fn cqi_to_throughput_kbps(cqi: u8) -> f64 {
    match cqi {
        0 => 0.0,
        1 => 1_000.0,
        2 => 2_000.0,
        3 => 3_500.0,
        4 => 5_000.0,
        5 => 7_500.0,
        6 => 10_000.0,
        7 => 13_000.0,
        8 => 17_000.0,
        9 => 22_000.0,
        10 => 28_000.0,
        11 => 35_000.0,
        12 => 43_000.0,
        13 => 52_000.0,
        14 => 63_000.0,
        15 => 75_000.0,
        _ => 75_000.0,
    }
}

/// SINR → rough capacity ceiling in kbps (empirical mapping for LTE 10 MHz).
pub fn sinr_to_capacity_kbps(sinr_db: f64) -> f64 {
    if sinr_db < -5.0 {
        0.0
    } else if sinr_db < 0.0 {
        1000.0
    } else if sinr_db < 5.0 {
        5000.0
    } else if sinr_db < 10.0 {
        15000.0
    } else if sinr_db < 15.0 {
        30000.0
    } else if sinr_db < 20.0 {
        50000.0
    } else {
        75000.0
    }
}

/// Combines whichever of CQI/SINR a sample actually carries into a single
/// capacity estimate, taking the more conservative of the two when both are
/// present (same policy as the teacher's `LinkSupervisor::link_capacity_kbps`).
/// `None` when neither field is populated (e.g. the RPC/control-channel
/// backend never filled RF metrics for this tick).
pub fn estimate_capacity_kbps(cqi: Option<u8>, sinr_db: Option<f64>) -> Option<f64> {
    match (cqi, sinr_db) {
        (Some(cqi), Some(sinr_db)) => Some(cqi_to_throughput_kbps(cqi).min(sinr_to_capacity_kbps(sinr_db))),
        (Some(cqi), None) => Some(cqi_to_throughput_kbps(cqi)),
        (None, Some(sinr_db)) => Some(sinr_to_capacity_kbps(sinr_db)),
        (None, None) => None,
    }
}
