//! Member discovery & classification (§4.1).
//!
//! Discovery reads the host's routing-policy tree (a UCI-like key/value
//! structure, modeled here as `&[PolicyEntry]` rather than a literal UCI
//! parser — the out-of-scope "configuration loader" collaborator owns
//! reading `/etc/config/*`) and turns it into a debounced [`Member`] set by
//! running each candidate netdev through [`ClassificationProbe`].

mod probe;

pub use probe::{ClassificationProbe, LinkProtocol, MockProbe, SysfsProbe};

use linkwarden_common::{CellularHint, Class, DiscoverySource, Member, MemberId};
use std::collections::HashMap;
use tracing::warn;

/// Consecutive refresh cycles required before an appearance or
/// disappearance is committed to the published member set (§4.1).
pub const DEBOUNCE_CYCLES: u32 = 2;

/// One row of the host's routing-policy tree: a named member bound to a
/// netdev, with optional operator overrides.
#[derive(Debug, Clone)]
pub struct PolicyEntry {
    pub name: String,
    pub iface: String,
    pub class_override: Option<Class>,
    pub weight: u32,
    pub cellular_sim_slot: Option<u8>,
}

impl PolicyEntry {
    pub fn new(name: impl Into<String>, iface: impl Into<String>) -> Self {
        PolicyEntry {
            name: name.into(),
            iface: iface.into(),
            class_override: None,
            weight: 100,
            cellular_sim_slot: None,
        }
    }
}

/// Tracks the member set across refresh cycles, applying the appearance /
/// disappearance debounce described in §4.1.
pub struct Discovery {
    known: HashMap<MemberId, Member>,
}

impl Discovery {
    pub fn new() -> Self {
        Discovery {
            known: HashMap::new(),
        }
    }

    /// Re-read the policy tree and advance debounce counters by one cycle.
    /// Returns the published member set (members that have satisfied the
    /// appearance debounce and have not satisfied the disappearance one).
    ///
    /// Per §4.1's error contract: an empty `entries` slice logs a WARN and
    /// yields an empty set rather than panicking; a single bad entry never
    /// aborts the rest of the batch (there is nothing fallible per-entry
    /// here beyond classification, which always produces `Class::Other` in
    /// the worst case).
    pub fn refresh(&mut self, entries: &[PolicyEntry], probe: &dyn ClassificationProbe) -> Vec<Member> {
        if entries.is_empty() {
            warn!("discovery: policy tree is empty, no members present");
        }

        let mut present: HashMap<MemberId, &PolicyEntry> = HashMap::new();
        for entry in entries {
            present.insert(MemberId::new(entry.name.clone()), entry);
        }

        // Advance or create known members for everything present this cycle.
        for (id, entry) in &present {
            let member = self.known.entry(id.clone()).or_insert_with(|| {
                classify(entry, probe)
            });
            member.iface = entry.iface.clone();
            member.weight = entry.weight;
            member.absent_cycles = 0;
            member.present_cycles = (member.present_cycles + 1).min(DEBOUNCE_CYCLES);
        }

        // Age out everything missing this cycle.
        let missing: Vec<MemberId> = self
            .known
            .keys()
            .filter(|id| !present.contains_key(*id))
            .cloned()
            .collect();
        for id in &missing {
            if let Some(member) = self.known.get_mut(id) {
                member.present_cycles = 0;
                member.absent_cycles += 1;
            }
        }
        self.known
            .retain(|_, m| m.absent_cycles < DEBOUNCE_CYCLES);

        let mut published: Vec<Member> = self
            .known
            .values()
            .filter(|m| m.present_cycles >= DEBOUNCE_CYCLES)
            .cloned()
            .collect();
        published.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        published
    }

    /// Force a member's eligibility, e.g. after `CollectorPermanent` (§7).
    pub fn set_eligible(&mut self, id: &MemberId, eligible: bool) {
        if let Some(m) = self.known.get_mut(id) {
            m.eligible = eligible;
        }
    }
}

impl Default for Discovery {
    fn default() -> Self {
        Discovery::new()
    }
}

/// Classification order from §4.1: satellite management probe, then
/// cellular (link protocol / mobile-bus), then Wi-Fi STA, then Ethernet
/// WAN, else `other`.
fn classify(entry: &PolicyEntry, probe: &dyn ClassificationProbe) -> Member {
    if let Some(forced) = entry.class_override {
        let mut m = Member::new(entry.name.clone(), forced, entry.iface.clone());
        m.discovery_source = DiscoverySource::ConfigOverride;
        if forced == Class::Cellular {
            m.cellular = Some(CellularHint {
                sim_slot: entry.cellular_sim_slot,
            });
        }
        return m;
    }

    let class = if probe.satellite_reachable(&entry.iface) {
        Class::Satellite
    } else if is_cellular(&entry.iface, probe) {
        Class::Cellular
    } else if probe.is_wifi_sta_wan(&entry.iface) {
        Class::Wifi
    } else if probe.is_ethernet_wan(&entry.iface) {
        Class::Lan
    } else {
        Class::Other
    };

    let mut m = Member::new(entry.name.clone(), class, entry.iface.clone());
    m.discovery_source = DiscoverySource::Auto;
    if class == Class::Cellular {
        m.cellular = Some(CellularHint {
            sim_slot: entry
                .cellular_sim_slot
                .or_else(|| probe.mobile_bus_sim_slot(&entry.iface)),
        });
    }
    m
}

fn is_cellular(iface: &str, probe: &dyn ClassificationProbe) -> bool {
    matches!(
        probe.link_protocol(iface),
        Some(LinkProtocol::Qmi)
            | Some(LinkProtocol::Mbim)
            | Some(LinkProtocol::Ncm)
            | Some(LinkProtocol::Ppp)
            | Some(LinkProtocol::CdcEther)
    ) || probe.mobile_bus_reports_modem(iface)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_policy_tree_yields_empty_set() {
        let mut d = Discovery::new();
        let probe = MockProbe::default();
        let published = d.refresh(&[], &probe);
        assert!(published.is_empty());
    }

    #[test]
    fn classification_order_prefers_satellite_first() {
        let mut probe = MockProbe::default();
        probe.satellite_ifaces.insert("wwan0".into());
        probe
            .link_protocols
            .insert("wwan0".into(), LinkProtocol::Qmi);

        let mut d = Discovery::new();
        let entries = vec![PolicyEntry::new("sat0", "wwan0")];
        // needs two cycles to publish
        d.refresh(&entries, &probe);
        let published = d.refresh(&entries, &probe);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].class, Class::Satellite);
    }

    #[test]
    fn cellular_detected_via_link_protocol() {
        let mut probe = MockProbe::default();
        probe
            .link_protocols
            .insert("wwan1".into(), LinkProtocol::Mbim);

        let mut d = Discovery::new();
        let entries = vec![PolicyEntry::new("cell0", "wwan1")];
        d.refresh(&entries, &probe);
        let published = d.refresh(&entries, &probe);
        assert_eq!(published[0].class, Class::Cellular);
    }

    #[test]
    fn wifi_sta_detected() {
        let mut probe = MockProbe::default();
        probe.wifi_sta_ifaces.insert("wlan0".into());

        let mut d = Discovery::new();
        let entries = vec![PolicyEntry::new("wifi0", "wlan0")];
        d.refresh(&entries, &probe);
        let published = d.refresh(&entries, &probe);
        assert_eq!(published[0].class, Class::Wifi);
    }

    #[test]
    fn ethernet_wan_falls_back_to_lan() {
        let mut probe = MockProbe::default();
        probe.ethernet_wan_ifaces.insert("eth1".into());

        let mut d = Discovery::new();
        let entries = vec![PolicyEntry::new("wan0", "eth1")];
        d.refresh(&entries, &probe);
        let published = d.refresh(&entries, &probe);
        assert_eq!(published[0].class, Class::Lan);
    }

    #[test]
    fn unclassified_interface_is_other() {
        let probe = MockProbe::default();
        let mut d = Discovery::new();
        let entries = vec![PolicyEntry::new("mystery0", "tun0")];
        d.refresh(&entries, &probe);
        let published = d.refresh(&entries, &probe);
        assert_eq!(published[0].class, Class::Other);
    }

    #[test]
    fn config_override_skips_probe() {
        let probe = MockProbe::default();
        let mut d = Discovery::new();
        let mut entry = PolicyEntry::new("forced0", "eth2");
        entry.class_override = Some(Class::Satellite);
        d.refresh(&[entry.clone()], &probe);
        let published = d.refresh(&[entry], &probe);
        assert_eq!(published[0].class, Class::Satellite);
        assert_eq!(published[0].discovery_source, DiscoverySource::ConfigOverride);
    }

    #[test]
    fn appearance_requires_two_cycles() {
        let probe = MockProbe::default();
        let mut d = Discovery::new();
        let entries = vec![PolicyEntry::new("wan0", "eth0")];
        let first = d.refresh(&entries, &probe);
        assert!(first.is_empty(), "one cycle should not publish yet");
        let second = d.refresh(&entries, &probe);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn disappearance_requires_two_cycles() {
        let probe = MockProbe::default();
        let mut d = Discovery::new();
        let entries = vec![PolicyEntry::new("wan0", "eth0")];
        d.refresh(&entries, &probe);
        d.refresh(&entries, &probe);

        let first_missing = d.refresh(&[], &probe);
        assert_eq!(
            first_missing.len(),
            1,
            "single missed cycle should not drop the member yet"
        );
        let second_missing = d.refresh(&[], &probe);
        assert!(second_missing.is_empty(), "two missed cycles should drop it");
    }

    #[test]
    fn stable_across_refreshes_with_no_change() {
        let probe = MockProbe::default();
        let mut d = Discovery::new();
        let entries = vec![PolicyEntry::new("wan0", "eth0")];
        d.refresh(&entries, &probe);
        let a = d.refresh(&entries, &probe);
        let b = d.refresh(&entries, &probe);
        assert_eq!(a.len(), b.len());
        assert_eq!(a[0].id, b[0].id);
        assert_eq!(a[0].class, b[0].class);
    }
}
