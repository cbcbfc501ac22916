//! Telemetry (§5 "Telemetry ring"): per-member bounded sample history plus
//! a global bounded event history, decimated when the configured memory
//! budget is exceeded rather than grown without bound.

use linkwarden_common::{DecisionEvent, MemberId, MetricsSample};
use std::collections::{HashMap, VecDeque};

/// Rough per-sample footprint used for the `max_ram_mb` budget check. Not
/// exact — the point is to decimate before the ring grows unbounded, not to
/// account bytes precisely.
const APPROX_BYTES_PER_SAMPLE: usize = 256;
const APPROX_BYTES_PER_EVENT: usize = 512;

struct MemberRing {
    samples: VecDeque<MetricsSample>,
}

/// Bounded telemetry store for one core loop instance.
pub struct Telemetry {
    members: HashMap<MemberId, MemberRing>,
    events: VecDeque<DecisionEvent>,
    max_bytes: usize,
    max_events: usize,
}

impl Telemetry {
    pub fn new(max_ram_mb: u64) -> Self {
        Telemetry {
            members: HashMap::new(),
            events: VecDeque::new(),
            max_bytes: (max_ram_mb as usize) * 1024 * 1024,
            max_events: 4096,
        }
    }

    pub fn record_sample(&mut self, sample: MetricsSample) {
        let ring = self
            .members
            .entry(sample.member.clone())
            .or_insert_with(|| MemberRing {
                samples: VecDeque::new(),
            });
        ring.samples.push_back(sample);
        self.enforce_budget();
    }

    pub fn record_event(&mut self, event: DecisionEvent) {
        self.events.push_back(event);
        if self.events.len() > self.max_events {
            self.events.pop_front();
        }
        self.enforce_budget();
    }

    /// Samples for `member` since `since_s` seconds ago (relative to the
    /// newest sample's timestamp), newest last.
    pub fn history(&self, member: &MemberId, since_s: Option<u64>) -> Vec<MetricsSample> {
        let Some(ring) = self.members.get(member) else {
            return Vec::new();
        };
        match since_s {
            None => ring.samples.iter().cloned().collect(),
            Some(since_s) => {
                let Some(newest_ts) = ring.samples.back().map(|s| s.ts_ms) else {
                    return Vec::new();
                };
                let cutoff = newest_ts - since_s as i64 * 1000;
                ring.samples
                    .iter()
                    .filter(|s| s.ts_ms >= cutoff)
                    .cloned()
                    .collect()
            }
        }
    }

    pub fn latest(&self, member: &MemberId) -> Option<&MetricsSample> {
        self.members.get(member)?.samples.back()
    }

    pub fn recent_events(&self, limit: usize) -> Vec<DecisionEvent> {
        self.events.iter().rev().take(limit).rev().cloned().collect()
    }

    fn estimated_bytes(&self) -> usize {
        let sample_count: usize = self.members.values().map(|r| r.samples.len()).sum();
        sample_count * APPROX_BYTES_PER_SAMPLE + self.events.len() * APPROX_BYTES_PER_EVENT
    }

    /// Halves every member ring (keeping the newest half) until under
    /// budget, per §5's decimate-by-2 policy.
    fn enforce_budget(&mut self) {
        while self.estimated_bytes() > self.max_bytes {
            let mut any_decimated = false;
            for ring in self.members.values_mut() {
                if ring.samples.len() > 1 {
                    let keep = ring.samples.len() / 2;
                    let drop = ring.samples.len() - keep;
                    for _ in 0..drop {
                        ring.samples.pop_front();
                    }
                    any_decimated = true;
                }
            }
            if !any_decimated {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkwarden_common::EventType;

    fn sample(member: &str, ts_ms: i64) -> MetricsSample {
        MetricsSample::new(MemberId::from(member), ts_ms)
    }

    #[test]
    fn history_returns_all_samples_without_since_filter() {
        let mut t = Telemetry::new(16);
        t.record_sample(sample("a", 0));
        t.record_sample(sample("a", 1000));
        assert_eq!(t.history(&MemberId::from("a"), None).len(), 2);
    }

    #[test]
    fn since_filter_excludes_older_samples() {
        let mut t = Telemetry::new(16);
        t.record_sample(sample("a", 0));
        t.record_sample(sample("a", 60_000));
        let recent = t.history(&MemberId::from("a"), Some(10));
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].ts_ms, 60_000);
    }

    #[test]
    fn latest_returns_the_newest_sample() {
        let mut t = Telemetry::new(16);
        t.record_sample(sample("a", 0));
        t.record_sample(sample("a", 5000));
        assert_eq!(t.latest(&MemberId::from("a")).unwrap().ts_ms, 5000);
    }

    #[test]
    fn recent_events_preserves_publish_order() {
        let mut t = Telemetry::new(16);
        for i in 1..=5 {
            t.record_event(DecisionEvent::new(i, EventType::Switch, None, None, "threshold"));
        }
        let recent = t.recent_events(3);
        assert_eq!(
            recent.iter().map(|e| e.decision_id).collect::<Vec<_>>(),
            vec![3, 4, 5]
        );
    }

    #[test]
    fn budget_overflow_decimates_rather_than_grows_unbounded() {
        // A tiny budget forces decimation almost immediately.
        let mut t = Telemetry::new(0);
        for i in 0..1000 {
            t.record_sample(sample("a", i));
        }
        let total: usize = t.members.values().map(|r| r.samples.len()).sum();
        assert!(total < 1000, "ring should have been decimated under a 0 MB budget");
    }
}
