//! Event bus (§4.7): single-producer (decision engine) / multi-consumer
//! pub-sub. Non-blocking, bounded per-consumer queues; slow consumers drop
//! the oldest entry and log a WARN once per burst rather than blocking the
//! producer.

use linkwarden_common::DecisionEvent;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::warn;

struct Consumer {
    name: String,
    queue: Mutex<VecDeque<DecisionEvent>>,
    capacity: usize,
    /// Set once a drop has happened, cleared on the next successful publish
    /// with no drop — limits the WARN to one per burst (§4.7).
    warned_this_burst: Mutex<bool>,
}

/// Publish side, held by the decision engine.
pub struct EventBus {
    consumers: Mutex<Vec<Arc<Consumer>>>,
}

/// A consumer's read handle, returned by [`EventBus::subscribe`].
pub struct Subscription {
    consumer: Arc<Consumer>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            consumers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, name: impl Into<String>, capacity: usize) -> Subscription {
        let consumer = Arc::new(Consumer {
            name: name.into(),
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            warned_this_burst: Mutex::new(false),
        });
        self.consumers.lock().unwrap().push(consumer.clone());
        Subscription { consumer }
    }

    /// Publishes to every consumer; never blocks (§5 "Event bus delivers
    /// events in the order the decision engine emits them").
    pub fn publish(&self, event: DecisionEvent) {
        for consumer in self.consumers.lock().unwrap().iter() {
            let mut queue = consumer.queue.lock().unwrap();
            if queue.len() >= consumer.capacity {
                queue.pop_front();
                let mut warned = consumer.warned_this_burst.lock().unwrap();
                if !*warned {
                    warn!(consumer = %consumer.name, "event bus: consumer falling behind, dropping oldest");
                    *warned = true;
                }
            } else {
                *consumer.warned_this_burst.lock().unwrap() = false;
            }
            queue.push_back(event.clone());
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new()
    }
}

impl Subscription {
    /// Drains everything currently queued for this consumer, in publish order.
    pub fn drain(&self) -> Vec<DecisionEvent> {
        let mut queue = self.consumer.queue.lock().unwrap();
        queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.consumer.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkwarden_common::EventType;

    fn event(id: u64) -> DecisionEvent {
        DecisionEvent::new(id, EventType::Switch, None, None, "threshold")
    }

    #[test]
    fn each_subscriber_receives_every_published_event() {
        let bus = EventBus::new();
        let telemetry = bus.subscribe("telemetry", 10);
        let rpc = bus.subscribe("rpc", 10);
        bus.publish(event(1));
        bus.publish(event(2));
        assert_eq!(telemetry.len(), 2);
        assert_eq!(rpc.len(), 2);
    }

    #[test]
    fn slow_consumer_drops_oldest_on_overflow() {
        let bus = EventBus::new();
        let sub = bus.subscribe("slow", 2);
        bus.publish(event(1));
        bus.publish(event(2));
        bus.publish(event(3));
        let drained = sub.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].decision_id, 2);
        assert_eq!(drained[1].decision_id, 3);
    }

    #[test]
    fn drain_empties_the_queue() {
        let bus = EventBus::new();
        let sub = bus.subscribe("once", 10);
        bus.publish(event(1));
        assert!(!sub.is_empty());
        sub.drain();
        assert!(sub.is_empty());
    }

    #[test]
    fn late_subscriber_does_not_see_earlier_events() {
        let bus = EventBus::new();
        bus.publish(event(1));
        let sub = bus.subscribe("late", 10);
        bus.publish(event(2));
        let drained = sub.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].decision_id, 2);
    }
}
