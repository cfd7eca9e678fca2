//! Event Bus / Fan-out (spec §4.7): a process-local publish/subscribe over
//! typed channels. Topics are `session:<id>`, `raid:<id>`, and `agent:<id>`.
//!
//! Each subscription gets its own bounded `mpsc` channel drained by a
//! dedicated task, not a single loop iterating every subscriber — this is
//! what gives the no-head-of-line-blocking property (spec §8): a slow
//! subscriber only ever backs up its own queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use raidcore_core::BusEvent;
use tokio::sync::mpsc;

const DEFAULT_QUEUE_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for SubscriptionId {
    fn from(raw: u64) -> Self {
        SubscriptionId(raw)
    }
}

struct Subscription {
    topic: String,
    sender: mpsc::Sender<BusEvent>,
}

/// A live connection's handle to drain delivered events. Constructed by
/// [`EventBus::subscribe`]; the caller owns `receiver` and reads from it
/// (e.g. to forward onto a WebSocket).
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    pub receiver: mpsc::Receiver<BusEvent>,
}

pub struct EventBus {
    subscriptions: DashMap<SubscriptionId, Subscription>,
    by_topic: DashMap<String, Vec<SubscriptionId>>,
    by_connection: DashMap<String, Vec<SubscriptionId>>,
    next_id: AtomicU64,
    dropped_total: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: DashMap::new(),
            by_topic: DashMap::new(),
            by_connection: DashMap::new(),
            next_id: AtomicU64::new(1),
            dropped_total: AtomicU64::new(0),
        }
    }

    /// Registers a subscriber on `topic` for connection `conn`. Callers are
    /// expected to have authenticated `conn` before calling this (spec §4.7:
    /// "a connection must present a token that maps to an internal_id
    /// before any subscribe is accepted").
    pub fn subscribe(&self, conn: &str, topic: &str) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(DEFAULT_QUEUE_DEPTH);

        self.subscriptions.insert(
            id,
            Subscription {
                topic: topic.to_string(),
                sender,
            },
        );
        self.by_topic.entry(topic.to_string()).or_default().push(id);
        self.by_connection.entry(conn.to_string()).or_default().push(id);

        SubscriptionHandle { id, receiver }
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        if let Some((_, sub)) = self.subscriptions.remove(&id) {
            if let Some(mut ids) = self.by_topic.get_mut(&sub.topic) {
                ids.retain(|sid| *sid != id);
            }
        }
        for mut entry in self.by_connection.iter_mut() {
            entry.value_mut().retain(|sid| *sid != id);
        }
    }

    pub fn close(&self, conn: &str) {
        if let Some((_, ids)) = self.by_connection.remove(conn) {
            for id in ids {
                self.unsubscribe(id);
            }
        }
    }

    /// Enqueues `event` into every active subscription on `topic`. A full
    /// subscription queue drops only that subscription's event and
    /// increments `delivery_dropped`; other subscriptions are unaffected
    /// (spec §4.7, §8 "bus no-head-of-line").
    pub fn publish(&self, topic: &str, event: BusEvent) {
        let Some(ids) = self.by_topic.get(topic) else { return };

        for id in ids.iter() {
            if let Some(sub) = self.subscriptions.get(id) {
                match sub.sender.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        self.dropped_total.fetch_add(1, Ordering::Relaxed);
                        metrics::counter!("raidcore_bus_delivery_dropped_total", "topic" => topic.to_string()).increment(1);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {}
                }
            }
        }
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raidcore_core::BusEvent;

    #[tokio::test]
    async fn publish_delivers_to_all_subscribers_on_topic() {
        let bus = EventBus::new();
        let mut h1 = bus.subscribe("conn-1", "session:abc");
        let mut h2 = bus.subscribe("conn-2", "session:abc");

        bus.publish("session:abc", BusEvent::new("session.message", "session:abc", serde_json::json!({"ok": true})));

        assert!(h1.receiver.try_recv().is_ok());
        assert!(h2.receiver.try_recv().is_ok());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let handle = bus.subscribe("conn-1", "session:abc");
        bus.unsubscribe(handle.id);

        bus.publish("session:abc", BusEvent::new("session.message", "session:abc", serde_json::json!({})));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn close_drops_all_subscriptions_for_a_connection() {
        let bus = EventBus::new();
        bus.subscribe("conn-1", "session:a");
        bus.subscribe("conn-1", "raid:b");
        assert_eq!(bus.subscriber_count(), 2);

        bus.close("conn-1");
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn full_queue_drops_only_that_subscription() {
        let bus = EventBus::new();
        let mut slow = bus.subscribe("slow-conn", "session:abc");
        let mut fast = bus.subscribe("fast-conn", "session:abc");

        for _ in 0..300 {
            bus.publish("session:abc", BusEvent::new("session.message", "session:abc", serde_json::json!({})));
        }

        assert!(bus.dropped_total() > 0);
        assert!(fast.receiver.try_recv().is_ok());
        assert!(slow.receiver.try_recv().is_ok());
    }
}
