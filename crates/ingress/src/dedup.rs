//! Duplicate suppression (spec §4.4 substep 4, §5: "an LRU keyed by
//! (platform, platform_message_id) with 5-min TTL, sized to 100k entries").

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

pub struct DedupCache {
    entries: DashMap<String, Instant>,
    order: Mutex<VecDeque<String>>,
    ttl: Duration,
    capacity: usize,
}

impl DedupCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            ttl,
            capacity,
        }
    }

    fn key(platform: &str, platform_message_id: &str) -> String {
        format!("{platform}:{platform_message_id}")
    }

    /// Returns `true` if this is a duplicate seen within the TTL window;
    /// otherwise records it and returns `false`.
    pub fn check_and_insert(&self, platform: &str, platform_message_id: &str) -> bool {
        let key = Self::key(platform, platform_message_id);
        let now = Instant::now();

        if let Some(seen_at) = self.entries.get(&key) {
            if now.duration_since(*seen_at) < self.ttl {
                return true;
            }
        }

        self.entries.insert(key.clone(), now);
        let mut order = self.order.lock();
        order.push_back(key);

        if order.len() > self.capacity {
            if let Some(evicted) = order.pop_front() {
                self.entries.remove(&evicted);
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_call_within_ttl_is_duplicate() {
        let cache = DedupCache::new(Duration::from_secs(300), 100_000);
        assert!(!cache.check_and_insert("telegram", "42"));
        assert!(cache.check_and_insert("telegram", "42"));
    }

    #[test]
    fn different_platform_message_ids_are_independent() {
        let cache = DedupCache::new(Duration::from_secs(300), 100_000);
        assert!(!cache.check_and_insert("telegram", "42"));
        assert!(!cache.check_and_insert("telegram", "43"));
    }

    #[test]
    fn capacity_evicts_oldest_entry() {
        let cache = DedupCache::new(Duration::from_secs(300), 1);
        assert!(!cache.check_and_insert("telegram", "1"));
        assert!(!cache.check_and_insert("telegram", "2"));
        assert!(!cache.check_and_insert("telegram", "1"));
    }
}
