//! IP/user blocklist (spec §4.4 substep 1), with automatic elevation from
//! the rate limiter (substep 3: five rate-limit events in an hour promotes
//! the source to the blocklist).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;

pub struct Blocklist {
    blocked: DashMap<String, ()>,
    rate_limit_events: DashMap<String, VecDeque<Instant>>,
    elevation_threshold: usize,
    elevation_window: Duration,
}

impl Blocklist {
    pub fn new(elevation_threshold: usize, elevation_window: Duration) -> Self {
        Self {
            blocked: DashMap::new(),
            rate_limit_events: DashMap::new(),
            elevation_threshold,
            elevation_window,
        }
    }

    pub fn is_blocked(&self, key: &str) -> bool {
        self.blocked.contains_key(key)
    }

    pub fn block(&self, key: &str) {
        self.blocked.insert(key.to_string(), ());
    }

    /// Records a rate-limit event for `key`; if it crosses the elevation
    /// threshold within the window, blocks the key and returns `true`.
    pub fn record_rate_limit_event(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entry = self.rate_limit_events.entry(key.to_string()).or_default();

        while let Some(&front) = entry.front() {
            if now.duration_since(front) > self.elevation_window {
                entry.pop_front();
            } else {
                break;
            }
        }

        entry.push_back(now);

        if entry.len() >= self.elevation_threshold {
            drop(entry);
            self.block(key);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_events_elevate_to_blocklist() {
        let blocklist = Blocklist::new(5, Duration::from_secs(3600));
        for _ in 0..4 {
            assert!(!blocklist.record_rate_limit_event("1.2.3.4"));
        }
        assert!(blocklist.record_rate_limit_event("1.2.3.4"));
        assert!(blocklist.is_blocked("1.2.3.4"));
    }
}
