//! Token bucket rate limiting keyed by `(source_ip, user_id)` (spec §4.4
//! substep 3, §5 resource model: "sharded by (source_ip, user_id); fine-
//! grained locks or lock-free counters").

use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    buckets: DashMap<String, Mutex<Bucket>>,
    capacity: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity,
            window,
        }
    }

    fn key(source_ip: &str, user_id: &str) -> String {
        format!("{source_ip}:{user_id}")
    }

    fn refill_rate_per_sec(&self) -> f64 {
        self.capacity as f64 / self.window.as_secs_f64()
    }

    /// Returns `Ok(())` if a token was available, or `Err(retry_after_ms)`
    /// if the bucket is exhausted.
    pub fn check(&self, source_ip: &str, user_id: &str) -> Result<(), u64> {
        let key = Self::key(source_ip, user_id);
        let entry = self
            .buckets
            .entry(key)
            .or_insert_with(|| Mutex::new(Bucket {
                tokens: self.capacity as f64,
                last_refill: Instant::now(),
            }));

        let mut bucket = entry.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate_per_sec()).min(self.capacity as f64);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - bucket.tokens;
            let wait_secs = deficit / self.refill_rate_per_sec();
            Err((wait_secs * 1000.0).ceil() as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_then_recovers() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check("1.1.1.1", "u1").is_ok());
        assert!(limiter.check("1.1.1.1", "u1").is_ok());
        assert!(limiter.check("1.1.1.1", "u1").is_err());
    }

    #[test]
    fn buckets_are_independent_per_key() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("1.1.1.1", "u1").is_ok());
        assert!(limiter.check("1.1.1.1", "u2").is_ok());
    }
}
