//! Token-bucket rate limiter, keyed per named remote (spec §4.1).
//!
//! `acquire()` never blocks indefinitely: a deadline is mandatory, so
//! waiters carry a deadline rather than park forever.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded for {0}")]
    Exceeded(String),
}

struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    fn try_take(&mut self, n: f64) -> bool {
        self.refill();
        if self.tokens >= n {
            self.tokens -= n;
            true
        } else {
            false
        }
    }
}

/// A per-key token bucket rate limiter.
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_per_sec,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Attempt to acquire one token for `key`, retrying at a short interval
    /// until `deadline` elapses. Returns immediately on success.
    pub fn acquire(&self, key: &str, deadline: Duration) -> Result<(), RateLimitError> {
        let start = Instant::now();
        loop {
            {
                let mut buckets = self.buckets.lock().expect("rate limiter lock poisoned");
                let bucket = buckets
                    .entry(key.to_string())
                    .or_insert_with(|| Bucket::new(self.capacity, self.refill_per_sec));
                if bucket.try_take(1.0) {
                    return Ok(());
                }
            }
            if start.elapsed() >= deadline {
                return Err(RateLimitError::Exceeded(key.to_string()));
            }
            std::thread::sleep(Duration::from_millis(10).min(deadline));
        }
    }

    /// Non-blocking variant: fails immediately rather than waiting.
    pub fn try_acquire(&self, key: &str) -> Result<(), RateLimitError> {
        let mut buckets = self.buckets.lock().expect("rate limiter lock poisoned");
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(self.capacity, self.refill_per_sec));
        if bucket.try_take(1.0) {
            Ok(())
        } else {
            Err(RateLimitError::Exceeded(key.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_bucket_then_recovers() {
        let limiter = RateLimiter::new(2.0, 1000.0);
        assert!(limiter.try_acquire("github").is_ok());
        assert!(limiter.try_acquire("github").is_ok());
        assert!(limiter.try_acquire("github").is_err());
        std::thread::sleep(Duration::from_millis(5));
        assert!(limiter.try_acquire("github").is_ok());
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(1.0, 0.0);
        assert!(limiter.try_acquire("a").is_ok());
        assert!(limiter.try_acquire("b").is_ok());
        assert!(limiter.try_acquire("a").is_err());
    }

    #[test]
    fn acquire_respects_deadline() {
        let limiter = RateLimiter::new(1.0, 0.0);
        limiter.try_acquire("k").unwrap();
        let err = limiter.acquire("k", Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, RateLimitError::Exceeded(_)));
    }
}
