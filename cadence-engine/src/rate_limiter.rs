//! Keyed token-bucket rate limiting for public entry points.
//!
//! Each key (typically a client address) owns a bucket holding up to
//! `burst_size` tokens that refills at `requests_per_second`. A request
//! spends one token; an empty bucket means the request is refused.
//!
//! The number of tracked keys is capped at `max_keys`. When a new key arrives
//! at the cap, buckets that have refilled completely are dropped first since
//! forgetting them changes nothing. If that frees nothing, the least recently
//! used bucket goes.

use std::{
    fmt::Debug,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub trait RateLimiter: Send + Sync + Debug {
    /// Spend one token for `key`. Returns `false` if the caller is over the limit.
    fn check(&self, key: &str) -> bool;
}

/// ```ron
/// rate_limit: (requests_per_second: 0.0833, burst_size: 5, max_keys: 10000),
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    #[serde(default = "default_burst_size")]
    pub burst_size: u32,

    #[serde(default = "default_max_keys")]
    pub max_keys: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst_size: default_burst_size(),
            max_keys: default_max_keys(),
        }
    }
}

/// Five per minute
fn default_requests_per_second() -> f64 {
    5.0 / 60.0
}

const fn default_burst_size() -> u32 {
    5
}

const fn default_max_keys() -> usize {
    10_000
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
    last_used: Instant,
}

impl TokenBucket {
    fn new(refill_rate: f64, burst_size: u32) -> Self {
        let capacity = f64::from(burst_size);
        let now = Instant::now();
        Self {
            tokens: capacity,
            capacity,
            refill_rate,
            last_refill: now,
            last_used: now,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = elapsed.mul_add(self.refill_rate, self.tokens).min(self.capacity);
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        self.refill();
        self.last_used = self.last_refill;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn is_full(&mut self) -> bool {
        self.refill();
        self.tokens >= self.capacity
    }

    fn time_until_available(&mut self) -> Duration {
        self.refill();

        if self.tokens >= 1.0 {
            return Duration::ZERO;
        }
        if self.refill_rate <= 0.0 {
            return Duration::MAX;
        }

        Duration::try_from_secs_f64((1.0 - self.tokens) / self.refill_rate).unwrap_or(Duration::MAX)
    }
}

#[derive(Debug)]
pub struct TokenBucketLimiter {
    config: RateLimitConfig,
    buckets: DashMap<String, Arc<parking_lot::Mutex<TokenBucket>>>,
}

impl TokenBucketLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    fn bucket(&self, key: &str) -> Arc<parking_lot::Mutex<TokenBucket>> {
        if let Some(bucket) = self.buckets.get(key) {
            return bucket.clone();
        }

        if self.buckets.len() >= self.config.max_keys.max(1) {
            self.evict();
        }

        self.buckets
            .entry(key.to_owned())
            .or_insert_with(|| {
                Arc::new(parking_lot::Mutex::new(TokenBucket::new(
                    self.config.requests_per_second,
                    self.config.burst_size,
                )))
            })
            .clone()
    }

    fn evict(&self) {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.lock().is_full());

        if self.buckets.len() >= self.config.max_keys.max(1) {
            let oldest = self
                .buckets
                .iter()
                .min_by_key(|entry| entry.value().lock().last_used)
                .map(|entry| entry.key().clone());

            if let Some(key) = oldest {
                self.buckets.remove(&key);
            }
        }

        debug!(evicted = before.saturating_sub(self.buckets.len()), "Rate limiter key cap reached");
    }

    /// How long `key` must wait for its next token, if it is limited at all
    pub fn retry_after(&self, key: &str) -> Option<Duration> {
        let bucket = self.buckets.get(key)?.clone();
        let wait = bucket.lock().time_until_available();
        (wait > Duration::ZERO).then_some(wait)
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}

impl RateLimiter for TokenBucketLimiter {
    fn check(&self, key: &str) -> bool {
        let bucket = self.bucket(key);
        let allowed = bucket.lock().try_consume();

        if !allowed {
            debug!(%key, "Rate limit exceeded");
        }
        allowed
    }
}
