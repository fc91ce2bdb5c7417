//! Per-tool token buckets.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;

use super::GuardError;

/// Bucket parameters: at most `burst` calls at once, refilled continuously
/// at `per_second` tokens per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    pub burst: u32,
    pub per_second: f64,
}

impl RateLimit {
    pub const DEFAULT: RateLimit = RateLimit {
        burst: 10,
        per_second: 5.0,
    };

    /// For calls that reach into workloads or change the active context.
    pub const SENSITIVE: RateLimit = RateLimit {
        burst: 5,
        per_second: 2.0,
    };

    pub const fn new(burst: u32, per_second: f64) -> Self {
        Self { burst, per_second }
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(limit: RateLimit, now: Instant) -> Self {
        Self {
            tokens: f64::from(limit.burst),
            last_refill: now,
        }
    }

    fn try_take(&mut self, limit: RateLimit, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let capacity = f64::from(limit.burst);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * limit.per_second).min(capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Token buckets keyed by tool name. Buckets are created full on first use
/// and live for the lifetime of the process.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, tool: &str, limit: RateLimit) -> Result<(), GuardError> {
        self.acquire_at(tool, limit, Instant::now())
    }

    /// Take one token for `tool` as of `now`.
    pub fn acquire_at(&self, tool: &str, limit: RateLimit, now: Instant) -> Result<(), GuardError> {
        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry(tool.to_string())
            .or_insert_with(|| TokenBucket::full(limit, now));

        if bucket.try_take(limit, now) {
            Ok(())
        } else {
            tracing::warn!("Rate limit exceeded for {tool}");
            Err(GuardError::RateLimited(tool.to_string()))
        }
    }
}
