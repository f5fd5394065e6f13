//! # Exponential Backoff and Rate Limiting
//!
//! Decides how long a failed item waits before it is reconciled again.
//!
//! The per-item delay doubles on every consecutive failure, starting at a
//! base and capped at a maximum (1s, 2s, 4s, ... up to 1000s by default).
//! A success forgets the item so the next failure starts from the base again.
//! An overall token bucket is combined with the per-item limiter so a burst
//! of failing items cannot hammer the external system.
//!
//! ## Usage
//!
//! ```rust
//! use provider_cards::runtime::backoff::ExponentialBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(8));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(8));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(8));
//! ```

use crate::constants::DEFAULT_RATE_LIMIT_QPS;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Exponential backoff calculator
///
/// Each call to [`ExponentialBackoff::next_backoff`] returns the current delay
/// and doubles it for the next call, never exceeding the maximum.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    /// Consecutive failures seen since the last reset
    failures: u32,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: 0,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let factor = 2u32.checked_pow(self.failures).unwrap_or(u32::MAX);
        self.failures = self.failures.saturating_add(1);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

/// Computes requeue delays for queue items
pub trait RateLimiter<T>: Send + Sync {
    /// Delay before `item` may be processed again. Counts as a failure.
    fn when(&self, item: &T) -> Duration;

    /// Stop tracking `item`, resetting its backoff
    fn forget(&self, item: &T);

    /// Failures recorded for `item` since it was last forgotten
    fn num_requeues(&self, item: &T) -> u32;
}

/// Per-item exponential backoff
#[derive(Debug)]
pub struct ItemExponentialRateLimiter<T> {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<T, ExponentialBackoff>>,
}

impl<T: Eq + Hash + Clone> ItemExponentialRateLimiter<T> {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Eq + Hash + Clone + Send> RateLimiter<T> for ItemExponentialRateLimiter<T> {
    fn when(&self, item: &T) -> Duration {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        failures
            .entry(item.clone())
            .or_insert_with(|| ExponentialBackoff::new(self.base, self.max))
            .next_backoff()
    }

    fn forget(&self, item: &T) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(item);
    }

    fn num_requeues(&self, item: &T) -> u32 {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(item)
            .map_or(0, ExponentialBackoff::failures)
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Overall token bucket shared by all items
#[derive(Debug)]
pub struct BucketRateLimiter {
    qps: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl BucketRateLimiter {
    /// A `qps` that is not a positive finite rate falls back to the default
    #[must_use]
    pub fn new(qps: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        let qps = if qps.is_finite() && qps > 0.0 {
            qps
        } else {
            DEFAULT_RATE_LIMIT_QPS
        };
        Self {
            qps,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }
}

impl<T> RateLimiter<T> for BucketRateLimiter {
    fn when(&self, _item: &T) -> Duration {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.qps).min(self.burst);
        bucket.last_refill = now;

        // Reserve a token; a negative balance is paid back over time.
        bucket.tokens -= 1.0;
        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(-bucket.tokens / self.qps).unwrap_or(Duration::MAX)
        }
    }

    fn forget(&self, _item: &T) {}

    fn num_requeues(&self, _item: &T) -> u32 {
        0
    }
}

/// Waits as long as the slowest of its limiters
pub struct MaxOfRateLimiter<T> {
    limiters: Vec<Box<dyn RateLimiter<T>>>,
}

impl<T> std::fmt::Debug for MaxOfRateLimiter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaxOfRateLimiter")
            .field("limiters", &self.limiters.len())
            .finish()
    }
}

impl<T> MaxOfRateLimiter<T> {
    #[must_use]
    pub fn new(limiters: Vec<Box<dyn RateLimiter<T>>>) -> Self {
        Self { limiters }
    }
}

impl<T> RateLimiter<T> for MaxOfRateLimiter<T> {
    fn when(&self, item: &T) -> Duration {
        self.limiters
            .iter()
            .map(|limiter| limiter.when(item))
            .max()
            .unwrap_or(Duration::ZERO)
    }

    fn forget(&self, item: &T) {
        for limiter in &self.limiters {
            limiter.forget(item);
        }
    }

    fn num_requeues(&self, item: &T) -> u32 {
        self.limiters
            .iter()
            .map(|limiter| limiter.num_requeues(item))
            .max()
            .unwrap_or(0)
    }
}

/// Per-item exponential backoff combined with an overall token bucket
#[must_use]
pub fn default_managed_rate_limiter<T>(
    base: Duration,
    max: Duration,
    qps: f64,
    burst: u32,
) -> MaxOfRateLimiter<T>
where
    T: Eq + Hash + Clone + Send + 'static,
{
    MaxOfRateLimiter::new(vec![
        Box::new(ItemExponentialRateLimiter::new(base, max)),
        Box::new(BucketRateLimiter::new(qps, burst)),
    ])
}
