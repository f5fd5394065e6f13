//! # Runtime
//!
//! Work dispatch for managed resources.
//!
//! - `backoff`: exponential backoff and rate limiters
//! - `queue`: the deduplicating work queue
//! - `error_policy`: maps attempt outcomes to requeues
//! - `controller`: worker pool, watch pump and resync

pub mod backoff;
mod controller;
mod error_policy;
mod queue;

pub use backoff::{
    default_managed_rate_limiter, BucketRateLimiter, ExponentialBackoff,
    ItemExponentialRateLimiter, MaxOfRateLimiter, RateLimiter,
};
pub use controller::{reconcile_with_deadline, Controller, ControllerOptions};
pub use error_policy::handle_outcome;
pub use queue::WorkQueue;
