//! # Constants
//!
//! Shared constants used throughout the provider.
//!
//! These values represent reasonable defaults and can be overridden via
//! environment variables where applicable (see [`crate::config`]).

/// Field manager recorded on every write to the API server
pub const FIELD_MANAGER: &str = "provider-cards";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default number of resources reconciled in parallel
pub const DEFAULT_MAX_CONCURRENT_RECONCILES: usize = 10;

/// Default per-item backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1000;

/// Default per-item backoff maximum value (milliseconds), about 16 minutes
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 1_000_000;

/// Default overall requeue rate (items per second)
pub const DEFAULT_RATE_LIMIT_QPS: f64 = 10.0;

/// Default overall requeue burst
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 100;

/// Default interval between drift checks of an up to date resource (seconds)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 60;

/// Default deadline for one reconciliation attempt (seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 60;

/// Default number of immediate retries of a conflicting status write
pub const DEFAULT_STATUS_UPDATE_RETRIES: u32 = 3;
