//! # Provider Configuration
//!
//! Process-level settings loaded from environment variables.

use crate::cards::DealerConfig;
use crate::constants::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MAX_MS, DEFAULT_MAX_CONCURRENT_RECONCILES,
    DEFAULT_METRICS_PORT, DEFAULT_RATE_LIMIT_BURST, DEFAULT_RATE_LIMIT_QPS,
    DEFAULT_RECONCILE_TIMEOUT_SECS, DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_STATUS_UPDATE_RETRIES,
};
use crate::managed::ReconcilerOptions;
use crate::observability::LogFormat;
use crate::runtime::ControllerOptions;
use std::time::Duration;
use tracing::warn;

/// Provider configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Maximum concurrent reconciliations
    pub max_concurrent_reconciles: usize,
    /// Per-item backoff starting value (milliseconds)
    pub backoff_base_ms: u64,
    /// Per-item backoff maximum value (milliseconds)
    pub backoff_max_ms: u64,
    /// Overall requeue rate (items per second)
    pub rate_limit_qps: f64,
    pub rate_limit_burst: u32,
    /// How often an up to date resource is checked for drift (seconds)
    pub resync_interval_secs: u64,
    /// Deadline for one reconciliation attempt (seconds)
    pub reconcile_timeout_secs: u64,
    /// Immediate retries of a conflicting status write
    pub status_update_retries: u32,
    pub metrics_port: u16,
    /// Seed for the card dealer; unset seeds from OS entropy
    pub dealer_seed: Option<u64>,
    pub log_format: LogFormat,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: DEFAULT_MAX_CONCURRENT_RECONCILES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            rate_limit_qps: DEFAULT_RATE_LIMIT_QPS,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            reconcile_timeout_secs: DEFAULT_RECONCILE_TIMEOUT_SECS,
            status_update_retries: DEFAULT_STATUS_UPDATE_RETRIES,
            metrics_port: DEFAULT_METRICS_PORT,
            dealer_seed: None,
            log_format: LogFormat::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup
    ///
    /// Unparsable values fall back to defaults, then out of range values are
    /// clamped by [`ControllerConfig::validated`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| lookup(key);
        let config = Self {
            max_concurrent_reconciles: parse_or(
                var("MAX_CONCURRENT_RECONCILES"),
                defaults.max_concurrent_reconciles,
            ),
            backoff_base_ms: parse_or(var("BACKOFF_BASE_MS"), defaults.backoff_base_ms),
            backoff_max_ms: parse_or(var("BACKOFF_MAX_MS"), defaults.backoff_max_ms),
            rate_limit_qps: parse_or(var("RATE_LIMIT_QPS"), defaults.rate_limit_qps),
            rate_limit_burst: parse_or(var("RATE_LIMIT_BURST"), defaults.rate_limit_burst),
            resync_interval_secs: parse_or(
                var("RESYNC_INTERVAL_SECS"),
                defaults.resync_interval_secs,
            ),
            reconcile_timeout_secs: parse_or(
                var("RECONCILE_TIMEOUT_SECS"),
                defaults.reconcile_timeout_secs,
            ),
            status_update_retries: parse_or(
                var("STATUS_UPDATE_RETRIES"),
                defaults.status_update_retries,
            ),
            metrics_port: parse_or(var("METRICS_PORT"), defaults.metrics_port),
            dealer_seed: var("DEALER_SEED").and_then(|v| v.parse().ok()),
            log_format: parse_or(var("LOG_FORMAT"), defaults.log_format),
        };
        config.validated()
    }

    /// Clamp values the runtime cannot use: zero intervals and rates that
    /// are not positive and finite
    #[must_use]
    pub fn validated(mut self) -> Self {
        if !(self.rate_limit_qps.is_finite() && self.rate_limit_qps > 0.0) {
            warn!(
                value = self.rate_limit_qps,
                default = DEFAULT_RATE_LIMIT_QPS,
                "RATE_LIMIT_QPS must be a positive number, using default"
            );
            self.rate_limit_qps = DEFAULT_RATE_LIMIT_QPS;
        }
        self.max_concurrent_reconciles = self.max_concurrent_reconciles.max(1);
        self.rate_limit_burst = self.rate_limit_burst.max(1);
        self.backoff_base_ms = self.backoff_base_ms.max(1);
        self.backoff_max_ms = self.backoff_max_ms.max(self.backoff_base_ms);
        self.resync_interval_secs = self.resync_interval_secs.max(1);
        self.reconcile_timeout_secs = self.reconcile_timeout_secs.max(1);
        self
    }

    #[must_use]
    pub fn backoff_base_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    #[must_use]
    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    #[must_use]
    pub fn reconciler_options(&self) -> ReconcilerOptions {
        ReconcilerOptions {
            poll_interval: Duration::from_secs(self.resync_interval_secs),
            status_update_retries: self.status_update_retries,
        }
    }

    #[must_use]
    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            workers: self.max_concurrent_reconciles,
            reconcile_timeout: Duration::from_secs(self.reconcile_timeout_secs),
            resync_interval: Duration::from_secs(self.resync_interval_secs),
        }
    }

    #[must_use]
    pub fn dealer_config(&self) -> DealerConfig {
        DealerConfig {
            seed: self.dealer_seed,
        }
    }
}

/// Parse a value or return the default
fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
