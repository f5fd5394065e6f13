//! # Metrics
//!
//! Prometheus metrics for monitoring the provider.
//!
//! ## Metrics Exposed
//!
//! - `provider_cards_reconciliations_total` - Total number of reconciliation attempts
//! - `provider_cards_reconciliation_errors_total` - Failed attempts by failing stage
//! - `provider_cards_reconciliation_duration_seconds` - Duration of reconciliation attempts
//! - `provider_cards_external_operations_total` - Calls to the external system by operation
//! - `provider_cards_requeues_total` - Requeues by reason
//! - `provider_cards_status_conflicts_total` - Status writes rejected as stale
//! - `provider_cards_queue_depth` - Items waiting in the work queue

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "provider_cards_reconciliations_total",
        "Total number of reconciliation attempts",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "provider_cards_reconciliation_errors_total",
            "Total number of failed reconciliation attempts by failing stage",
        ),
        &["stage"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "provider_cards_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 60.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static EXTERNAL_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "provider_cards_external_operations_total",
            "Total number of external system calls by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create EXTERNAL_OPERATIONS_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "provider_cards_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static STATUS_CONFLICTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "provider_cards_status_conflicts_total",
        "Total number of status writes rejected because the object changed",
    )
    .expect("Failed to create STATUS_CONFLICTS_TOTAL metric - this should never happen")
});

static QUEUE_DEPTH: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "provider_cards_queue_depth",
        "Current number of items waiting in the work queue",
    )
    .expect("Failed to create QUEUE_DEPTH metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Registration only fails when called twice"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(EXTERNAL_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STATUS_CONFLICTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_DEPTH.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(stage: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[stage]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_external_operations(operation: &str) {
    EXTERNAL_OPERATIONS_TOTAL
        .with_label_values(&[operation])
        .inc();
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_status_conflicts() {
    STATUS_CONFLICTS_TOTAL.inc();
}

pub fn set_queue_depth(depth: usize) {
    QUEUE_DEPTH.set(i64::try_from(depth).unwrap_or(i64::MAX));
}
