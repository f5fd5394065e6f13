//! # Error Policy
//!
//! Turns the outcome of one reconciliation attempt into the item's next visit.
//!
//! - Success resets the item's backoff and follows the requeue decision.
//! - Failure requeues through the rate limiter so consecutive failures back
//!   off exponentially.

use super::queue::WorkQueue;
use crate::managed::{ReconcileError, RequeueDecision};
use crate::observability::metrics;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Schedule `name`'s next reconciliation based on `outcome`
pub fn handle_outcome(
    queue: &Arc<WorkQueue<String>>,
    name: &str,
    outcome: &Result<RequeueDecision, ReconcileError>,
) {
    match outcome {
        Ok(RequeueDecision::Immediate) => {
            queue.forget(&name.to_string());
            debug!(resource.name = name, "requeueing immediately");
            metrics::increment_requeues_total("immediate");
            queue.add(name.to_string());
        }
        Ok(RequeueDecision::After(delay)) => {
            queue.forget(&name.to_string());
            debug!(resource.name = name, delay = ?delay, "requeueing after poll interval");
            metrics::increment_requeues_total("poll");
            queue.add_after(name.to_string(), *delay);
        }
        Ok(RequeueDecision::None) => {
            queue.forget(&name.to_string());
            debug!(resource.name = name, "reconciliation finished, not requeueing");
        }
        Err(err) => handle_reconciliation_error(queue, name, err),
    }
}

fn handle_reconciliation_error(queue: &Arc<WorkQueue<String>>, name: &str, err: &ReconcileError) {
    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.reconciliation_error",
        resource.name = name,
        stage = err.stage(),
        reason = err.reason(),
    );
    let _error_guard = error_span.enter();

    match err {
        ReconcileError::Aborted(_) => {
            error!(error = %err, "reconciliation aborted; this is a bug, the item will be retried");
        }
        _ => warn!(error = %err, "reconciliation failed"),
    }
    metrics::increment_reconciliation_errors(err.stage());

    let delay = queue.add_rate_limited(name.to_string());
    let failures = queue.num_requeues(&name.to_string());
    let next_attempt = chrono::Utc::now()
        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
    debug!(
        delay = ?delay,
        failures,
        next_attempt = %next_attempt.to_rfc3339(),
        "retrying with exponential backoff"
    );
    metrics::increment_requeues_total("error-backoff");
}
