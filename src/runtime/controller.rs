//! # Controller
//!
//! Runs a [`ManagedReconciler`] against a store:
//!
//! - a watch pump turning change notifications into queue adds
//! - a resync ticker queueing every object periodically
//! - a fixed pool of workers, each looping get, reconcile, done
//!
//! Each attempt runs in its own task under a deadline. A timed out attempt is
//! aborted; a panicking one is caught. Both count as failures and back off.

use super::error_policy;
use super::queue::WorkQueue;
use crate::managed::{ManagedReconciler, ManagedResource, ReconcileError, RequeueDecision};
use crate::observability::metrics;
use crate::store::ResourceStore;
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Number of workers; different resources reconcile in parallel
    pub workers: usize,
    /// Deadline for a single reconciliation attempt
    pub reconcile_timeout: Duration,
    /// How often every object is queued regardless of events
    pub resync_interval: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        use crate::constants::{
            DEFAULT_MAX_CONCURRENT_RECONCILES, DEFAULT_RECONCILE_TIMEOUT_SECS,
            DEFAULT_RESYNC_INTERVAL_SECS,
        };
        Self {
            workers: DEFAULT_MAX_CONCURRENT_RECONCILES,
            reconcile_timeout: Duration::from_secs(DEFAULT_RECONCILE_TIMEOUT_SECS),
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
        }
    }
}

pub struct Controller<K: ManagedResource> {
    reconciler: Arc<ManagedReconciler<K>>,
    store: Arc<dyn ResourceStore<K>>,
    queue: Arc<WorkQueue<String>>,
    options: ControllerOptions,
}

impl<K: ManagedResource> std::fmt::Debug for Controller<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<K: ManagedResource> Controller<K> {
    #[must_use]
    pub fn new(
        reconciler: ManagedReconciler<K>,
        store: Arc<dyn ResourceStore<K>>,
        queue: Arc<WorkQueue<String>>,
        options: ControllerOptions,
    ) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            store,
            queue,
            options,
        }
    }

    /// The queue feeding the workers
    #[must_use]
    pub fn queue(&self) -> Arc<WorkQueue<String>> {
        Arc::clone(&self.queue)
    }

    /// Run until `shutdown` resolves, then let in-flight attempts finish
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send) {
        let kind = K::kind(&()).to_string();
        info!(
            kind = %kind,
            workers = self.options.workers,
            "starting controller"
        );

        enqueue_all(self.store.as_ref(), &self.queue).await;

        let pump = spawn_watch_pump(Arc::clone(&self.store), Arc::clone(&self.queue));
        let resync = spawn_resync(
            Arc::clone(&self.store),
            Arc::clone(&self.queue),
            self.options.resync_interval,
        );
        let workers: Vec<JoinHandle<()>> = (0..self.options.workers.max(1))
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    Arc::clone(&self.reconciler),
                    Arc::clone(&self.queue),
                    self.options.reconcile_timeout,
                ))
            })
            .collect();

        shutdown.await;
        info!(kind = %kind, "shutting down controller");
        self.queue.shut_down();
        pump.abort();
        resync.abort();
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "worker exited abnormally");
            }
        }
        info!(kind = %kind, "controller stopped");
    }
}

async fn enqueue_all<K: ManagedResource>(
    store: &dyn ResourceStore<K>,
    queue: &WorkQueue<String>,
) {
    match store.list_names().await {
        Ok(names) => {
            debug!(count = names.len(), "queueing all objects");
            for name in names {
                queue.add(name);
            }
            metrics::set_queue_depth(queue.len());
        }
        Err(e) => warn!(error = %e, "cannot list objects, will retry at next resync"),
    }
}

fn spawn_watch_pump<K: ManagedResource>(
    store: Arc<dyn ResourceStore<K>>,
    queue: Arc<WorkQueue<String>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = store.watch();
        while let Some(event) = events.next().await {
            match event {
                Ok(name) => {
                    queue.add(name);
                    metrics::set_queue_depth(queue.len());
                }
                // The resync ticker picks up anything a lagging watch missed.
                Err(e) => warn!(error = %e, "watch error"),
            }
        }
        warn!("watch stream ended");
    })
}

fn spawn_resync<K: ManagedResource>(
    store: Arc<dyn ResourceStore<K>>,
    queue: Arc<WorkQueue<String>>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; startup already queued everything.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            enqueue_all(store.as_ref(), &queue).await;
        }
    })
}

async fn worker<K: ManagedResource>(
    id: usize,
    reconciler: Arc<ManagedReconciler<K>>,
    queue: Arc<WorkQueue<String>>,
    timeout: Duration,
) {
    debug!(worker = id, "worker started");
    while let Some(name) = queue.get().await {
        metrics::set_queue_depth(queue.len());
        let outcome = reconcile_with_deadline(Arc::clone(&reconciler), &name, timeout).await;
        error_policy::handle_outcome(&queue, &name, &outcome);
        queue.done(&name);
    }
    debug!(worker = id, "worker stopped");
}

/// One attempt in its own task, bounded by `timeout`
pub async fn reconcile_with_deadline<K: ManagedResource>(
    reconciler: Arc<ManagedReconciler<K>>,
    name: &str,
    timeout: Duration,
) -> Result<RequeueDecision, ReconcileError> {
    let start = Instant::now();
    metrics::increment_reconciliations();

    let owned = name.to_string();
    let mut attempt = tokio::spawn(async move { reconciler.reconcile(&owned).await });
    let outcome = match tokio::time::timeout(timeout, &mut attempt).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_error)) => Err(ReconcileError::Aborted(join_error.to_string())),
        Err(_) => {
            attempt.abort();
            // Wait for the task to unwind so it releases the reconciler.
            let _ = attempt.await;
            Err(ReconcileError::Timeout(timeout))
        }
    };

    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
    outcome
}
