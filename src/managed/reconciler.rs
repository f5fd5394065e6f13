//! # Managed Reconciler
//!
//! One reconciliation attempt for one managed resource:
//!
//! 1. Load the latest object from the store
//! 2. Connect: resolve config and credentials, build an external client
//! 3. Observe the external resource
//! 4. Branch: Delete (object being deleted), Create (absent), Update (drifted)
//!    or nothing (up to date)
//! 5. Persist status with optimistic concurrency
//! 6. Return the requeue decision
//!
//! Create and Update decisions come only from the spec and the live
//! observation, never from previously stored status.

use super::{
    add_finalizer, is_being_deleted, remove_finalizer, ConnectionDetails, Connector,
    Initializer, ManagedResource, ReconcileError,
};
use crate::constants;
use crate::crd::{Condition, ConditionType, DeletionPolicy};
use crate::observability::metrics;
use crate::store::{ResourceStore, StoreError};
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

/// What the queue should do with the resource after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueDecision {
    /// Reconcile again as soon as a worker is free
    Immediate,
    /// Reconcile again after the given delay
    After(Duration),
    /// Nothing left to do until the object changes
    None,
}

#[derive(Debug, Clone)]
pub struct ReconcilerOptions {
    /// How long to wait before re-observing an up-to-date resource
    pub poll_interval: Duration,
    /// How many times a conflicting status write is re-read and retried
    pub status_update_retries: u32,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(constants::DEFAULT_RESYNC_INTERVAL_SECS),
            status_update_retries: constants::DEFAULT_STATUS_UPDATE_RETRIES,
        }
    }
}

/// Drives the observed state of one kind of managed resource toward its spec
pub struct ManagedReconciler<K: ManagedResource> {
    store: Arc<dyn ResourceStore<K>>,
    connector: Arc<dyn Connector<K>>,
    initializers: Vec<Arc<dyn Initializer<K>>>,
    options: ReconcilerOptions,
}

impl<K: ManagedResource> std::fmt::Debug for ManagedReconciler<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedReconciler")
            .field("kind", &K::kind(&()))
            .field("initializers", &self.initializers.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<K: ManagedResource> ManagedReconciler<K> {
    pub fn new(store: Arc<dyn ResourceStore<K>>, connector: Arc<dyn Connector<K>>) -> Self {
        Self {
            store,
            connector,
            initializers: Vec::new(),
            options: ReconcilerOptions::default(),
        }
    }

    #[must_use]
    pub fn with_initializer(mut self, initializer: impl Initializer<K> + 'static) -> Self {
        self.initializers.push(Arc::new(initializer));
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: ReconcilerOptions) -> Self {
        self.options = options;
        self
    }

    /// Reconcile the named resource once
    ///
    /// Errors have already been recorded on the `Synced` condition when this
    /// returns; the caller only decides when to retry.
    pub async fn reconcile(&self, name: &str) -> Result<RequeueDecision, ReconcileError> {
        let kind = K::kind(&());
        let span = info_span!("reconcile", resource.name = name, resource.kind = %kind);
        self.reconcile_inner(name).instrument(span).await
    }

    async fn reconcile_inner(&self, name: &str) -> Result<RequeueDecision, ReconcileError> {
        let mut mg = match self.store.get(name).await {
            Ok(mg) => mg,
            Err(e) if e.is_not_found() => {
                debug!("managed resource no longer exists");
                return Ok(RequeueDecision::None);
            }
            Err(e) => return Err(e.into()),
        };

        let external = match self.connector.connect(&mg).await {
            Ok(external) => external,
            Err(e) => return self.fail(mg, ReconcileError::Connect(e), None).await,
        };

        metrics::increment_external_operations("observe");
        let observation = match external.observe(&mut mg).await {
            Ok(observation) => observation,
            Err(e) => return self.fail(mg, ReconcileError::Observe(e), None).await,
        };
        debug!(
            exists = observation.resource_exists,
            up_to_date = observation.resource_up_to_date,
            "observed external resource"
        );

        if is_being_deleted(&mg) {
            if observation.resource_exists && mg.deletion_policy() == DeletionPolicy::Delete {
                mg.set_condition(Condition::deleting());
                metrics::increment_external_operations("delete");
                if let Err(e) = external.delete(&mut mg).await {
                    return self
                        .fail(mg, ReconcileError::Delete(e), Some(Condition::deleting()))
                        .await;
                }
                info!("deleted external resource");
            } else if observation.resource_exists {
                info!("orphaning external resource");
            }

            if remove_finalizer(&mut mg) {
                self.store.update_metadata(&mg).await?;
            }
            return Ok(RequeueDecision::None);
        }

        mg = self.initialize(mg).await?;

        if !observation.resource_exists {
            mg.set_condition(Condition::creating());
            metrics::increment_external_operations("create");
            let creation = match external.create(&mut mg).await {
                Ok(creation) => creation,
                Err(e) => {
                    return self
                        .fail(mg, ReconcileError::Create(e), Some(Condition::creating()))
                        .await
                }
            };
            log_connection_details("create", &creation.connection_details);
            info!("created external resource");
            mg.set_condition(Condition::reconcile_success());
            self.persist_status(&mg).await?;
            return Ok(RequeueDecision::Immediate);
        }

        if !observation.resource_up_to_date {
            metrics::increment_external_operations("update");
            let update = match external.update(&mut mg).await {
                Ok(update) => update,
                Err(e) => {
                    let message = e.to_string();
                    return self
                        .fail(
                            mg,
                            ReconcileError::Update(e),
                            Some(Condition::unavailable(message)),
                        )
                        .await;
                }
            };
            log_connection_details("update", &update.connection_details);
            info!("updated external resource");
            mg.set_condition(Condition::reconcile_success());
            self.persist_status(&mg).await?;
            return Ok(RequeueDecision::Immediate);
        }

        log_connection_details("observe", &observation.connection_details);
        mg.set_condition(Condition::available());
        mg.set_condition(Condition::reconcile_success());
        self.persist_status(&mg).await?;
        debug!(
            poll_interval_secs = self.options.poll_interval.as_secs(),
            "external resource is up to date"
        );
        Ok(RequeueDecision::After(self.options.poll_interval))
    }

    /// Add the finalizer and run initializers, persisting metadata if needed.
    ///
    /// Status written by Observe is carried over onto the returned version.
    async fn initialize(&self, mut mg: K) -> Result<K, ReconcileError> {
        let mut changed = add_finalizer(&mut mg);
        for initializer in &self.initializers {
            changed |= initializer.initialize(&mut mg);
        }
        if !changed {
            return Ok(mg);
        }

        let mut updated = self.store.update_metadata(&mg).await?;
        updated.copy_status_from(&mg);
        Ok(updated)
    }

    /// Record the failure on the object's conditions and hand the error back
    async fn fail(
        &self,
        mut mg: K,
        err: ReconcileError,
        ready: Option<Condition>,
    ) -> Result<RequeueDecision, ReconcileError> {
        warn!(stage = err.stage(), reason = err.reason(), "reconciliation failed: {}", err);

        mg.set_condition(Condition::reconcile_error(err.reason(), err.to_string()));
        match ready {
            Some(condition) => mg.set_condition(condition),
            None if mg.condition(ConditionType::Ready).is_none() => {
                mg.set_condition(Condition::pending());
            }
            None => {}
        }

        if let Err(e) = self.persist_status(&mg).await {
            warn!("cannot persist status after failed reconciliation: {}", e);
        }
        Err(err)
    }

    /// Write status, re-reading and re-applying on version conflicts.
    ///
    /// A vanished object needs no status.
    async fn persist_status(&self, mg: &K) -> Result<(), StoreError> {
        let name = mg.name_any();
        let mut desired = mg.clone();
        let mut attempt = 0;
        loop {
            match self.store.update_status(&desired).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_not_found() => {
                    debug!("managed resource deleted before status could be written");
                    return Ok(());
                }
                Err(e) if e.is_conflict() && attempt < self.options.status_update_retries => {
                    attempt += 1;
                    metrics::increment_status_conflicts();
                    debug!(attempt, "status update conflicted, re-reading latest version");
                    let mut latest = match self.store.get(&name).await {
                        Ok(latest) => latest,
                        Err(e) if e.is_not_found() => return Ok(()),
                        Err(e) => return Err(e),
                    };
                    latest.copy_status_from(mg);
                    desired = latest;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn log_connection_details(operation: &str, details: &ConnectionDetails) {
    if !details.is_empty() {
        debug!(
            operation,
            keys = ?details.keys().collect::<Vec<_>>(),
            "external client returned connection details"
        );
    }
}
