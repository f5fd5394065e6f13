//! # External Client
//!
//! Capability set every resource kind implements against its external system.

use super::error::{ConnectError, ExternalError};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Details needed to connect to the external resource, keyed by name
pub type ConnectionDetails = BTreeMap<String, Vec<u8>>;

/// Result of a read-only observation of the external resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalObservation {
    /// False when the resource needs to be (re)created
    pub resource_exists: bool,
    /// False when the resource exists but drifted from the spec
    pub resource_up_to_date: bool,
    pub connection_details: ConnectionDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalCreation {
    pub connection_details: ConnectionDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalUpdate {
    pub connection_details: ConnectionDetails,
}

/// Observes, then either creates, updates, or deletes an external resource so
/// it reflects the managed resource's desired state.
///
/// Implementations may write observed state into the managed resource's status
/// but must never treat that status as desired state.
#[async_trait]
pub trait ExternalClient<K>: Send + Sync {
    /// Never mutates the external resource.
    async fn observe(&self, mg: &mut K) -> Result<ExternalObservation, ExternalError>;

    /// Must be safe to retry when a previous attempt's outcome is unknown.
    async fn create(&self, mg: &mut K) -> Result<ExternalCreation, ExternalError>;

    /// Re-running with an unchanged spec must not change anything.
    async fn update(&self, mg: &mut K) -> Result<ExternalUpdate, ExternalError>;

    /// An already absent resource counts as deleted.
    async fn delete(&self, mg: &mut K) -> Result<(), ExternalError>;
}

/// Produces an external client bound to the credentials a resource references
#[async_trait]
pub trait Connector<K>: Send + Sync {
    async fn connect(&self, mg: &K) -> Result<Box<dyn ExternalClient<K>>, ConnectError>;
}
