//! # Stores
//!
//! Access to the desired-state objects the controller reconciles and the
//! configuration objects it reads.
//!
//! - `kubernetes`: backed by the Kubernetes API server
//! - `memory`: in-process implementation with the same concurrency rules,
//!   used by tests and local runs

mod kubernetes;
mod memory;

pub use kubernetes::{KubeConfigStore, KubeSecretReader, KubeStore};
pub use memory::{InMemoryStore, UsageIndex};

use crate::crd::{ProviderConfig, ProviderConfigUsage};
use crate::managed::ManagedResource;
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },
    /// The object changed since it was read
    #[error("conflict writing {kind} {name}: the object has been modified")]
    Conflict { kind: String, name: String },
    #[error("{kind} {name} is still in use by {users} resource(s)")]
    InUse {
        kind: String,
        name: String,
        users: usize,
    },
    #[error("invalid object: {0}")]
    Invalid(String),
    #[error("watch error: {0}")]
    Watch(String),
    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),
}

impl StoreError {
    pub(crate) fn not_found(kind: &str, name: &str) -> Self {
        StoreError::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    pub(crate) fn conflict(kind: &str, name: &str) -> Self {
        StoreError::Conflict {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Desired-state objects of one kind
#[async_trait]
pub trait ResourceStore<K: ManagedResource>: Send + Sync {
    async fn get(&self, name: &str) -> Result<K, StoreError>;

    async fn list_names(&self) -> Result<Vec<String>, StoreError>;

    /// Write finalizers and annotations.
    ///
    /// Fails with `Conflict` unless `obj` carries the stored resource version.
    async fn update_metadata(&self, obj: &K) -> Result<K, StoreError>;

    /// Write the status subresource.
    ///
    /// Fails with `Conflict` unless `obj` carries the stored resource version.
    async fn update_status(&self, obj: &K) -> Result<K, StoreError>;

    /// Names of objects whose desired state changed. Status-only writes are
    /// not reported.
    fn watch(&self) -> BoxStream<'static, Result<String, StoreError>>;
}

/// Configuration objects and usage records
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_provider_config(&self, name: &str) -> Result<ProviderConfig, StoreError>;

    /// Create or refresh a usage record. Fails with `NotFound` when its owner
    /// no longer exists.
    async fn apply_usage(&self, usage: &ProviderConfigUsage) -> Result<(), StoreError>;
}
