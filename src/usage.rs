//! # ProviderConfig Usage Tracking
//!
//! Before connecting, every managed resource records that it uses its
//! `ProviderConfig`. The record is owned by the managed resource, so it goes
//! away with it and the config cannot be deleted while anything still uses it.

use crate::crd::{
    ProviderConfigUsage, ProviderConfigUsageSpec, TypedReference, PROVIDER_CONFIG_LABEL,
};
use crate::managed::ManagedResource;
use crate::store::{ConfigStore, StoreError};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("{kind} {name} has no UID yet")]
    MissingUid { kind: String, name: String },
    #[error("cannot apply ProviderConfigUsage: {0}")]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait UsageTracker<K>: Send + Sync {
    /// Record that `mg` uses the config it references
    async fn track(&self, mg: &K) -> Result<(), TrackingError>;
}

/// Tracks usage with `ProviderConfigUsage` objects named after the resource UID
pub struct ProviderConfigUsageTracker {
    store: Arc<dyn ConfigStore>,
}

impl std::fmt::Debug for ProviderConfigUsageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfigUsageTracker").finish_non_exhaustive()
    }
}

impl ProviderConfigUsageTracker {
    #[must_use]
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }
}

/// Build the usage record for a managed resource
pub fn usage_for<K: ManagedResource>(mg: &K) -> Result<ProviderConfigUsage, TrackingError> {
    let kind = K::kind(&()).to_string();
    let name = mg.name_any();
    let uid = mg.uid().ok_or_else(|| TrackingError::MissingUid {
        kind: kind.clone(),
        name: name.clone(),
    })?;
    let api_version = K::api_version(&()).to_string();
    let config_ref = mg.provider_config_reference().clone();

    let mut usage = ProviderConfigUsage::new(
        &uid,
        ProviderConfigUsageSpec {
            provider_config_ref: config_ref.clone(),
            resource_ref: TypedReference {
                api_version: api_version.clone(),
                kind: kind.clone(),
                name: name.clone(),
                uid: Some(uid.clone()),
            },
        },
    );
    usage.metadata.labels = Some(BTreeMap::from([(
        PROVIDER_CONFIG_LABEL.to_string(),
        config_ref.name,
    )]));
    usage.metadata.owner_references = Some(vec![OwnerReference {
        api_version,
        kind,
        name,
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    }]);
    Ok(usage)
}

#[async_trait]
impl<K: ManagedResource> UsageTracker<K> for ProviderConfigUsageTracker {
    async fn track(&self, mg: &K) -> Result<(), TrackingError> {
        let usage = usage_for(mg)?;
        self.store.apply_usage(&usage).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Deck, DeckParameters, DeckSpec, DeletionPolicy, ProviderConfigReference};
    use crate::store::InMemoryStore;

    fn deck(name: &str, config: &str) -> Deck {
        Deck::new(
            name,
            DeckSpec {
                for_provider: DeckParameters::default(),
                provider_config_ref: ProviderConfigReference {
                    name: config.to_string(),
                },
                deletion_policy: DeletionPolicy::Delete,
                write_connection_secret_to_ref: None,
            },
        )
    }

    #[test]
    fn test_usage_is_owned_by_resource() {
        let mut mg = deck("poker-night", "casino");
        mg.metadata.uid = Some("1234".to_string());

        let usage = usage_for(&mg).expect("usage should build");

        assert_eq!(usage.name_any(), "1234");
        assert_eq!(usage.spec.provider_config_ref.name, "casino");
        assert_eq!(usage.spec.resource_ref.kind, "Deck");
        assert_eq!(
            usage.labels().get(PROVIDER_CONFIG_LABEL).map(String::as_str),
            Some("casino")
        );
        let owner = &usage.owner_references()[0];
        assert_eq!(owner.uid, "1234");
        assert_eq!(owner.api_version, "deck.cards.crossplane.io/v1alpha1");
        assert_eq!(owner.controller, Some(true));
    }

    #[test]
    fn test_usage_requires_uid() {
        let err = usage_for(&deck("poker-night", "casino")).expect_err("no uid");
        assert!(matches!(err, TrackingError::MissingUid { .. }));
    }

    #[tokio::test]
    async fn test_tracking_is_idempotent_and_collected_with_owner() {
        let store = Arc::new(InMemoryStore::<Deck>::new());
        let created = store.create(deck("poker-night", "casino")).expect("create");
        let tracker = ProviderConfigUsageTracker::new(Arc::clone(&store) as Arc<dyn ConfigStore>);

        tracker.track(&created).await.expect("first track");
        tracker.track(&created).await.expect("second track");
        assert_eq!(store.usages_for("casino").len(), 1);

        store.delete("poker-night").expect("delete");
        assert!(store.usages_for("casino").is_empty());
    }

    #[tokio::test]
    async fn test_tracking_fails_for_vanished_owner() {
        let store = Arc::new(InMemoryStore::<Deck>::new());
        let created = store.create(deck("poker-night", "casino")).expect("create");
        store.delete("poker-night").expect("delete");

        let tracker = ProviderConfigUsageTracker::new(Arc::clone(&store) as Arc<dyn ConfigStore>);
        let err = tracker.track(&created).await.expect_err("owner is gone");
        assert!(matches!(err, TrackingError::Store(ref e) if e.is_not_found()));
    }
}
