//! # In-Memory Store
//!
//! Keeps objects in process with the same rules the API server enforces:
//! monotonically increasing resource versions, conflicts on stale writes,
//! finalizer-gated deletion, and owner-based garbage collection of usages.

use super::{ConfigStore, ResourceStore, StoreError};
use crate::credentials::{CredentialError, SecretReader};
use crate::crd::{ProviderConfig, ProviderConfigStatus, ProviderConfigUsage};
use crate::managed::ManagedResource;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{Resource, ResourceExt};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

const WATCH_CHANNEL_CAPACITY: usize = 1024;

/// Secondary index from owner UID to the usage records it owns
#[derive(Debug, Default)]
pub struct UsageIndex {
    by_owner: HashMap<String, BTreeSet<String>>,
}

impl UsageIndex {
    pub fn insert(&mut self, owner_uid: &str, usage_name: &str) {
        self.by_owner
            .entry(owner_uid.to_string())
            .or_default()
            .insert(usage_name.to_string());
    }

    /// Drop an owner, returning the usages that must be collected
    pub fn remove_owner(&mut self, owner_uid: &str) -> BTreeSet<String> {
        self.by_owner.remove(owner_uid).unwrap_or_default()
    }

    #[must_use]
    pub fn owned_by(&self, owner_uid: &str) -> usize {
        self.by_owner.get(owner_uid).map_or(0, BTreeSet::len)
    }
}

type SecretData = BTreeMap<String, Vec<u8>>;

#[derive(Debug)]
struct State<K> {
    objects: BTreeMap<String, K>,
    provider_configs: BTreeMap<String, ProviderConfig>,
    usages: BTreeMap<String, ProviderConfigUsage>,
    usage_index: UsageIndex,
    secrets: BTreeMap<(String, String), SecretData>,
    last_version: u64,
    last_uid: u64,
}

impl<K> State<K> {
    fn next_version(&mut self) -> String {
        self.last_version += 1;
        self.last_version.to_string()
    }

    fn next_uid(&mut self) -> String {
        self.last_uid += 1;
        format!("00000000-0000-0000-0000-{:012x}", self.last_uid)
    }

    fn users_of(&self, config_name: &str) -> usize {
        self.usages
            .values()
            .filter(|usage| usage.spec.provider_config_ref.name == config_name)
            .count()
    }

    fn refresh_users(&mut self, config_name: &str) {
        let users = i64::try_from(self.users_of(config_name)).unwrap_or(i64::MAX);
        if let Some(pc) = self.provider_configs.get_mut(config_name) {
            pc.status.get_or_insert_with(ProviderConfigStatus::default).users = Some(users);
        }
    }
}

/// Store used by tests and local runs
#[derive(Debug)]
pub struct InMemoryStore<K: ManagedResource> {
    state: Mutex<State<K>>,
    events: broadcast::Sender<String>,
}

impl<K: ManagedResource> Default for InMemoryStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ManagedResource> InMemoryStore<K> {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(State {
                objects: BTreeMap::new(),
                provider_configs: BTreeMap::new(),
                usages: BTreeMap::new(),
                usage_index: UsageIndex::default(),
                secrets: BTreeMap::new(),
                last_version: 0,
                last_uid: 0,
            }),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, name: &str) {
        // No receivers just means nobody is watching yet.
        let _ = self.events.send(name.to_string());
    }

    /// Create a new object, assigning UID, resource version and generation
    pub fn create(&self, obj: K) -> Result<K, StoreError> {
        let name = obj
            .meta()
            .name
            .clone()
            .ok_or_else(|| StoreError::Invalid("object has no name".to_string()))?;
        let mut state = self.lock();
        if state.objects.contains_key(&name) {
            return Err(StoreError::Invalid(format!(
                "{} {name} already exists",
                K::kind(&())
            )));
        }

        let mut created = obj;
        let meta = created.meta_mut();
        meta.uid = Some(state.next_uid());
        meta.resource_version = Some(state.next_version());
        meta.generation = Some(1);
        meta.deletion_timestamp = None;
        state.objects.insert(name.clone(), created.clone());
        drop(state);

        self.notify(&name);
        Ok(created)
    }

    /// Replace the desired state of an object as a user edit would.
    ///
    /// Status, finalizers and identity are kept; annotations are merged.
    pub fn replace_spec(&self, obj: K) -> Result<K, StoreError> {
        let name = obj.name_any();
        let mut state = self.lock();
        let current = state
            .objects
            .get(&name)
            .cloned()
            .ok_or_else(|| StoreError::not_found(&K::kind(&()), &name))?;

        let mut next = obj;
        next.copy_status_from(&current);
        let mut annotations = current.annotations().clone();
        annotations.extend(next.annotations().clone());
        *next.annotations_mut() = annotations;
        let version = state.next_version();
        let meta = next.meta_mut();
        meta.uid.clone_from(&current.meta().uid);
        meta.finalizers.clone_from(&current.meta().finalizers);
        meta.deletion_timestamp.clone_from(&current.meta().deletion_timestamp);
        meta.generation = Some(current.meta().generation.unwrap_or(0) + 1);
        meta.resource_version = Some(version);
        state.objects.insert(name.clone(), next.clone());
        drop(state);

        self.notify(&name);
        Ok(next)
    }

    /// Request deletion. Objects with finalizers are only marked.
    pub fn delete(&self, name: &str) -> Result<(), StoreError> {
        let timestamp = now()?;
        let mut state = self.lock();
        let Some(current) = state.objects.get(name) else {
            return Err(StoreError::not_found(&K::kind(&()), name));
        };

        if current.finalizers().is_empty() {
            Self::remove_object(&mut state, name);
        } else if current.meta().deletion_timestamp.is_none() {
            let version = state.next_version();
            if let Some(obj) = state.objects.get_mut(name) {
                let meta = obj.meta_mut();
                meta.deletion_timestamp = Some(timestamp);
                meta.generation = Some(meta.generation.unwrap_or(0) + 1);
                meta.resource_version = Some(version);
            }
        }
        drop(state);

        self.notify(name);
        Ok(())
    }

    /// Remove an object and collect the usages it owns
    fn remove_object(state: &mut State<K>, name: &str) {
        let Some(removed) = state.objects.remove(name) else {
            return;
        };
        let Some(uid) = removed.meta().uid.clone() else {
            return;
        };

        let mut touched = BTreeSet::new();
        for usage_name in state.usage_index.remove_owner(&uid) {
            if let Some(usage) = state.usages.remove(&usage_name) {
                touched.insert(usage.spec.provider_config_ref.name);
            }
        }
        for config_name in &touched {
            state.refresh_users(config_name);
        }
        debug!(
            name,
            collected_configs = touched.len(),
            "removed object and collected its usages"
        );
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.lock().objects.contains_key(name)
    }

    pub fn put_provider_config(&self, pc: ProviderConfig) {
        let name = pc.name_any();
        let mut state = self.lock();
        state.provider_configs.insert(name.clone(), pc);
        state.refresh_users(&name);
    }

    /// Delete a config, refusing while usages still reference it
    pub fn delete_provider_config(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        if !state.provider_configs.contains_key(name) {
            return Err(StoreError::not_found(&ProviderConfig::kind(&()), name));
        }
        let users = state.users_of(name);
        if users > 0 {
            return Err(StoreError::InUse {
                kind: ProviderConfig::kind(&()).to_string(),
                name: name.to_string(),
                users,
            });
        }
        state.provider_configs.remove(name);
        Ok(())
    }

    pub fn put_secret(&self, namespace: &str, name: &str, data: SecretData) {
        self.lock()
            .secrets
            .insert((namespace.to_string(), name.to_string()), data);
    }

    /// Usage records pointing at the named config
    #[must_use]
    pub fn usages_for(&self, config_name: &str) -> Vec<ProviderConfigUsage> {
        self.lock()
            .usages
            .values()
            .filter(|usage| usage.spec.provider_config_ref.name == config_name)
            .cloned()
            .collect()
    }
}

fn now() -> Result<Time, StoreError> {
    let rendered = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    serde_json::from_value(serde_json::Value::String(rendered))
        .map_err(|e| StoreError::Invalid(format!("cannot build timestamp: {e}")))
}

fn check_version<K: ManagedResource>(current: &K, incoming: &K) -> Result<(), StoreError> {
    match incoming.meta().resource_version.as_deref() {
        Some(version) if current.meta().resource_version.as_deref() != Some(version) => Err(
            StoreError::conflict(&K::kind(&()), &incoming.name_any()),
        ),
        _ => Ok(()),
    }
}

#[async_trait]
impl<K: ManagedResource> ResourceStore<K> for InMemoryStore<K> {
    async fn get(&self, name: &str) -> Result<K, StoreError> {
        self.lock()
            .objects
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found(&K::kind(&()), name))
    }

    async fn list_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().objects.keys().cloned().collect())
    }

    async fn update_metadata(&self, obj: &K) -> Result<K, StoreError> {
        let name = obj.name_any();
        let mut state = self.lock();
        let current = state
            .objects
            .get(&name)
            .ok_or_else(|| StoreError::not_found(&K::kind(&()), &name))?;
        check_version(current, obj)?;

        let mut next = current.clone();
        next.meta_mut().finalizers.clone_from(&obj.meta().finalizers);
        next.meta_mut().annotations.clone_from(&obj.meta().annotations);
        next.meta_mut().labels.clone_from(&obj.meta().labels);
        next.meta_mut().resource_version = Some(state.next_version());

        if next.meta().deletion_timestamp.is_some() && next.finalizers().is_empty() {
            Self::remove_object(&mut state, &name);
            return Ok(next);
        }
        state.objects.insert(name, next.clone());
        Ok(next)
    }

    async fn update_status(&self, obj: &K) -> Result<K, StoreError> {
        let name = obj.name_any();
        let mut state = self.lock();
        let current = state
            .objects
            .get(&name)
            .ok_or_else(|| StoreError::not_found(&K::kind(&()), &name))?;
        check_version(current, obj)?;

        let mut next = current.clone();
        next.copy_status_from(obj);
        next.meta_mut().resource_version = Some(state.next_version());
        state.objects.insert(name, next.clone());
        Ok(next)
    }

    fn watch(&self) -> BoxStream<'static, Result<String, StoreError>> {
        let receiver = self.events.subscribe();
        futures::stream::unfold(receiver, |mut receiver| async move {
            match receiver.recv().await {
                Ok(name) => Some((Ok(name), receiver)),
                Err(broadcast::error::RecvError::Lagged(missed)) => Some((
                    Err(StoreError::Watch(format!("watch lagged, missed {missed} events"))),
                    receiver,
                )),
                Err(broadcast::error::RecvError::Closed) => None,
            }
        })
        .boxed()
    }
}

#[async_trait]
impl<K: ManagedResource> ConfigStore for InMemoryStore<K> {
    async fn get_provider_config(&self, name: &str) -> Result<ProviderConfig, StoreError> {
        self.lock()
            .provider_configs
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found(&ProviderConfig::kind(&()), name))
    }

    async fn apply_usage(&self, usage: &ProviderConfigUsage) -> Result<(), StoreError> {
        let usage_name = usage
            .meta()
            .name
            .clone()
            .ok_or_else(|| StoreError::Invalid("usage has no name".to_string()))?;
        let owner = usage
            .owner_references()
            .first()
            .cloned()
            .ok_or_else(|| StoreError::Invalid(format!("usage {usage_name} has no owner")))?;

        let mut state = self.lock();
        let owner_alive = state
            .objects
            .get(&owner.name)
            .is_some_and(|obj| obj.meta().uid.as_deref() == Some(owner.uid.as_str()));
        if !owner_alive {
            return Err(StoreError::not_found(&owner.kind, &owner.name));
        }

        let config_name = usage.spec.provider_config_ref.name.clone();
        if let Some(previous) = state.usages.insert(usage_name.clone(), usage.clone()) {
            let previous_config = previous.spec.provider_config_ref.name;
            if previous_config != config_name {
                state.refresh_users(&previous_config);
            }
        }
        state.usage_index.insert(&owner.uid, &usage_name);
        state.refresh_users(&config_name);
        Ok(())
    }
}

#[async_trait]
impl<K: ManagedResource> SecretReader for InMemoryStore<K> {
    async fn read_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SecretData>, CredentialError> {
        Ok(self
            .lock()
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}
