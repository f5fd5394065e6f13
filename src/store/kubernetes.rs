//! # Kubernetes Store
//!
//! Stores backed by the API server. Status writes are merge patches carrying
//! `metadata.resourceVersion`, so the server rejects them with 409 when the
//! object changed after it was read.

use super::{ConfigStore, ResourceStore, StoreError};
use crate::constants::FIELD_MANAGER;
use crate::credentials::{CredentialError, SecretReader};
use crate::crd::{ProviderConfig, ProviderConfigUsage};
use crate::managed::ManagedResource;
use async_trait::async_trait;
use futures::future;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use kube_runtime::watcher::{self, watcher, Event};
use kube_runtime::WatchStreamExt;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

fn map_kube_error(kind: &str, name: &str, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::not_found(kind, name),
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::conflict(kind, name),
        other => StoreError::Kube(other),
    }
}

fn patch_params() -> PatchParams {
    PatchParams::apply(FIELD_MANAGER)
}

/// Managed resources of one kind
pub struct KubeStore<K: ManagedResource> {
    api: Api<K>,
}

impl<K: ManagedResource> KubeStore<K> {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl<K: ManagedResource> ResourceStore<K> for KubeStore<K> {
    async fn get(&self, name: &str) -> Result<K, StoreError> {
        self.api
            .get(name)
            .await
            .map_err(|e| map_kube_error(&K::kind(&()), name, e))
    }

    async fn list_names(&self) -> Result<Vec<String>, StoreError> {
        let list = self
            .api
            .list(&ListParams::default())
            .await
            .map_err(StoreError::Kube)?;
        Ok(list.items.iter().map(ResourceExt::name_any).collect())
    }

    async fn update_metadata(&self, obj: &K) -> Result<K, StoreError> {
        let name = obj.name_any();
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": obj.resource_version(),
                "finalizers": obj.finalizers(),
                "annotations": obj.annotations(),
            }
        });

        debug!(name = %name, "patching metadata");
        self.api
            .patch(&name, &patch_params(), &Patch::Merge(patch))
            .await
            .map_err(|e| map_kube_error(&K::kind(&()), &name, e))
    }

    async fn update_status(&self, obj: &K) -> Result<K, StoreError> {
        let name = obj.name_any();
        let rendered = serde_json::to_value(obj)
            .map_err(|e| StoreError::Invalid(format!("cannot serialize {name}: {e}")))?;
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": obj.resource_version() },
            "status": rendered.get("status").cloned().unwrap_or_default(),
        });

        debug!(name = %name, "patching status");
        self.api
            .patch_status(&name, &patch_params(), &Patch::Merge(patch))
            .await
            .map_err(|e| map_kube_error(&K::kind(&()), &name, e))
    }

    fn watch(&self) -> BoxStream<'static, Result<String, StoreError>> {
        // Status patches bump resourceVersion but not generation.
        let mut generations: HashMap<String, Option<i64>> = HashMap::new();

        watcher(self.api.clone(), watcher::Config::default())
            .default_backoff()
            .filter_map(move |event| {
                let item = match event {
                    Ok(Event::Apply(obj) | Event::InitApply(obj)) => {
                        let name = obj.name_any();
                        let generation = obj.meta().generation;
                        let previous = generations.insert(name.clone(), generation);
                        (previous != Some(generation)).then_some(Ok(name))
                    }
                    Ok(Event::Delete(obj)) => {
                        let name = obj.name_any();
                        generations.remove(&name);
                        Some(Ok(name))
                    }
                    Ok(Event::Init | Event::InitDone) => None,
                    Err(e) => Some(Err(StoreError::Watch(e.to_string()))),
                };
                future::ready(item)
            })
            .boxed()
    }
}

/// `ProviderConfig` reads and `ProviderConfigUsage` writes
pub struct KubeConfigStore {
    configs: Api<ProviderConfig>,
    usages: Api<ProviderConfigUsage>,
}

impl KubeConfigStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            configs: Api::all(client.clone()),
            usages: Api::all(client),
        }
    }
}

#[async_trait]
impl ConfigStore for KubeConfigStore {
    async fn get_provider_config(&self, name: &str) -> Result<ProviderConfig, StoreError> {
        self.configs
            .get(name)
            .await
            .map_err(|e| map_kube_error(&ProviderConfig::kind(&()), name, e))
    }

    async fn apply_usage(&self, usage: &ProviderConfigUsage) -> Result<(), StoreError> {
        let name = usage.name_any();
        self.usages
            .patch(&name, &patch_params().force(), &Patch::Apply(usage))
            .await
            .map_err(|e| map_kube_error(&ProviderConfigUsage::kind(&()), &name, e))?;
        Ok(())
    }
}

/// Reads credential secrets from any namespace
pub struct KubeSecretReader {
    client: Client,
}

impl KubeSecretReader {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretReader for KubeSecretReader {
    async fn read_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>, CredentialError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match api.get_opt(name).await {
            Ok(Some(secret)) => Ok(Some(
                secret
                    .data
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(key, value)| (key, value.0))
                    .collect(),
            )),
            Ok(None) => Ok(None),
            Err(kube::Error::Api(api_err)) if api_err.code == 403 => {
                Err(CredentialError::AccessDenied(format!(
                    "secret {namespace}/{name}: {}",
                    api_err.message
                )))
            }
            Err(e) => Err(CredentialError::Unavailable(format!(
                "secret {namespace}/{name}: {e}"
            ))),
        }
    }
}
