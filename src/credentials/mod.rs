//! # Credentials
//!
//! Resolves the credential bytes a `ProviderConfig` points at. Resolved bytes
//! are wrapped in [`Zeroizing`] and wiped when the client holding them drops.

use crate::crd::{CredentialsSource, ProviderCredentials};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("secret {namespace}/{name} not found")]
    SecretNotFound { namespace: String, name: String },
    #[error("key {key} not found in secret {namespace}/{name}")]
    KeyNotFound {
        namespace: String,
        name: String,
        key: String,
    },
    #[error("credentials source {0} requires a selector")]
    MissingSelector(&'static str),
    #[error("environment variable {0} is not set")]
    EnvironmentVariableNotSet(String),
    #[error("cannot read credentials file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("credential backend unavailable: {0}")]
    Unavailable(String),
}

/// Reads the data map of a Kubernetes `Secret`
#[async_trait]
pub trait SecretReader: Send + Sync {
    /// `Ok(None)` when the secret does not exist
    async fn read_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, Vec<u8>>>, CredentialError>;
}

#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(
        &self,
        credentials: &ProviderCredentials,
    ) -> Result<Zeroizing<Vec<u8>>, CredentialError>;
}

/// Resolver for the sources every provider supports
pub struct CommonCredentialExtractor {
    secrets: Arc<dyn SecretReader>,
}

impl std::fmt::Debug for CommonCredentialExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommonCredentialExtractor").finish_non_exhaustive()
    }
}

impl CommonCredentialExtractor {
    #[must_use]
    pub fn new(secrets: Arc<dyn SecretReader>) -> Self {
        Self { secrets }
    }
}

#[async_trait]
impl CredentialResolver for CommonCredentialExtractor {
    async fn resolve(
        &self,
        credentials: &ProviderCredentials,
    ) -> Result<Zeroizing<Vec<u8>>, CredentialError> {
        let source = credentials.source;
        debug!(source = source.as_str(), "resolving credentials");

        match source {
            CredentialsSource::None => Ok(Zeroizing::new(Vec::new())),
            CredentialsSource::Secret => {
                let selector = credentials
                    .selectors
                    .secret_ref
                    .as_ref()
                    .ok_or(CredentialError::MissingSelector(source.as_str()))?;
                let mut data = self
                    .secrets
                    .read_secret(&selector.namespace, &selector.name)
                    .await?
                    .ok_or_else(|| CredentialError::SecretNotFound {
                        namespace: selector.namespace.clone(),
                        name: selector.name.clone(),
                    })?;
                data.remove(&selector.key)
                    .map(Zeroizing::new)
                    .ok_or_else(|| CredentialError::KeyNotFound {
                        namespace: selector.namespace.clone(),
                        name: selector.name.clone(),
                        key: selector.key.clone(),
                    })
            }
            CredentialsSource::Environment => {
                let selector = credentials
                    .selectors
                    .env
                    .as_ref()
                    .ok_or(CredentialError::MissingSelector(source.as_str()))?;
                std::env::var_os(&selector.name)
                    .map(|value| Zeroizing::new(value.into_encoded_bytes()))
                    .ok_or_else(|| CredentialError::EnvironmentVariableNotSet(selector.name.clone()))
            }
            CredentialsSource::Filesystem => {
                let selector = credentials
                    .selectors
                    .fs
                    .as_ref()
                    .ok_or(CredentialError::MissingSelector(source.as_str()))?;
                tokio::fs::read(&selector.path)
                    .await
                    .map(Zeroizing::new)
                    .map_err(|source| CredentialError::Io {
                        path: selector.path.clone(),
                        source,
                    })
            }
        }
    }
}
