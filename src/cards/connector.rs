//! # Deck Connector
//!
//! Turns a Deck's `ProviderConfig` reference into a dealer client: track
//! usage, look up the config, resolve credentials, then build the client.

use crate::credentials::CredentialResolver;
use crate::crd::Deck;
use crate::managed::{ConnectError, Connector, ExternalClient, ExternalError, ManagedResource};
use crate::store::ConfigStore;
use crate::usage::UsageTracker;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Builds an external client bound to resolved credential bytes
pub trait ServiceFactory<K>: Send + Sync {
    fn new_client(&self, credentials: &[u8]) -> Result<Box<dyn ExternalClient<K>>, ExternalError>;
}

pub struct DeckConnector {
    configs: Arc<dyn ConfigStore>,
    usage: Arc<dyn UsageTracker<Deck>>,
    credentials: Arc<dyn CredentialResolver>,
    new_service: Arc<dyn ServiceFactory<Deck>>,
}

impl std::fmt::Debug for DeckConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeckConnector").finish_non_exhaustive()
    }
}

impl DeckConnector {
    #[must_use]
    pub fn new(
        configs: Arc<dyn ConfigStore>,
        usage: Arc<dyn UsageTracker<Deck>>,
        credentials: Arc<dyn CredentialResolver>,
        new_service: Arc<dyn ServiceFactory<Deck>>,
    ) -> Self {
        Self {
            configs,
            usage,
            credentials,
            new_service,
        }
    }
}

#[async_trait]
impl Connector<Deck> for DeckConnector {
    async fn connect(&self, mg: &Deck) -> Result<Box<dyn ExternalClient<Deck>>, ConnectError> {
        self.usage.track(mg).await.map_err(ConnectError::Tracking)?;

        let name = mg.provider_config_reference().name.clone();
        let pc = match self.configs.get_provider_config(&name).await {
            Ok(pc) => pc,
            Err(e) if e.is_not_found() => return Err(ConnectError::ConfigurationNotFound { name }),
            Err(source) => return Err(ConnectError::ConfigurationLookup { name, source }),
        };

        let credentials = self
            .credentials
            .resolve(&pc.spec.credentials)
            .await
            .map_err(ConnectError::CredentialResolution)?;
        debug!(provider_config = %name, "resolved credentials");

        self.new_service
            .new_client(&credentials)
            .map_err(ConnectError::ClientConstruction)
    }
}
