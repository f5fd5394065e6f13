//! Shared fixtures for the integration tests
//!
//! Builds a `Deck` reconciler wired to the in-memory store and a seeded dealer,
//! plus store and connector doubles for failure injection.

#![allow(dead_code, reason = "not every test binary uses every fixture")]

use async_trait::async_trait;
use futures::stream::BoxStream;
use kube::ResourceExt;
use provider_cards::cards::{
    CardDealer, DealerConfig, DealerServiceFactory, DeckConnector, DeckExternal,
};
use provider_cards::credentials::CommonCredentialExtractor;
use provider_cards::crd::{
    CommonCredentialSelectors, CredentialsSource, Deck, DeckParameters, DeckSpec, DeletionPolicy,
    ProviderConfig, ProviderConfigReference, ProviderConfigSpec, ProviderCredentials,
};
use provider_cards::managed::{
    ConnectError, Connector, ExternalClient, ExternalCreation, ExternalError,
    ExternalObservation, ExternalUpdate, ManagedReconciler, NameAsExternalName,
    ReconcilerOptions,
};
use provider_cards::store::{ConfigStore, InMemoryStore, ResourceStore, StoreError};
use provider_cards::usage::ProviderConfigUsageTracker;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

static LOGGING_INIT: Once = Once::new();

/// Route `tracing` output through the test harness, filtered by `RUST_LOG`
pub fn init_logging() {
    LOGGING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "provider_cards=warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

pub fn deck(name: &str, deck_type: Option<&str>) -> Deck {
    Deck::new(
        name,
        DeckSpec {
            for_provider: DeckParameters {
                deck_type: deck_type.map(str::to_string),
            },
            provider_config_ref: ProviderConfigReference::default(),
            deletion_policy: DeletionPolicy::Delete,
            write_connection_secret_to_ref: None,
        },
    )
}

pub fn orphaned_deck(name: &str) -> Deck {
    let mut deck = deck(name, None);
    deck.spec.deletion_policy = DeletionPolicy::Orphan;
    deck
}

/// A `ProviderConfig` named `default` that needs no credentials
pub fn default_provider_config() -> ProviderConfig {
    ProviderConfig::new(
        "default",
        ProviderConfigSpec {
            credentials: ProviderCredentials {
                source: CredentialsSource::None,
                selectors: CommonCredentialSelectors::default(),
            },
        },
    )
}

pub fn options() -> ReconcilerOptions {
    ReconcilerOptions {
        poll_interval: POLL_INTERVAL,
        status_update_retries: 3,
    }
}

/// Everything one reconciler needs, backed by memory
pub struct Harness {
    pub store: Arc<InMemoryStore<Deck>>,
    pub dealer: Arc<CardDealer>,
}

impl Harness {
    pub fn new() -> Self {
        init_logging();
        let store = Arc::new(InMemoryStore::new());
        store.put_provider_config(default_provider_config());
        Self {
            store,
            dealer: Arc::new(CardDealer::new(DealerConfig { seed: Some(52) })),
        }
    }

    pub fn connector(&self) -> DeckConnector {
        let configs: Arc<dyn ConfigStore> = Arc::clone(&self.store) as Arc<dyn ConfigStore>;
        DeckConnector::new(
            Arc::clone(&configs),
            Arc::new(ProviderConfigUsageTracker::new(configs)),
            Arc::new(CommonCredentialExtractor::new(
                Arc::clone(&self.store) as Arc<dyn provider_cards::credentials::SecretReader>
            )),
            Arc::new(DealerServiceFactory::new(Arc::clone(&self.dealer))),
        )
    }

    pub fn reconciler(&self) -> ManagedReconciler<Deck> {
        self.reconciler_over(Arc::clone(&self.store) as Arc<dyn ResourceStore<Deck>>)
    }

    /// A reconciler reading and writing through `store`
    pub fn reconciler_over(&self, store: Arc<dyn ResourceStore<Deck>>) -> ManagedReconciler<Deck> {
        ManagedReconciler::new(store, Arc::new(self.connector()))
            .with_initializer(NameAsExternalName)
            .with_options(options())
    }

    pub async fn get(&self, name: &str) -> Deck {
        self.store.get(name).await.expect("deck should exist")
    }
}

/// Lets a concurrent writer win the first `conflicts` status writes
pub struct ConflictingStore {
    pub inner: Arc<InMemoryStore<Deck>>,
    conflicts: AtomicU32,
    pub status_writes: AtomicU32,
}

impl ConflictingStore {
    pub fn new(inner: Arc<InMemoryStore<Deck>>, conflicts: u32) -> Self {
        Self {
            inner,
            conflicts: AtomicU32::new(conflicts),
            status_writes: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ResourceStore<Deck> for ConflictingStore {
    async fn get(&self, name: &str) -> Result<Deck, StoreError> {
        self.inner.get(name).await
    }

    async fn list_names(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_names().await
    }

    async fn update_metadata(&self, obj: &Deck) -> Result<Deck, StoreError> {
        self.inner.update_metadata(obj).await
    }

    async fn update_status(&self, obj: &Deck) -> Result<Deck, StoreError> {
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        let conflict = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflict {
            // Someone else writes between our read and our write.
            let latest = self.inner.get(&obj.name_any()).await?;
            self.inner.update_status(&latest).await?;
        }
        self.inner.update_status(obj).await
    }

    fn watch(&self) -> BoxStream<'static, Result<String, StoreError>> {
        self.inner.watch()
    }
}

/// An external call a [`FailingExternal`] can be told to reject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// What a [`ScriptedConnector`] does before handing out a dealer client
#[derive(Debug, Clone, Copy)]
pub enum Script {
    Connect,
    Sleep(Duration),
    Panic,
    /// Connect, but the client rejects one operation as unavailable
    FailOn(Operation),
}

/// Dealer client whose `failing` operation reports the dealer as down
pub struct FailingExternal {
    inner: DeckExternal,
    failing: Operation,
}

impl FailingExternal {
    fn check(&self, operation: Operation) -> Result<(), ExternalError> {
        if operation == self.failing {
            return Err(ExternalError::ServiceUnavailable(format!(
                "dealer rejected {operation:?}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ExternalClient<Deck> for FailingExternal {
    async fn observe(&self, mg: &mut Deck) -> Result<ExternalObservation, ExternalError> {
        self.inner.observe(mg).await
    }

    async fn create(&self, mg: &mut Deck) -> Result<ExternalCreation, ExternalError> {
        self.check(Operation::Create)?;
        self.inner.create(mg).await
    }

    async fn update(&self, mg: &mut Deck) -> Result<ExternalUpdate, ExternalError> {
        self.check(Operation::Update)?;
        self.inner.update(mg).await
    }

    async fn delete(&self, mg: &mut Deck) -> Result<(), ExternalError> {
        self.check(Operation::Delete)?;
        self.inner.delete(mg).await
    }
}

/// Connector that counts calls and overlapping attempts, and can stall or panic
pub struct ScriptedConnector {
    dealer: Arc<CardDealer>,
    script: Script,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new(dealer: Arc<CardDealer>, script: Script) -> Self {
        Self {
            dealer,
            script,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Connector<Deck> for ScriptedConnector {
    async fn connect(&self, _mg: &Deck) -> Result<Box<dyn ExternalClient<Deck>>, ConnectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        match self.script {
            Script::Connect => {}
            Script::FailOn(failing) => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                return Ok(Box::new(FailingExternal {
                    inner: DeckExternal::new(Arc::clone(&self.dealer)),
                    failing,
                }));
            }
            Script::Sleep(delay) => tokio::time::sleep(delay).await,
            Script::Panic => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                panic!("connector handed a resource it cannot serve");
            }
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Box::new(DeckExternal::new(Arc::clone(&self.dealer))))
    }
}

/// Build a reconciler over `store` using a scripted connector
pub fn scripted_reconciler(
    store: &Arc<InMemoryStore<Deck>>,
    connector: &Arc<ScriptedConnector>,
) -> ManagedReconciler<Deck> {
    ManagedReconciler::new(
        Arc::clone(store) as Arc<dyn ResourceStore<Deck>>,
        Arc::clone(connector) as Arc<dyn Connector<Deck>>,
    )
    .with_initializer(NameAsExternalName)
    .with_options(options())
}
