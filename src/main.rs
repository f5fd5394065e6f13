//! # Cards Provider
//!
//! Reconciles `Deck` managed resources against the card dealer.
//!
//! ## Overview
//!
//! 1. **Watching Decks** - cluster-wide watch on `deck.cards.crossplane.io` objects
//! 2. **Connecting** - each Deck's `ProviderConfig` supplies dealer credentials
//! 3. **Reconciling** - Observe, then Create, Update or Delete the dealt deck
//! 4. **Reporting** - `Ready` and `Synced` conditions plus the dealt cards in status
//!
//! Metrics and probes are served on `METRICS_PORT`.

use anyhow::{Context, Result};
use kube::Client;
use provider_cards::build_info;
use provider_cards::cards::{CardDealer, DealerServiceFactory, DeckConnector};
use provider_cards::config::ControllerConfig;
use provider_cards::credentials::CommonCredentialExtractor;
use provider_cards::crd::Deck;
use provider_cards::managed::{ManagedReconciler, NameAsExternalName};
use provider_cards::observability::{init_logging, metrics};
use provider_cards::runtime::{default_managed_rate_limiter, Controller, WorkQueue};
use provider_cards::server::{start_server, ServerState};
use provider_cards::store::{
    ConfigStore, KubeConfigStore, KubeSecretReader, KubeStore, ResourceStore,
};
use provider_cards::usage::ProviderConfigUsageTracker;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ControllerConfig::from_env();
    init_logging(config.log_format);

    info!(
        version = build_info::VERSION,
        git_hash = build_info::GIT_HASH,
        built = build_info::BUILD_DATETIME,
        "Starting cards provider"
    );

    // rustls needs a process-wide crypto provider before any TLS connection.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        info!("rustls crypto provider already installed");
    }

    metrics::register_metrics()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server_state = Arc::new(ServerState::default());
    let server_port = config.metrics_port;
    let server_shutdown = wait_for(shutdown_rx.clone());
    let server = tokio::spawn({
        let state = Arc::clone(&server_state);
        async move {
            if let Err(e) = start_server(server_port, state, server_shutdown).await {
                error!("HTTP server error: {}", e);
            }
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let decks: Arc<dyn ResourceStore<Deck>> = Arc::new(KubeStore::<Deck>::new(client.clone()));
    let configs = Arc::new(KubeConfigStore::new(client.clone()));
    let dealer = Arc::new(CardDealer::new(config.dealer_config()));
    let connector = DeckConnector::new(
        Arc::clone(&configs) as Arc<dyn ConfigStore>,
        Arc::new(ProviderConfigUsageTracker::new(configs)),
        Arc::new(CommonCredentialExtractor::new(Arc::new(KubeSecretReader::new(
            client,
        )))),
        Arc::new(DealerServiceFactory::new(dealer)),
    );

    let reconciler = ManagedReconciler::new(Arc::clone(&decks), Arc::new(connector))
        .with_initializer(NameAsExternalName)
        .with_options(config.reconciler_options());
    let queue = Arc::new(WorkQueue::new(Box::new(default_managed_rate_limiter::<String>(
        config.backoff_base_duration(),
        config.backoff_max_duration(),
        config.rate_limit_qps,
        config.rate_limit_burst,
    ))));
    let controller = Controller::new(reconciler, decks, queue, config.controller_options());

    tokio::spawn(async move {
        shutdown_signal().await;
        // Receivers only disappear once everything has stopped.
        let _ = shutdown_tx.send(true);
    });

    server_state.set_ready(true);
    controller.run(wait_for(shutdown_rx)).await;
    server_state.set_ready(false);

    if let Err(e) = server.await {
        error!("HTTP server task failed: {}", e);
    }
    info!("Cards provider stopped");
    Ok(())
}

async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    // An error means the sender is gone, which is also a shutdown.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
}
