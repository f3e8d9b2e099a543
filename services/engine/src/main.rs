//! hostpool engine
//!
//! Composition root: loads configuration, opens the store, rebuilds the
//! capacity ledger and runs the invoice reconciliation and server
//! availability workers until interrupted.

use std::sync::Arc;

use anyhow::Result;
use hostpool_engine::{
    billing::{BillingProvider, MockBillingProvider, StripeInvoiceClient},
    config,
    host::{HostManagementClient, HttpHostClient, MockHostClient},
    store::{MemoryStore, PgDocumentStore, Store},
    Engine, EngineSettings,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Prefer RUST_LOG, fall back to HOSTPOOL_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting hostpool engine");
    info!(
        dev_mode = config.dev_mode,
        production = config.production,
        markup = config.markup.rate(),
        "Configuration loaded"
    );

    let store = match &config.database {
        Some(db_config) => {
            let pg = match PgDocumentStore::connect(db_config).await {
                Ok(pg) => pg,
                Err(e) => {
                    error!(error = %e, "Failed to connect to database");
                    return Err(e.into());
                }
            };

            if config.dev_mode {
                info!("Running database migrations (dev mode)");
                if let Err(e) = pg.run_migrations().await {
                    error!(error = %e, "Failed to run migrations");
                    return Err(e.into());
                }
            }
            Store::new(pg)
        }
        None => {
            warn!("No DATABASE_URL configured; using the in-memory store");
            Store::new(MemoryStore::new())
        }
    };

    let host: Arc<dyn HostManagementClient> = if config.dev_mode {
        info!("Using in-process host client (dev mode)");
        Arc::new(MockHostClient::new())
    } else {
        Arc::new(HttpHostClient::new(config.provision_timeout)?)
    };

    let billing: Arc<dyn BillingProvider> = match &config.billing {
        Some(billing_config) => Arc::new(StripeInvoiceClient::new(billing_config)?),
        None => {
            info!("Using in-process billing provider (dev mode)");
            Arc::new(MockBillingProvider::new())
        }
    };

    let engine = Engine::build(store, host, billing, EngineSettings::from(&config)).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reconcile_worker = engine.reconcile_worker(config.reconcile_interval);
    let reconcile_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            reconcile_worker.run(shutdown_rx).await;
        }
    });

    let availability_worker = engine.availability_worker(config.availability_interval);
    let availability_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            availability_worker.run(shutdown_rx).await;
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);

    info!("Waiting for workers to shut down...");
    let shutdown_timeout = std::time::Duration::from_secs(10);

    if let Err(e) = tokio::time::timeout(shutdown_timeout, reconcile_handle).await {
        warn!(error = %e, "Reconcile worker did not shut down in time");
    }

    if let Err(e) = tokio::time::timeout(shutdown_timeout, availability_handle).await {
        warn!(error = %e, "Availability worker did not shut down in time");
    }

    info!("Engine shutdown complete");
    Ok(())
}
