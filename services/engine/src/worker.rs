//! Background workers.
//!
//! Both workers run a single pass per interval tick until the shutdown
//! channel flips to `true`. A failed pass is logged and the loop continues.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::billing::InvoiceReconciler;
use crate::error::EngineResult;
use crate::host::HostManagementClient;
use crate::inventory::Inventory;
use crate::model::Server;
use crate::store::Store;

/// Periodically reconciles every open invoice.
pub struct ReconcileWorker {
    reconciler: Arc<InvoiceReconciler>,
    interval: Duration,
}

impl ReconcileWorker {
    pub fn new(reconciler: Arc<InvoiceReconciler>, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
        }
    }

    /// Run until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting invoice reconcile worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        // the first tick completes immediately; wait a full interval instead
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.reconciler.reconcile_all().await {
                        error!(error = %e, "Invoice reconciliation pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Invoice reconcile worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Outcome of one availability pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AvailabilityStats {
    pub servers_checked: u32,
    pub servers_changed: u32,
    pub probes_failed: u32,
    /// Availability changes that could not be stored.
    pub updates_failed: u32,
}

/// Periodically probes every server and records whether it is available.
pub struct AvailabilityWorker {
    store: Store,
    inventory: Inventory,
    host: Arc<dyn HostManagementClient>,
    interval: Duration,
}

impl AvailabilityWorker {
    pub fn new(
        store: Store,
        inventory: Inventory,
        host: Arc<dyn HostManagementClient>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            inventory,
            host,
            interval,
        }
    }

    /// Run until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting availability worker"
        );

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.refresh().await {
                        error!(error = %e, "Availability pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Availability worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Probe every server once. An unreachable server is marked unavailable.
    ///
    /// A failed update of one server is logged and does not stop the pass.
    pub async fn refresh(&self) -> EngineResult<AvailabilityStats> {
        let mut stats = AvailabilityStats::default();
        let servers: Vec<Server> = self.store.list().await?;

        for server in servers {
            stats.servers_checked += 1;
            let available = match self.host.is_available(&server).await {
                Ok(available) => available,
                Err(e) => {
                    warn!(server_id = %server.id, error = %e, "Availability probe failed");
                    stats.probes_failed += 1;
                    false
                }
            };

            if available != server.available {
                match self.inventory.set_availability(server.id, available).await {
                    Ok(_) => stats.servers_changed += 1,
                    Err(e) => {
                        warn!(server_id = %server.id, error = %e, "Failed to record availability");
                        stats.updates_failed += 1;
                    }
                }
            }
        }

        if stats.servers_changed > 0 || stats.updates_failed > 0 {
            info!(
                servers_checked = stats.servers_checked,
                servers_changed = stats.servers_changed,
                updates_failed = stats.updates_failed,
                "Availability refreshed"
            );
        }

        Ok(stats)
    }
}
