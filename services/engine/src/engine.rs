//! Composition of the engine's components.
//!
//! Every cache, the ledger and the remote clients are constructed here once
//! and handed to the components that use them.

use std::sync::Arc;
use std::time::Duration;

use crate::billing::{BillingProvider, InvoiceReconciler};
use crate::cache::CacheConfig;
use crate::catalog::PackageCache;
use crate::config::Config;
use crate::cost::{CostApportioner, Markup};
use crate::error::EngineResult;
use crate::host::HostManagementClient;
use crate::identity::IdentityCache;
use crate::inventory::{load_ledger, Inventory};
use crate::ledger::CapacityLedger;
use crate::lifecycle::{ServiceLifecycle, DEFAULT_PROVISION_TIMEOUT};
use crate::store::Store;
use crate::worker::{AvailabilityWorker, ReconcileWorker};

/// Tunables for [`Engine::build`].
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub markup: Markup,
    pub identity_cache: CacheConfig,
    pub package_cache: CacheConfig,
    pub provision_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            markup: Markup::NONE,
            identity_cache: CacheConfig::new(500, Duration::from_secs(15 * 60)),
            package_cache: CacheConfig::new(100, Duration::from_secs(5 * 60)),
            provision_timeout: DEFAULT_PROVISION_TIMEOUT,
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            markup: config.markup,
            identity_cache: config.identity_cache,
            package_cache: config.package_cache,
            provision_timeout: config.provision_timeout,
        }
    }
}

/// Shared engine handle. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: Store,
    ledger: Arc<CapacityLedger>,
    host: Arc<dyn HostManagementClient>,
    lifecycle: ServiceLifecycle,
    reconciler: Arc<InvoiceReconciler>,
    identity: IdentityCache,
    packages: Arc<PackageCache>,
    inventory: Inventory,
    costs: CostApportioner,
}

impl Engine {
    /// Wire every component over `store` and rebuild the ledger from it.
    pub async fn build(
        store: Store,
        host: Arc<dyn HostManagementClient>,
        billing: Arc<dyn BillingProvider>,
        settings: EngineSettings,
    ) -> EngineResult<Self> {
        let ledger = Arc::new(load_ledger(&store).await?);
        let packages = Arc::new(PackageCache::new(store.clone(), settings.package_cache));
        let lifecycle = ServiceLifecycle::new(
            store.clone(),
            Arc::clone(&ledger),
            Arc::clone(&host),
            Arc::clone(&packages),
        )
        .with_provision_timeout(settings.provision_timeout);

        Ok(Self {
            inner: Arc::new(EngineInner {
                reconciler: Arc::new(InvoiceReconciler::new(store.clone(), billing)),
                identity: IdentityCache::new(store.clone(), settings.identity_cache),
                inventory: Inventory::new(store.clone(), Arc::clone(&ledger)),
                costs: CostApportioner::new(settings.markup),
                store,
                ledger,
                host,
                lifecycle,
                packages,
            }),
        })
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn ledger(&self) -> &CapacityLedger {
        &self.inner.ledger
    }

    pub fn lifecycle(&self) -> &ServiceLifecycle {
        &self.inner.lifecycle
    }

    pub fn reconciler(&self) -> &InvoiceReconciler {
        &self.inner.reconciler
    }

    pub fn identity(&self) -> &IdentityCache {
        &self.inner.identity
    }

    pub fn packages(&self) -> &PackageCache {
        &self.inner.packages
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inner.inventory
    }

    pub fn costs(&self) -> &CostApportioner {
        &self.inner.costs
    }

    pub fn reconcile_worker(&self, interval: Duration) -> ReconcileWorker {
        ReconcileWorker::new(Arc::clone(&self.inner.reconciler), interval)
    }

    pub fn availability_worker(&self, interval: Duration) -> AvailabilityWorker {
        AvailabilityWorker::new(
            self.inner.store.clone(),
            self.inner.inventory.clone(),
            Arc::clone(&self.inner.host),
            interval,
        )
    }
}
