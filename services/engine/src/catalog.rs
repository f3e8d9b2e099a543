//! Cached service package lookups.

use hostpool_id::PackageId;
use tracing::debug;

use crate::cache::{CacheConfig, TtlLruCache};
use crate::error::{EngineError, EngineResult};
use crate::model::ServicePackage;
use crate::store::Store;

/// Read-through cache over the package catalog.
#[derive(Debug)]
pub struct PackageCache {
    store: Store,
    packages: TtlLruCache<PackageId, ServicePackage>,
}

impl PackageCache {
    pub fn new(store: Store, config: CacheConfig) -> Self {
        Self {
            store,
            packages: TtlLruCache::new(config),
        }
    }

    pub async fn package(&self, id: PackageId) -> EngineResult<ServicePackage> {
        if let Some(package) = self.packages.get(&id) {
            return Ok(package);
        }

        debug!(package_id = %id, "Package cache miss");
        let package: ServicePackage = self
            .store
            .find(&id)
            .await?
            .ok_or_else(|| EngineError::not_found("package", id))?;
        self.packages.insert(id, package.clone());
        Ok(package)
    }

    /// Persist a catalog change and refresh the cached copy.
    pub async fn publish(&self, package: &ServicePackage) -> EngineResult<()> {
        self.store.save(package).await?;
        self.packages.insert(package.id, package.clone());
        Ok(())
    }
}
