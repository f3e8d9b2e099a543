//! Identity cache and authorization checks.
//!
//! Authenticated principals are read through a bounded TTL cache. Updates
//! made through this cache overwrite the local entry; updates made elsewhere
//! (another process, a direct store write) become visible only once the
//! entry expires or a caller asks for [`IdentityCache::fetch_fresh`]. Role
//! checks may therefore see a principal up to one TTL old.
//!
//! Deleting a principal evicts it synchronously: loads that could re-cache
//! the deleted account wait for the delete to finish.

use hostpool_id::UserId;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::cache::{CacheConfig, TtlLruCache};
use crate::error::{EngineError, EngineResult};
use crate::model::{Service, User};
use crate::store::Store;

/// Cached principal lookups.
#[derive(Debug)]
pub struct IdentityCache {
    store: Store,
    users: TtlLruCache<UserId, User>,
    /// Shared by loads, exclusive for deletes.
    loads: RwLock<()>,
}

impl IdentityCache {
    pub fn new(store: Store, config: CacheConfig) -> Self {
        Self {
            store,
            users: TtlLruCache::new(config),
            loads: RwLock::new(()),
        }
    }

    /// The principal for `id`: cached if fresh, otherwise loaded and cached.
    #[instrument(skip(self))]
    pub async fn principal(&self, id: UserId) -> EngineResult<User> {
        if let Some(user) = self.users.get(&id) {
            debug!("Identity cache hit");
            return Ok(user);
        }

        debug!("Identity cache miss");
        self.fetch_fresh(id).await
    }

    /// Load `id` from the store, bypassing and then refreshing the cache.
    pub async fn fetch_fresh(&self, id: UserId) -> EngineResult<User> {
        let _load = self.loads.read().await;
        let user: User = self
            .store
            .find(&id)
            .await?
            .ok_or_else(|| EngineError::not_found("user", id))?;
        self.users.insert(id, user.clone());
        Ok(user)
    }

    /// Persist `user` and overwrite this cache's copy.
    pub async fn update_principal(&self, user: &User) -> EngineResult<()> {
        self.store.save(user).await?;
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    /// Delete the account and evict its cache entry.
    ///
    /// No load runs while the delete is in flight, and the entry is evicted
    /// once the store delete has completed.
    #[instrument(skip(self))]
    pub async fn delete_principal(&self, id: UserId) -> EngineResult<bool> {
        let _exclusive = self.loads.write().await;
        self.users.invalidate(&id);
        let deleted = self.store.delete::<User>(&id).await;
        self.users.invalidate(&id);
        Ok(deleted?)
    }

    /// Drop the cached entry for `id` without touching the store.
    pub fn evict(&self, id: UserId) -> bool {
        self.users.invalidate(&id)
    }
}

/// Admins only.
pub fn require_admin(principal: &User) -> EngineResult<()> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(EngineError::Forbidden(principal.id))
    }
}

/// The service's owner, or an admin.
pub fn require_owner(principal: &User, service: &Service) -> EngineResult<()> {
    if principal.is_admin() || principal.id == service.user {
        Ok(())
    } else {
        Err(EngineError::Forbidden(principal.id))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::lifecycle::tests::pending_service;
    use crate::model::{Role, Specs};
    use crate::store::{DocumentStore, MemoryStore, StoreResult};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::Value;
    use std::time::Duration;

    /// Memory store whose deletes take a while to land.
    struct SlowDeletes {
        inner: MemoryStore,
        delay: Duration,
    }

    #[async_trait]
    impl DocumentStore for SlowDeletes {
        async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Value>> {
            self.inner.get(collection, id).await
        }

        async fn scan(&self, collection: &str) -> StoreResult<Vec<Value>> {
            self.inner.scan(collection).await
        }

        async fn put(&self, collection: &str, id: &str, body: Value) -> StoreResult<()> {
            self.inner.put(collection, id, body).await
        }

        async fn remove(&self, collection: &str, id: &str) -> StoreResult<bool> {
            tokio::time::sleep(self.delay).await;
            self.inner.remove(collection, id).await
        }
    }

    pub(crate) fn user(role: Role) -> User {
        User {
            id: UserId::new(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            role,
            billing_customer: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_require_admin() {
        assert!(require_admin(&user(Role::Admin)).is_ok());
        assert!(matches!(
            require_admin(&user(Role::User)),
            Err(EngineError::Forbidden(_))
        ));
    }

    #[test]
    fn test_require_owner() {
        let owner = user(Role::User);
        let stranger = user(Role::User);
        let admin = user(Role::Admin);
        let mut service = pending_service(Specs::new(1, 1, 1, 1));
        service.user = owner.id;

        assert!(require_owner(&owner, &service).is_ok());
        assert!(require_owner(&admin, &service).is_ok());
        assert!(require_owner(&stranger, &service).is_err());
    }

    #[tokio::test]
    async fn test_missing_principal_is_not_found() {
        let cache = IdentityCache::new(
            Store::new(MemoryStore::new()),
            CacheConfig::new(8, Duration::from_secs(60)),
        );
        let err = cache.principal(UserId::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { kind: "user", .. }));
    }

    #[tokio::test]
    async fn test_lookup_during_delete_does_not_recache() {
        let store = Store::new(SlowDeletes {
            inner: MemoryStore::new(),
            delay: Duration::from_millis(50),
        });
        let cache = IdentityCache::new(store.clone(), CacheConfig::new(8, Duration::from_secs(60)));
        let admin = user(Role::Admin);
        store.save(&admin).await.unwrap();
        cache.principal(admin.id).await.unwrap();

        let (deleted, during) = tokio::join!(cache.delete_principal(admin.id), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cache.principal(admin.id).await
        });

        assert!(deleted.unwrap());
        assert!(matches!(during, Err(EngineError::NotFound { .. })));
        assert!(matches!(
            cache.principal(admin.id).await,
            Err(EngineError::NotFound { .. })
        ));
        assert!(cache.users.is_empty());
    }
}
