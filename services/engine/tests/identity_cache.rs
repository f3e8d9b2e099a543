//! Integration tests for the identity cache's staleness window.
//!
//! A principal changed by someone other than the cache's owner stays stale
//! for up to one TTL; these tests pin that behavior down.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{service, user, Harness, HALF};
use hostpool_engine::cache::CacheConfig;
use hostpool_engine::host::MockHostClient;
use hostpool_engine::identity::{require_admin, require_owner};
use hostpool_engine::model::Role;
use hostpool_engine::store::MemoryStore;
use hostpool_engine::{EngineError, EngineSettings};

async fn harness_with_ttl(ttl: Duration) -> Harness {
    Harness::build(
        Arc::new(MemoryStore::new()),
        MockHostClient::new(),
        EngineSettings {
            identity_cache: CacheConfig::new(16, ttl),
            ..Default::default()
        },
    )
    .await
}

#[tokio::test]
async fn test_third_party_role_change_is_stale_until_ttl() {
    let h = harness_with_ttl(Duration::from_millis(100)).await;
    let mut principal = user(Role::User);
    h.store.save(&principal).await.unwrap();

    let cached = h.engine.identity().principal(principal.id).await.unwrap();
    assert!(require_admin(&cached).is_err());

    // promoted by another process writing straight to the store
    principal.role = Role::Admin;
    h.store.save(&principal).await.unwrap();

    let still_cached = h.engine.identity().principal(principal.id).await.unwrap();
    assert_eq!(still_cached.role, Role::User);
    assert!(matches!(
        require_admin(&still_cached),
        Err(EngineError::Forbidden(_))
    ));

    tokio::time::sleep(Duration::from_millis(150)).await;
    let refreshed = h.engine.identity().principal(principal.id).await.unwrap();
    assert!(require_admin(&refreshed).is_ok());
}

#[tokio::test]
async fn test_fetch_fresh_bypasses_cache() {
    let h = harness_with_ttl(Duration::from_secs(600)).await;
    let mut principal = user(Role::User);
    h.store.save(&principal).await.unwrap();
    h.engine.identity().principal(principal.id).await.unwrap();

    principal.role = Role::Admin;
    h.store.save(&principal).await.unwrap();

    let fresh = h.engine.identity().fetch_fresh(principal.id).await.unwrap();
    assert_eq!(fresh.role, Role::Admin);
    let cached = h.engine.identity().principal(principal.id).await.unwrap();
    assert_eq!(cached.role, Role::Admin);
}

#[tokio::test]
async fn test_own_update_overwrites_cache() {
    let h = harness_with_ttl(Duration::from_secs(600)).await;
    let mut principal = user(Role::User);
    h.store.save(&principal).await.unwrap();
    h.engine.identity().principal(principal.id).await.unwrap();

    principal.email = "new@example.com".to_string();
    h.engine.identity().update_principal(&principal).await.unwrap();

    let cached = h.engine.identity().principal(principal.id).await.unwrap();
    assert_eq!(cached.email, "new@example.com");
}

#[tokio::test]
async fn test_delete_evicts_synchronously() {
    let h = harness_with_ttl(Duration::from_secs(600)).await;
    let principal = user(Role::Admin);
    h.store.save(&principal).await.unwrap();
    h.engine.identity().principal(principal.id).await.unwrap();

    assert!(h.engine.identity().delete_principal(principal.id).await.unwrap());

    assert!(matches!(
        h.engine.identity().principal(principal.id).await,
        Err(EngineError::NotFound { kind: "user", .. })
    ));
}

#[tokio::test]
async fn test_owner_check_uses_cached_principal() {
    let h = harness_with_ttl(Duration::from_secs(600)).await;
    let owner = user(Role::User);
    h.store.save(&owner).await.unwrap();
    let mut svc = service(HALF);
    svc.user = owner.id;

    let principal = h.engine.identity().principal(owner.id).await.unwrap();
    assert!(require_owner(&principal, &svc).is_ok());

    let stranger = user(Role::User);
    assert!(require_owner(&stranger, &svc).is_err());
}
