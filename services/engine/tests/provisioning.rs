//! Integration tests for placement and provisioning.
//!
//! Covers first-fit selection over the candidate pool, exact-fit and
//! over-capacity requests, and rollback of the capacity commitment when the
//! host refuses, times out, or the request is dropped mid-flight.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{server, service, short_timeout, Harness, CAPACITY, HALF};
use hostpool_engine::host::{HostCall, MockHostClient};
use hostpool_engine::model::{Server, Service, ServiceStatus, Specs};
use hostpool_engine::store::{MemoryStore, Store};
use hostpool_engine::{EngineError, EngineSettings};

/// A server at half capacity, persisted together with the service using it.
async fn half_full_store() -> (Arc<MemoryStore>, Server) {
    let memory = Arc::new(MemoryStore::new());
    let store = Store::from_arc(memory.clone());

    let host = server(1, CAPACITY);
    let mut existing = service(HALF);
    existing.status = ServiceStatus::Active;
    existing.server = Some(host.id);

    store.save(&host).await.unwrap();
    store.save(&existing).await.unwrap();
    (memory, host)
}

#[tokio::test]
async fn test_exact_fit_is_accepted() {
    let (memory, host) = half_full_store().await;
    let h = Harness::build(memory, MockHostClient::new(), EngineSettings::default()).await;

    let mut request = service(HALF);
    h.store.save(&request).await.unwrap();

    let server_id = h.engine.lifecycle().provision(&mut request).await.unwrap();

    assert_eq!(server_id, host.id);
    assert_eq!(request.status, ServiceStatus::Installing);
    let usage = h.engine.inventory().usage(host.id).await.unwrap();
    assert_eq!(usage.residual, Specs::ZERO);
    assert_eq!(usage.services, 2);
}

#[tokio::test]
async fn test_one_unit_over_is_no_capacity() {
    let (memory, host) = half_full_store().await;
    let h = Harness::build(memory, MockHostClient::new(), EngineSettings::default()).await;

    let mut request = service(Specs::new(9, 2, 50, 500));
    h.store.save(&request).await.unwrap();
    let writes = h.memory.writes("services").await;

    let err = h.engine.lifecycle().provision(&mut request).await.unwrap_err();

    assert!(matches!(err, EngineError::NoCapacityAvailable { .. }));
    assert!(err.is_retryable());
    assert_eq!(request.status, ServiceStatus::Pending);
    assert_eq!(h.memory.writes("services").await, writes);
    assert!(h.host.calls().is_empty());
    assert_eq!(h.engine.ledger().commitments(host.id), 1);
}

#[tokio::test]
async fn test_first_fit_skips_small_and_unavailable_servers() {
    let h = Harness::new().await;

    let small = server(1, Specs::new(4, 1, 10, 100));
    let mut offline = server(2, CAPACITY);
    offline.available = false;
    let mut elsewhere = server(3, CAPACITY);
    elsewhere.region = "eu-west".to_string();
    let first_fit = server(4, CAPACITY);
    let later = server(5, CAPACITY);
    for s in [&later, &first_fit, &elsewhere, &offline, &small] {
        h.engine.inventory().register_server(s).await.unwrap();
    }

    let mut request = service(HALF);
    let chosen = h.engine.lifecycle().provision(&mut request).await.unwrap();
    assert_eq!(chosen, first_fit.id);

    // first-fit keeps packing the earlier server until it is full
    let mut second = service(HALF);
    assert_eq!(
        h.engine.lifecycle().provision(&mut second).await.unwrap(),
        first_fit.id
    );
    let mut third = service(HALF);
    assert_eq!(
        h.engine.lifecycle().provision(&mut third).await.unwrap(),
        later.id
    );
}

#[tokio::test]
async fn test_empty_pool_is_no_capacity() {
    let h = Harness::new().await;
    let mut request = service(HALF);

    let err = h.engine.lifecycle().provision(&mut request).await.unwrap_err();
    assert!(matches!(err, EngineError::NoCapacityAvailable { .. }));
}

#[tokio::test]
async fn test_host_rejection_rolls_back() {
    let h = Harness::with_host(MockHostClient::failing()).await;
    let host = server(1, CAPACITY);
    h.engine.inventory().register_server(&host).await.unwrap();

    let mut request = service(HALF);
    h.store.save(&request).await.unwrap();

    let err = h.engine.lifecycle().provision(&mut request).await.unwrap_err();

    assert!(matches!(err, EngineError::ProvisioningFailed { .. }));
    assert_eq!(request.status, ServiceStatus::Pending);
    assert_eq!(request.server, None);
    assert_eq!(h.engine.ledger().commitments(host.id), 0);

    let stored: Service = h.store.find(&request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ServiceStatus::Pending);
}

#[tokio::test]
async fn test_host_timeout_rolls_back() {
    let h = Harness::build(
        Arc::new(MemoryStore::new()),
        MockHostClient::with_provision_delay(Duration::from_millis(500)),
        short_timeout(),
    )
    .await;
    let host = server(1, CAPACITY);
    h.engine.inventory().register_server(&host).await.unwrap();

    let mut request = service(HALF);
    let err = h.engine.lifecycle().provision(&mut request).await.unwrap_err();

    match err {
        EngineError::ProvisioningFailed { reason, .. } => {
            assert!(reason.contains("did not respond in time"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(request.status, ServiceStatus::Pending);
    assert_eq!(h.engine.ledger().commitments(host.id), 0);

    assert!(h.engine.ledger().can_fit(&host, &CAPACITY));
}

#[tokio::test]
async fn test_dropped_request_releases_capacity() {
    let h = Harness::with_host(MockHostClient::with_provision_delay(Duration::from_secs(5))).await;
    let host = server(1, CAPACITY);
    h.engine.inventory().register_server(&host).await.unwrap();

    let mut request = service(HALF);
    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        h.engine.lifecycle().provision(&mut request),
    )
    .await;

    assert!(outcome.is_err(), "provisioning should still be waiting on the host");
    assert!(!h.engine.ledger().is_committed(host.id, request.id));
    assert_eq!(request.status, ServiceStatus::Pending);
    assert!(matches!(h.host.calls()[0], HostCall::Provision { .. }));
}

#[tokio::test]
async fn test_concurrent_requests_never_oversell() {
    let h = Harness::with_host(MockHostClient::with_provision_delay(Duration::from_millis(10))).await;
    let host = server(1, CAPACITY);
    h.engine.inventory().register_server(&host).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = h.engine.clone();
            tokio::spawn(async move {
                let mut request = service(HALF);
                engine.lifecycle().provision(&mut request).await
            })
        })
        .collect();

    let mut placed = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(EngineError::NoCapacityAvailable { .. }) => refused += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(placed, 2);
    assert_eq!(refused, 6);
    let usage = h.engine.ledger().usage(&host);
    assert!(usage.committed.fits_within(&host.specs));
    assert_eq!(usage.committed, CAPACITY);
}

#[tokio::test]
async fn test_zero_dimension_accepts_zero_request() {
    let h = Harness::new().await;
    let host = server(1, Specs::new(16, 4, 0, 1000));
    h.engine.inventory().register_server(&host).await.unwrap();

    let mut request = service(Specs::new(8, 2, 0, 500));
    assert_eq!(
        h.engine.lifecycle().provision(&mut request).await.unwrap(),
        host.id
    );

    let mut needs_disk = service(Specs::new(1, 1, 1, 1));
    assert!(matches!(
        h.engine.lifecycle().provision(&mut needs_disk).await,
        Err(EngineError::NoCapacityAvailable { .. })
    ));
}

#[tokio::test]
async fn test_decommission_waits_for_services() {
    let h = Harness::new().await;
    let host = server(1, CAPACITY);
    h.engine.inventory().register_server(&host).await.unwrap();

    let mut request = service(HALF);
    h.engine.lifecycle().provision(&mut request).await.unwrap();
    assert!(matches!(
        h.engine.inventory().decommission_server(host.id).await,
        Err(EngineError::ServerInUse { services: 1, .. })
    ));

    h.engine.lifecycle().terminate(&mut request).await.unwrap();
    h.engine.inventory().decommission_server(host.id).await.unwrap();
}
