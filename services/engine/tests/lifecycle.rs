//! Integration tests for service lifecycle transitions.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{package, server, service, Harness, CAPACITY, HALF};
use hostpool_engine::host::{HostCall, MockHostClient};
use hostpool_engine::lifecycle::{expired_suspensions, ProvisionRequest};
use hostpool_engine::model::{
    DurationUnit, PackageStatus, Service, ServiceStatus, Specs, SuspensionRecord,
};
use hostpool_engine::EngineError;
use hostpool_id::UserId;

fn suspension(hours_from_now: i64) -> SuspensionRecord {
    SuspensionRecord {
        suspension_start: Utc::now() - ChronoDuration::hours(48),
        suspension_end: Utc::now() + ChronoDuration::hours(hours_from_now),
        suspended_by: UserId::new(),
        suspended_for: "payment overdue".to_string(),
    }
}

fn request(package: &hostpool_engine::model::ServicePackage, region: &str) -> ProvisionRequest {
    ProvisionRequest {
        user: UserId::new(),
        package: package.id,
        name: "db-1".to_string(),
        region: region.to_string(),
    }
}

#[tokio::test]
async fn test_create_pending_from_package() {
    let h = Harness::new().await;
    let pkg = package(Specs::new(4, 1, 25, 250));
    h.engine.packages().publish(&pkg).await.unwrap();

    let created = h
        .engine
        .lifecycle()
        .create_pending(request(&pkg, "us-east"))
        .await
        .unwrap();

    assert_eq!(created.status, ServiceStatus::Pending);
    assert_eq!(created.specs, pkg.specs);
    assert_eq!(created.series, "epyc");
    assert_eq!(created.pricing.price, 5.0);
    assert_eq!(created.pricing.duration.amount, 30);
    assert_eq!(created.pricing.duration.unit, DurationUnit::Day);
    assert!(created.server.is_none());

    let stored: Service = h.store.find(&created.id).await.unwrap().unwrap();
    assert_eq!(stored, created);
}

#[tokio::test]
async fn test_create_pending_rejects_ineligible_packages() {
    let h = Harness::new().await;

    let mut inactive = package(HALF);
    inactive.status = PackageStatus::Inactive;
    let mut expired = package(HALF);
    expired.expires = Some(Utc::now() - ChronoDuration::days(1));
    let regional = package(HALF);
    for pkg in [&inactive, &expired, &regional] {
        h.engine.packages().publish(pkg).await.unwrap();
    }

    for pkg in [&inactive, &expired] {
        assert!(matches!(
            h.engine.lifecycle().create_pending(request(pkg, "us-east")).await,
            Err(EngineError::PackageUnavailable(_))
        ));
    }
    assert!(matches!(
        h.engine
            .lifecycle()
            .create_pending(request(&regional, "ap-south"))
            .await,
        Err(EngineError::RegionNotEligible { .. })
    ));

    let missing = package(HALF);
    assert!(matches!(
        h.engine.lifecycle().create_pending(request(&missing, "us-east")).await,
        Err(EngineError::NotFound { kind: "package", .. })
    ));
}

#[tokio::test]
async fn test_full_lifecycle_keeps_capacity_until_terminated() {
    let h = Harness::new().await;
    let host = server(1, CAPACITY);
    h.engine.inventory().register_server(&host).await.unwrap();
    let lifecycle = h.engine.lifecycle();
    let ledger = h.engine.ledger();

    let mut svc = service(HALF);
    lifecycle.provision(&mut svc).await.unwrap();
    lifecycle
        .activate(&mut svc, Some("203.0.113.7".to_string()))
        .await
        .unwrap();
    assert!(svc.is_running());

    lifecycle.stop(&mut svc).await.unwrap();
    assert!(ledger.is_committed(host.id, svc.id));
    lifecycle.start(&mut svc).await.unwrap();

    lifecycle.suspend(&mut svc, suspension(24)).await.unwrap();
    assert_eq!(svc.status, ServiceStatus::Suspended);
    assert!(ledger.is_committed(host.id, svc.id));
    lifecycle.resume(&mut svc).await.unwrap();
    assert!(svc.suspended.is_none());

    lifecycle.terminate(&mut svc).await.unwrap();
    assert_eq!(svc.status, ServiceStatus::Terminated);
    assert!(!ledger.is_committed(host.id, svc.id));
    assert_eq!(
        h.host.calls().last(),
        Some(&HostCall::Deprovision {
            server_id: host.id,
            service_id: svc.id
        })
    );

    let stored: Service = h.store.find(&svc.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ServiceStatus::Terminated);
}

#[tokio::test]
async fn test_terminate_survives_deprovision_failure() {
    let host_client = MockHostClient::new();
    host_client.set_fail_deprovision(true);
    let h = Harness::with_host(host_client).await;
    let host = server(1, CAPACITY);
    h.engine.inventory().register_server(&host).await.unwrap();

    let mut svc = service(HALF);
    h.engine.lifecycle().provision(&mut svc).await.unwrap();
    h.engine.lifecycle().terminate(&mut svc).await.unwrap();

    assert_eq!(svc.status, ServiceStatus::Terminated);
    assert_eq!(h.engine.ledger().commitments(host.id), 0);
}

#[tokio::test]
async fn test_terminate_pending_has_no_host_side_effects() {
    let h = Harness::new().await;
    let mut svc = service(HALF);

    h.engine.lifecycle().terminate(&mut svc).await.unwrap();
    assert_eq!(svc.status, ServiceStatus::Terminated);
    assert!(h.host.calls().is_empty());
}

#[tokio::test]
async fn test_terminated_service_rejects_everything_else() {
    let h = Harness::new().await;
    let lifecycle = h.engine.lifecycle();
    let mut svc = service(HALF);
    lifecycle.terminate(&mut svc).await.unwrap();

    assert!(matches!(
        lifecycle.start(&mut svc).await,
        Err(EngineError::InvalidTransition { .. })
    ));
    assert!(matches!(
        lifecycle.resume(&mut svc).await,
        Err(EngineError::InvalidTransition { .. })
    ));
    assert!(matches!(
        lifecycle.suspend(&mut svc, suspension(1)).await,
        Err(EngineError::InvalidTransition { .. })
    ));
    assert!(lifecycle.terminate(&mut svc).await.is_ok());
    assert_eq!(svc.status, ServiceStatus::Terminated);
}

#[tokio::test]
async fn test_invalid_transition_has_no_side_effects() {
    let h = Harness::new().await;
    let mut svc = service(HALF);
    h.store.save(&svc).await.unwrap();
    let writes = h.memory.writes("services").await;

    let err = h.engine.lifecycle().stop(&mut svc).await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(svc.status, ServiceStatus::Pending);
    assert_eq!(h.memory.writes("services").await, writes);
}

#[tokio::test]
async fn test_persistence_failure_is_reported() {
    let h = Harness::new().await;
    let host = server(1, CAPACITY);
    h.engine.inventory().register_server(&host).await.unwrap();
    let mut svc = service(HALF);
    h.engine.lifecycle().provision(&mut svc).await.unwrap();

    h.memory.set_fail_writes(true);
    let err = h.engine.lifecycle().terminate(&mut svc).await.unwrap_err();

    assert!(matches!(err, EngineError::PersistenceFailed(_)));
    assert!(err.is_retryable());
    assert_eq!(svc.status, ServiceStatus::Installing);
    assert!(h.engine.ledger().is_committed(host.id, svc.id));

    h.memory.set_fail_writes(false);
    h.engine.lifecycle().terminate(&mut svc).await.unwrap();
    assert!(!h.engine.ledger().is_committed(host.id, svc.id));
}

#[tokio::test]
async fn test_lapsed_suspension_is_listed_not_resumed() {
    let h = Harness::new().await;
    let mut svc = service(HALF);
    svc.status = ServiceStatus::Active;
    h.engine
        .lifecycle()
        .suspend(&mut svc, suspension(-1))
        .await
        .unwrap();

    let lapsed = expired_suspensions(&h.store, Utc::now()).await.unwrap();
    assert_eq!(lapsed.len(), 1);
    assert_eq!(lapsed[0].status, ServiceStatus::Suspended);

    let reloaded = h.engine.lifecycle().service(svc.id).await.unwrap();
    assert_eq!(reloaded.status, ServiceStatus::Suspended);
}
