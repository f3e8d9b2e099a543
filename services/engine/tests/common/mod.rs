//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hostpool_engine::billing::MockBillingProvider;
use hostpool_engine::host::MockHostClient;
use hostpool_engine::model::{
    BillingDuration, PackageCost, PackageStatus, Pricing, ProviderInfo, Role, Server, Service,
    ServicePackage, ServiceStatus, Specs, User,
};
use hostpool_engine::store::{MemoryStore, Store};
use hostpool_engine::{Engine, EngineSettings};
use hostpool_id::{PackageId, ServerId, ServiceId, Ulid, UserId};

pub const CAPACITY: Specs = Specs::new(16, 4, 100, 1000);
pub const HALF: Specs = Specs::new(8, 2, 50, 500);

pub fn usd(price: f64) -> Pricing {
    Pricing {
        price,
        currency: "usd".to_string(),
        symbol: "$".to_string(),
        duration: BillingDuration::months(1),
        billing_start: Utc::now(),
    }
}

/// A server whose ID sorts after every server with a smaller `n`.
pub fn server(n: u64, specs: Specs) -> Server {
    Server {
        id: ServerId::from_ulid(Ulid::from_parts(1_700_000_000_000 + n, 0)),
        name: format!("node-{n}"),
        address: format!("10.0.0.{n}"),
        port: 8443,
        region: "us-east".to_string(),
        series: "epyc".to_string(),
        provider: ProviderInfo {
            name: "colo".to_string(),
            url: "https://colo.example".to_string(),
            api_endpoint: format!("https://10.0.0.{n}:8443"),
            machine_id: format!("m-{n}"),
        },
        specs,
        cost: usd(100.0),
        available: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn service(specs: Specs) -> Service {
    Service {
        id: ServiceId::new(),
        name: "web".to_string(),
        user: UserId::new(),
        series: "epyc".to_string(),
        region: "us-east".to_string(),
        package: PackageId::new(),
        specs,
        pricing: usd(5.0),
        status: ServiceStatus::Pending,
        suspended: None,
        active_invoice: None,
        server: None,
        service_address: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn package(specs: Specs) -> ServicePackage {
    ServicePackage {
        id: PackageId::new(),
        name: "Starter".to_string(),
        description: "Small VPS".to_string(),
        regions: vec!["us-east".to_string()],
        server_series: "epyc".to_string(),
        package_series: None,
        specs,
        cost: PackageCost {
            price_ref: "price_starter".to_string(),
            price: 5.0,
            currency: "usd".to_string(),
            symbol: "$".to_string(),
            days: 30,
        },
        status: PackageStatus::Active,
        expires: None,
    }
}

pub fn user(role: Role) -> User {
    User {
        id: UserId::new(),
        name: "Grace".to_string(),
        email: "grace@example.com".to_string(),
        role,
        billing_customer: Some("cus_123".to_string()),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub struct Harness {
    pub memory: Arc<MemoryStore>,
    pub store: Store,
    pub host: Arc<MockHostClient>,
    pub billing: Arc<MockBillingProvider>,
    pub engine: Engine,
}

impl Harness {
    /// Build an engine over `memory`, which may already hold documents.
    pub async fn build(
        memory: Arc<MemoryStore>,
        host: MockHostClient,
        settings: EngineSettings,
    ) -> Self {
        let store = Store::from_arc(memory.clone());
        let host = Arc::new(host);
        let billing = Arc::new(MockBillingProvider::new());
        let engine = Engine::build(store.clone(), host.clone(), billing.clone(), settings)
            .await
            .unwrap();

        Self {
            memory,
            store,
            host,
            billing,
            engine,
        }
    }

    pub async fn new() -> Self {
        Self::build(
            Arc::new(MemoryStore::new()),
            MockHostClient::new(),
            EngineSettings::default(),
        )
        .await
    }

    pub async fn with_host(host: MockHostClient) -> Self {
        Self::build(Arc::new(MemoryStore::new()), host, EngineSettings::default()).await
    }
}

pub fn short_timeout() -> EngineSettings {
    EngineSettings {
        provision_timeout: Duration::from_millis(20),
        ..Default::default()
    }
}
