//! Entity types persisted by the engine.
//!
//! These are plain data: behavior lives in the components that take them as
//! parameters (ledger, selector, lifecycle, cost, reconciler).

mod invoice;
mod package;
mod pricing;
mod server;
mod service;
mod specs;
mod user;

pub use invoice::{Invoice, InvoiceStatus};
pub use package::{PackageCost, PackageStatus, ServicePackage};
pub use pricing::{BillingDuration, DurationUnit, Pricing};
pub use server::{ProviderInfo, Server};
pub use service::{LifecycleAction, Service, ServiceStatus, SuspensionRecord};
pub use specs::{Resource, Specs};
pub use user::{Role, User};

use crate::store::Document;

impl Document for Server {
    const COLLECTION: &'static str = "servers";

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Document for Service {
    const COLLECTION: &'static str = "services";

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Document for ServicePackage {
    const COLLECTION: &'static str = "packages";

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Document for Invoice {
    const COLLECTION: &'static str = "invoices";

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Document for User {
    const COLLECTION: &'static str = "users";

    fn key(&self) -> String {
        self.id.to_string()
    }
}
