//! Catalog entries that services are created from.

use chrono::{DateTime, Utc};
use hostpool_id::PackageId;
use serde::{Deserialize, Serialize};

use super::Specs;

/// Catalog availability of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    Active,
    Inactive,
}

/// Price of a package as sold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageCost {
    /// Billing provider price reference.
    pub price_ref: String,
    pub price: f64,
    pub currency: String,
    pub symbol: String,
    /// Length of one billing period in days.
    pub days: u32,
}

/// A plan offered to users. Never mutated by provisioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePackage {
    pub id: PackageId,
    pub name: String,
    pub description: String,
    /// Regions a service from this package may be placed in.
    pub regions: Vec<String>,
    /// Server series required to host it.
    pub server_series: String,
    #[serde(default)]
    pub package_series: Option<String>,
    pub specs: Specs,
    pub cost: PackageCost,
    pub status: PackageStatus,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
}

impl ServicePackage {
    /// Active and not past its expiry at `now`.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.status == PackageStatus::Active && self.expires.map_or(true, |e| now < e)
    }

    pub fn serves_region(&self, region: &str) -> bool {
        self.regions.iter().any(|r| r == region)
    }
}
