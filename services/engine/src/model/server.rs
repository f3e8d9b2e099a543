//! Physical servers that host services.

use chrono::{DateTime, Utc};
use hostpool_id::ServerId;
use serde::{Deserialize, Serialize};

use super::{Pricing, Specs};

/// Where and how the host's management endpoint is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub url: String,
    /// Base URL of the host management API.
    pub api_endpoint: String,
    pub machine_id: String,
}

/// A machine with fixed capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: ServerId,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub region: String,
    /// Hardware class; packages require a specific series.
    pub series: String,
    pub provider: ProviderInfo,
    /// Total capacity.
    pub specs: Specs,
    pub cost: Pricing,
    /// Whether new services may be placed here.
    pub available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Server {
    /// True if the server is in the candidate pool for `region`/`series`.
    pub fn is_candidate(&self, region: &str, series: &str) -> bool {
        self.available && self.region == region && self.series == series
    }
}
