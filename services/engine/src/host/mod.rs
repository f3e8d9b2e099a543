//! Host management endpoint.
//!
//! The lifecycle talks to the machine hosting a service through
//! [`HostManagementClient`]: begin provisioning, deprovision, and an
//! availability probe. [`HttpHostClient`] calls the host's management API;
//! [`MockHostClient`] stands in for it in tests and dev mode.

mod http;
mod mock;

pub use http::HttpHostClient;
pub use mock::{HostCall, MockHostClient};

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Server, Service};

/// Errors from a host management endpoint.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The host answered and refused the request.
    #[error("host rejected request: {0}")]
    Rejected(String),

    /// The host could not be reached.
    #[error("host unreachable: {0}")]
    Unreachable(String),

    /// The host did not answer in time.
    #[error("host did not respond in time")]
    Timeout,
}

/// Operations a host server exposes to the engine.
#[async_trait]
pub trait HostManagementClient: Send + Sync {
    /// Ask `server` to start building `service`. Success means the host
    /// acknowledged the request, not that the build finished.
    async fn begin_provisioning(&self, server: &Server, service: &Service)
        -> Result<(), HostError>;

    /// Ask `server` to tear `service` down.
    async fn deprovision(&self, server: &Server, service: &Service) -> Result<(), HostError>;

    /// Whether `server` is reachable and accepting work.
    async fn is_available(&self, server: &Server) -> Result<bool, HostError>;
}
