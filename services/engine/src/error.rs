//! Engine error taxonomy.
//!
//! Every error is scoped to one request or entity; none is fatal to the
//! process. Allocation and lifecycle errors are returned to the caller, who
//! decides between retry and abandon.

use hostpool_id::{InvoiceId, PackageId, ServerId, ServiceId, UserId};
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::model::{LifecycleAction, ServiceStatus};
use crate::store::StoreError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No server in the candidate pool can fit the request.
    #[error("no capacity available for series '{series}' in region '{region}'")]
    NoCapacityAvailable { region: String, series: String },

    /// The host rejected or did not acknowledge provisioning in time.
    /// The ledger commitment has been rolled back.
    #[error("provisioning of {service_id} on {server_id} failed: {reason}")]
    ProvisioningFailed {
        service_id: ServiceId,
        server_id: ServerId,
        reason: String,
    },

    /// Another provisioning request for the same service holds a commitment.
    #[error("service {service_id} is already being provisioned on {server_id}")]
    ProvisioningInProgress {
        service_id: ServiceId,
        server_id: ServerId,
    },

    /// A store write failed; the transition was not applied.
    #[error("persistence failed: {0}")]
    PersistenceFailed(#[from] StoreError),

    /// The billing provider could not be consulted; the stored status is kept.
    #[error("reconciliation of invoice {invoice_id} unavailable: {reason}")]
    ReconciliationUnavailable {
        invoice_id: InvoiceId,
        reason: String,
    },

    /// The requested state change is not permitted from the current status.
    #[error("cannot {action} service {service_id} while {from}")]
    InvalidTransition {
        service_id: ServiceId,
        from: ServiceStatus,
        action: LifecycleAction,
    },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("package {0} is not available")]
    PackageUnavailable(PackageId),

    #[error("package {package_id} is not offered in region '{region}'")]
    RegionNotEligible {
        package_id: PackageId,
        region: String,
    },

    #[error("service {service_id} is priced in {service_currency} but its server costs {server_currency}")]
    CurrencyMismatch {
        service_id: ServiceId,
        service_currency: String,
        server_currency: String,
    },

    #[error("invoice {invoice_id} does not belong to user {user_id}")]
    InvoiceOwnerMismatch {
        invoice_id: InvoiceId,
        user_id: UserId,
    },

    #[error("user {0} is not authorized to perform this action")]
    Forbidden(UserId),

    #[error("server {server_id} still hosts {services} service(s)")]
    ServerInUse { server_id: ServerId, services: usize },

    /// The capacity ledger refused the change, e.g. a server update that
    /// would leave less capacity than is committed on it.
    #[error(transparent)]
    Capacity(#[from] LedgerError),

    #[error("suspension of service {service_id} ends before it starts")]
    InvalidSuspension { service_id: ServiceId },
}

impl EngineError {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Returns true if repeating the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NoCapacityAvailable { .. }
            | Self::ProvisioningFailed { .. }
            | Self::ProvisioningInProgress { .. }
            | Self::ReconciliationUnavailable { .. } => true,
            Self::PersistenceFailed(err) => !err.is_rejection(),
            _ => false,
        }
    }
}
