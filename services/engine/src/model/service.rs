//! Services and their status vocabulary.
//!
//! A service is a rented virtual instance placed on a server. Its status moves
//! through a fixed transition table:
//!
//! ```text
//! pending -> installing -> active <-> inactive
//! active | installing | inactive -> suspended -> active | terminated
//! pending | installing | active | inactive | suspended -> terminated
//! pending -> cancelled
//! ```
//!
//! `terminated` and `cancelled` are terminal.

use std::fmt;

use chrono::{DateTime, Utc};
use hostpool_id::{InvoiceId, PackageId, ServerId, ServiceId, UserId};
use serde::{Deserialize, Serialize};

use super::{Pricing, Specs};

/// Service status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Pending,
    Installing,
    Active,
    Inactive,
    Suspended,
    Terminated,
    Cancelled,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Installing => "installing",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
            Self::Terminated => "terminated",
            Self::Cancelled => "cancelled",
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated | Self::Cancelled)
    }

    /// Statuses whose specs are committed against the host's capacity.
    ///
    /// `inactive` is included: a stopped service keeps its reservation.
    pub fn holds_capacity(&self) -> bool {
        matches!(
            self,
            Self::Installing | Self::Active | Self::Inactive | Self::Suspended
        )
    }

    /// The status reached by applying `action`, or `None` if not permitted.
    pub fn apply(self, action: LifecycleAction) -> Option<ServiceStatus> {
        use LifecycleAction as A;
        use ServiceStatus::*;

        match (self, action) {
            (Pending, A::Provision) => Some(Installing),
            (Installing, A::Activate) => Some(Active),
            (Active, A::Stop) => Some(Inactive),
            (Inactive, A::Start) => Some(Active),
            (Active | Installing | Inactive, A::Suspend) => Some(Suspended),
            (Suspended, A::Resume) => Some(Active),
            (Pending | Installing | Active | Inactive | Suspended, A::Terminate) => {
                Some(Terminated)
            }
            (Pending, A::Cancel) => Some(Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle operation requested on a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Provision,
    Activate,
    Stop,
    Start,
    Suspend,
    Resume,
    Terminate,
    Cancel,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provision => "provision",
            Self::Activate => "activate",
            Self::Stop => "stop",
            Self::Start => "start",
            Self::Suspend => "suspend",
            Self::Resume => "resume",
            Self::Terminate => "terminate",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why and for how long a service is suspended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspensionRecord {
    pub suspension_start: DateTime<Utc>,
    pub suspension_end: DateTime<Utc>,
    pub suspended_by: UserId,
    pub suspended_for: String,
}

impl SuspensionRecord {
    /// True once `now` is past the suspension end.
    pub fn has_lapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.suspension_end
    }
}

/// A rented virtual instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub user: UserId,
    pub series: String,
    pub region: String,
    pub package: PackageId,
    /// Reserved resources; never more than the host's capacity.
    pub specs: Specs,
    pub pricing: Pricing,
    pub status: ServiceStatus,
    /// Present iff `status == suspended`.
    #[serde(default)]
    pub suspended: Option<SuspensionRecord>,
    #[serde(default)]
    pub active_invoice: Option<InvoiceId>,
    /// Host; set once the service is provisioned.
    #[serde(default)]
    pub server: Option<ServerId>,
    #[serde(default)]
    pub service_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Service {
    pub fn is_running(&self) -> bool {
        self.status == ServiceStatus::Active
    }

    /// The suspension record and the status agree.
    pub fn suspension_consistent(&self) -> bool {
        self.suspended.is_some() == (self.status == ServiceStatus::Suspended)
    }
}
