//! Invoices and the internal invoice status vocabulary.

use std::fmt;

use hostpool_id::{InvoiceId, UserId};
use serde::{Deserialize, Serialize};

use super::Pricing;

/// Internal invoice status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Paid,
    #[default]
    Unpaid,
    Stale,
    Invalid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Unpaid => "unpaid",
            Self::Stale => "stale",
            Self::Invalid => "invalid",
            Self::Cancelled => "cancelled",
        }
    }

    /// Map a billing provider status onto the internal vocabulary.
    pub fn from_provider(raw: &str) -> Self {
        match raw {
            "paid" => Self::Paid,
            "void" => Self::Cancelled,
            "uncollectible" => Self::Invalid,
            "open" => Self::Unpaid,
            _ => Self::Stale,
        }
    }

    /// The status after the provider reported `raw` for an invoice currently
    /// in `self`.
    ///
    /// A missing invoice (`None`) or an empty status reads as the provider
    /// status `invalid`, which maps to `stale`. A raw status spelled like the
    /// current one is kept as is, so a stored `invalid` stays `invalid`.
    pub fn observe(self, raw: Option<&str>) -> Self {
        let raw = raw.filter(|s| !s.is_empty()).unwrap_or(PROVIDER_MISSING);
        if raw == self.as_str() {
            self
        } else {
            Self::from_provider(raw)
        }
    }
}

/// Provider status assumed for an invoice the provider does not know.
pub const PROVIDER_MISSING: &str = "invalid";

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A billing-cycle invoice. Status is only written by reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub user: UserId,
    pub pricing: Pricing,
    #[serde(default)]
    pub status: InvoiceStatus,
}
