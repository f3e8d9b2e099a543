//! Price records carried by servers, services and invoices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unit of a billing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationUnit {
    Day,
    Week,
    Month,
    Year,
}

/// Billing period, e.g. `{amount: 1, unit: month}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingDuration {
    pub amount: u32,
    pub unit: DurationUnit,
}

impl BillingDuration {
    pub const fn days(amount: u32) -> Self {
        Self {
            amount,
            unit: DurationUnit::Day,
        }
    }

    pub const fn months(amount: u32) -> Self {
        Self {
            amount,
            unit: DurationUnit::Month,
        }
    }
}

/// A price over a billing period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub price: f64,
    /// ISO currency code, e.g. `usd`.
    pub currency: String,
    /// Display symbol, e.g. `$`.
    pub symbol: String,
    pub duration: BillingDuration,
    pub billing_start: DateTime<Utc>,
}

impl Pricing {
    /// True when both prices are in the same currency (case-insensitive).
    pub fn same_currency(&self, other: &Pricing) -> bool {
        self.currency.eq_ignore_ascii_case(&other.currency)
    }
}
