//! Per-service cost insight.
//!
//! A server's cost is split into four equal shares, one per resource
//! dimension. A service is charged the fraction of each share matching the
//! fraction of that dimension it reserves, plus its own package price, times
//! a configured markup. The result is for internal insight only and is never
//! an invoice amount.

use std::str::FromStr;

use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::model::{Pricing, Resource, Server, Service};
use crate::store::Store;

/// Multiplier applied to a service's individual cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Markup(f64);

impl Markup {
    pub const NONE: Markup = Markup(1.0);

    /// Zero and non-finite rates fall back to `1.0`.
    pub fn new(rate: f64) -> Self {
        if rate.is_finite() && rate != 0.0 {
            Self(rate)
        } else {
            Self::NONE
        }
    }

    /// Parse a configured rate; absent or unparsable means `1.0`.
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|s| f64::from_str(s.trim()).ok())
            .map_or(Self::NONE, Self::new)
    }

    pub fn rate(&self) -> f64 {
        self.0
    }
}

impl Default for Markup {
    fn default() -> Self {
        Self::NONE
    }
}

/// How a service's cost share was computed.
#[derive(Debug, Clone, PartialEq)]
pub struct CostBreakdown {
    /// Contribution of each dimension, in [`Resource::ALL`] order.
    pub contributions: [(Resource, f64); 4],
    /// Sum of the contributions.
    pub resource_cost: f64,
    /// `resource_cost` plus the service's own price.
    pub individual_cost: f64,
    /// `individual_cost` times the markup, unrounded.
    pub market_cost: f64,
    /// `market_cost` rounded to cents, in the service's currency and period.
    pub pricing: Pricing,
}

/// Computes cost shares with a fixed markup.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostApportioner {
    markup: Markup,
}

impl CostApportioner {
    pub fn new(markup: Markup) -> Self {
        Self { markup }
    }

    pub fn markup(&self) -> Markup {
        self.markup
    }

    /// Cost share of `service` on `server`.
    ///
    /// A server dimension of zero contributes nothing. Both prices must be in
    /// the same currency.
    pub fn individual_cost(&self, service: &Service, server: &Server) -> EngineResult<CostBreakdown> {
        if !service.pricing.same_currency(&server.cost) {
            return Err(EngineError::CurrencyMismatch {
                service_id: service.id,
                service_currency: service.pricing.currency.clone(),
                server_currency: server.cost.currency.clone(),
            });
        }

        let quarter = server.cost.price / 4.0;
        let contributions = Resource::ALL.map(|resource| {
            let capacity = server.specs.get(resource);
            let share = if capacity == 0 {
                0.0
            } else {
                service.specs.get(resource) as f64 / capacity as f64 * quarter
            };
            (resource, share)
        });

        let resource_cost: f64 = contributions.iter().map(|(_, share)| share).sum();
        let individual_cost = resource_cost + service.pricing.price;
        let market_cost = individual_cost * self.markup.rate();

        debug!(
            service_id = %service.id,
            server_id = %server.id,
            resource_cost,
            market_cost,
            "Computed cost share"
        );

        Ok(CostBreakdown {
            contributions,
            resource_cost,
            individual_cost,
            market_cost,
            pricing: Pricing {
                price: round_to_cents(market_cost),
                ..service.pricing.clone()
            },
        })
    }

    /// Cost share of `service` on its current host.
    pub async fn service_cost(&self, store: &Store, service: &Service) -> EngineResult<CostBreakdown> {
        let server_id = service
            .server
            .ok_or_else(|| EngineError::not_found("host server of service", service.id))?;
        let server: Server = store
            .find(&server_id)
            .await?
            .ok_or_else(|| EngineError::not_found("server", server_id))?;
        self.individual_cost(service, &server)
    }
}

fn round_to_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
