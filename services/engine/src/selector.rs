//! Server selection.
//!
//! First-fit over the candidate pool: available servers in the requested
//! region and series, ordered ascending by server ID (creation order). The
//! first server the ledger can fit wins. Selection never balances load.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::{EngineError, EngineResult};
use crate::ledger::{CapacityLedger, LedgerError, Reservation};
use crate::model::{Server, Service, Specs};
use crate::store::Store;

/// Picks a host for a new service.
#[derive(Debug, Clone)]
pub struct ServerSelector {
    store: Store,
    ledger: Arc<CapacityLedger>,
}

impl ServerSelector {
    pub fn new(store: Store, ledger: Arc<CapacityLedger>) -> Self {
        Self { store, ledger }
    }

    /// Candidate pool for `region` and `series`, in selection order.
    pub async fn candidates(&self, region: &str, series: &str) -> EngineResult<Vec<Server>> {
        let region = region.to_string();
        let series = series.to_string();
        let mut pool: Vec<Server> = self
            .store
            .filter(move |s: &Server| s.is_candidate(&region, &series))
            .await?;
        pool.sort_by_key(|s| s.id);
        Ok(pool)
    }

    /// First candidate the ledger can currently fit. Does not commit.
    #[instrument(skip(self, specs))]
    pub async fn select(&self, region: &str, series: &str, specs: &Specs) -> EngineResult<Server> {
        let pool = self.candidates(region, series).await?;
        debug!(candidates = pool.len(), "Evaluating candidate pool");

        first_fit(&self.ledger, &pool, specs)
            .cloned()
            .ok_or_else(|| no_capacity(region, series))
    }

    /// Select a host for `service` and commit its specs in one step.
    ///
    /// Each candidate is tried with an atomic check-and-commit, so a server
    /// filled by a concurrent request between listing and commit is skipped
    /// rather than oversold. A service that already holds a commitment is
    /// refused with [`EngineError::ProvisioningInProgress`].
    #[instrument(skip(self, service), fields(service_id = %service.id))]
    pub async fn reserve(&self, service: &Service) -> EngineResult<(Server, Reservation)> {
        let pool = self.candidates(&service.region, &service.series).await?;
        debug!(candidates = pool.len(), "Evaluating candidate pool");

        for server in pool {
            match self.ledger.reserve(&server, service.id, service.specs) {
                Ok(reservation) => {
                    debug!(server_id = %server.id, "Selected server");
                    return Ok((server, reservation));
                }
                Err(LedgerError::Insufficient { resource, .. }) => {
                    debug!(server_id = %server.id, %resource, "Server cannot fit service");
                }
                Err(LedgerError::Retired { .. }) => {
                    debug!(server_id = %server.id, "Server is being decommissioned");
                }
                Err(LedgerError::AlreadyCommitted { server_id, .. }) => {
                    return Err(EngineError::ProvisioningInProgress {
                        service_id: service.id,
                        server_id,
                    });
                }
                Err(e @ LedgerError::BelowCommitted { .. }) => {
                    debug!(server_id = %server.id, error = %e, "Unexpected ledger refusal");
                }
            }
        }

        Err(no_capacity(&service.region, &service.series))
    }
}

/// The first server in `pool` with room for `specs`.
pub fn first_fit<'a>(
    ledger: &CapacityLedger,
    pool: &'a [Server],
    specs: &Specs,
) -> Option<&'a Server> {
    pool.iter().find(|server| ledger.can_fit(server, specs))
}

fn no_capacity(region: &str, series: &str) -> EngineError {
    EngineError::NoCapacityAvailable {
        region: region.to_string(),
        series: series.to_string(),
    }
}
