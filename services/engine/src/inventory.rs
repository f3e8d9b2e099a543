//! Server inventory.
//!
//! Operator-facing registration, availability and decommissioning of
//! servers. A server cannot be removed while any service holds a commitment
//! on it, and cannot be resized below what is committed on it.

use std::sync::Arc;

use chrono::Utc;
use hostpool_id::ServerId;
use tracing::{info, instrument, warn};

use crate::error::{EngineError, EngineResult};
use crate::ledger::{CapacityLedger, ServerUsage};
use crate::model::{Server, Service};
use crate::store::Store;

/// Build a ledger from every persisted service.
pub async fn load_ledger(store: &Store) -> EngineResult<CapacityLedger> {
    let services: Vec<Service> = store.list().await?;
    Ok(CapacityLedger::rebuild(&services))
}

/// Server registration and removal.
#[derive(Debug, Clone)]
pub struct Inventory {
    store: Store,
    ledger: Arc<CapacityLedger>,
}

impl Inventory {
    pub fn new(store: Store, ledger: Arc<CapacityLedger>) -> Self {
        Self { store, ledger }
    }

    pub async fn server(&self, id: ServerId) -> EngineResult<Server> {
        self.store
            .find(&id)
            .await?
            .ok_or_else(|| EngineError::not_found("server", id))
    }

    /// Persist a new or updated server. Its capacity is what the ledger
    /// checks against from now on; an update smaller than the capacity
    /// already committed on the server is refused.
    #[instrument(skip(self, server), fields(server_id = %server.id))]
    pub async fn register_server(&self, server: &Server) -> EngineResult<()> {
        let stored: Option<Server> = self.store.find(&server.id).await?;

        self.ledger.set_capacity(server.id, server.specs)?;

        if let Err(e) = self.store.save(server).await {
            if let Some(previous) = stored {
                if let Err(restore) = self.ledger.set_capacity(server.id, previous.specs) {
                    warn!(error = %restore, "Could not restore previous capacity");
                }
            }
            return Err(e.into());
        }

        info!(
            region = %server.region,
            series = %server.series,
            specs = %server.specs,
            "Registered server"
        );
        Ok(())
    }

    /// Set whether the server accepts new services. Returns the stored server.
    #[instrument(skip(self))]
    pub async fn set_availability(&self, id: ServerId, available: bool) -> EngineResult<Server> {
        let mut server = self.server(id).await?;
        if server.available != available {
            server.available = available;
            server.updated_at = Utc::now();
            self.store.save(&server).await?;
            info!(available, "Server availability changed");
        }
        Ok(server)
    }

    /// Remove a server that hosts nothing.
    ///
    /// The server is retired in the ledger before the store delete, so a
    /// placement racing with the removal cannot commit to it.
    #[instrument(skip(self))]
    pub async fn decommission_server(&self, id: ServerId) -> EngineResult<()> {
        self.ledger
            .retire(id)
            .map_err(|services| EngineError::ServerInUse {
                server_id: id,
                services,
            })?;

        match self.store.delete::<Server>(&id).await {
            Ok(true) => {
                info!("Server decommissioned");
                Ok(())
            }
            Ok(false) => {
                self.ledger.reinstate(id);
                Err(EngineError::not_found("server", id))
            }
            Err(e) => {
                self.ledger.reinstate(id);
                Err(e.into())
            }
        }
    }

    /// Committed and residual capacity of a server.
    pub async fn usage(&self, id: ServerId) -> EngineResult<ServerUsage> {
        let server = self.server(id).await?;
        Ok(self.ledger.usage(&server))
    }
}
