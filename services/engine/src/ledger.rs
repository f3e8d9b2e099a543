//! Capacity ledger.
//!
//! Tracks, per server, which services hold a commitment against its capacity
//! and how large each commitment is. Residual capacity in a dimension is the
//! server's total minus the sum of its commitments.
//!
//! Check-and-commit runs under a per-server lock, so two concurrent requests
//! targeting the same server cannot both pass the fit check and oversell it.
//! Commit and release are idempotent per service ID.
//!
//! A server's capacity is taken from the [`Server`] passed in unless the
//! inventory has recorded one with [`CapacityLedger::set_capacity`]. A
//! retired server accepts no new commitments.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use hostpool_id::{ServerId, ServiceId};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{Resource, Server, Service, Specs};

/// Errors from ledger operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("server {server_id} lacks {resource}: requested {requested}, residual {residual}")]
    Insufficient {
        server_id: ServerId,
        resource: Resource,
        requested: u64,
        residual: u64,
    },

    #[error("service {service_id} already holds a commitment on server {server_id}")]
    AlreadyCommitted {
        server_id: ServerId,
        service_id: ServiceId,
    },

    #[error("server {server_id} is being decommissioned")]
    Retired { server_id: ServerId },

    #[error("server {server_id} has {committed} {resource} committed, more than the new capacity {capacity}")]
    BelowCommitted {
        server_id: ServerId,
        resource: Resource,
        capacity: u64,
        committed: u64,
    },
}

/// Result of a commit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The commitment was recorded.
    Committed,
    /// The service already held a commitment; nothing changed.
    AlreadyCommitted,
}

/// Committed and residual capacity of one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerUsage {
    pub capacity: Specs,
    pub committed: Specs,
    pub residual: Specs,
    pub services: usize,
}

#[derive(Debug, Default)]
struct Book {
    commitments: BTreeMap<ServiceId, Specs>,
    capacity: Option<Specs>,
    retired: bool,
}

impl Book {
    fn committed(&self) -> Specs {
        self.commitments.values().copied().sum()
    }

    fn capacity(&self, server: &Server) -> Specs {
        self.capacity.unwrap_or(server.specs)
    }
}

/// Per-server commitment bookkeeping.
#[derive(Debug, Default)]
pub struct CapacityLedger {
    books: RwLock<HashMap<ServerId, Arc<Mutex<Book>>>>,
}

impl CapacityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted services: every service whose status holds
    /// capacity and that has a host is committed against that host.
    pub fn rebuild<'a>(services: impl IntoIterator<Item = &'a Service>) -> Self {
        let ledger = Self::new();
        let mut restored = 0usize;
        for service in services {
            if let (true, Some(server_id)) = (service.status.holds_capacity(), service.server) {
                let book = ledger.book(server_id);
                let mut book = book.lock().unwrap_or_else(PoisonError::into_inner);
                book.commitments.insert(service.id, service.specs);
                restored += 1;
            }
        }
        info!(commitments = restored, "Capacity ledger rebuilt");
        ledger
    }

    fn book(&self, server_id: ServerId) -> Arc<Mutex<Book>> {
        if let Some(book) = self
            .books
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&server_id)
        {
            return Arc::clone(book);
        }

        let mut books = self.books.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(books.entry(server_id).or_default())
    }

    fn existing_book(&self, server_id: &ServerId) -> Option<Arc<Mutex<Book>>> {
        self.books
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(server_id)
            .cloned()
    }

    /// Residual capacity of `server` in `resource`.
    pub fn residual(&self, server: &Server, resource: Resource) -> u64 {
        self.usage(server).residual.get(resource)
    }

    /// True iff `candidate` fits in the residual capacity of `server` in
    /// every dimension. Pure read.
    pub fn can_fit(&self, server: &Server, candidate: &Specs) -> bool {
        candidate.fits_within(&self.usage(server).residual)
    }

    /// Commit `specs` for `service_id` on `server` if it fits.
    ///
    /// The fit check and the insert happen under the server's lock.
    pub fn commit(
        &self,
        server: &Server,
        service_id: ServiceId,
        specs: Specs,
    ) -> Result<CommitOutcome, LedgerError> {
        let book = self.book(server.id);
        let mut book = book.lock().unwrap_or_else(PoisonError::into_inner);

        if book.commitments.contains_key(&service_id) {
            debug!(server_id = %server.id, service_id = %service_id, "Service already committed");
            return Ok(CommitOutcome::AlreadyCommitted);
        }
        if book.retired {
            return Err(LedgerError::Retired {
                server_id: server.id,
            });
        }

        let residual = book.capacity(server).saturating_sub(book.committed());
        if let Some(resource) = specs.first_excess(&residual) {
            return Err(LedgerError::Insufficient {
                server_id: server.id,
                resource,
                requested: specs.get(resource),
                residual: residual.get(resource),
            });
        }

        book.commitments.insert(service_id, specs);
        debug!(server_id = %server.id, service_id = %service_id, %specs, "Committed capacity");
        Ok(CommitOutcome::Committed)
    }

    /// Commit and return a guard that releases the commitment when dropped
    /// unless [`Reservation::confirm`] is called.
    ///
    /// Unlike [`commit`](Self::commit), an existing commitment is an error:
    /// the guard must own the commitment it may roll back.
    pub fn reserve(
        self: &Arc<Self>,
        server: &Server,
        service_id: ServiceId,
        specs: Specs,
    ) -> Result<Reservation, LedgerError> {
        match self.commit(server, service_id, specs)? {
            CommitOutcome::Committed => Ok(Reservation {
                ledger: Arc::clone(self),
                server_id: server.id,
                service_id,
                armed: true,
            }),
            CommitOutcome::AlreadyCommitted => Err(LedgerError::AlreadyCommitted {
                server_id: server.id,
                service_id,
            }),
        }
    }

    /// Record `capacity` as the total of `server_id`, refusing a value below
    /// what is already committed. Clears a retirement.
    ///
    /// Returns the previously recorded capacity.
    pub fn set_capacity(
        &self,
        server_id: ServerId,
        capacity: Specs,
    ) -> Result<Option<Specs>, LedgerError> {
        let book = self.book(server_id);
        let mut book = book.lock().unwrap_or_else(PoisonError::into_inner);

        let committed = book.committed();
        if let Some(resource) = committed.first_excess(&capacity) {
            return Err(LedgerError::BelowCommitted {
                server_id,
                resource,
                capacity: capacity.get(resource),
                committed: committed.get(resource),
            });
        }

        book.retired = false;
        Ok(book.capacity.replace(capacity))
    }

    /// Stop `server_id` from accepting commitments, provided it holds none.
    ///
    /// On refusal returns the number of services still committed.
    pub fn retire(&self, server_id: ServerId) -> Result<(), usize> {
        let book = self.book(server_id);
        let mut book = book.lock().unwrap_or_else(PoisonError::into_inner);
        if !book.commitments.is_empty() {
            return Err(book.commitments.len());
        }
        book.retired = true;
        debug!(server_id = %server_id, "Server retired");
        Ok(())
    }

    /// Undo [`retire`](Self::retire).
    pub fn reinstate(&self, server_id: ServerId) {
        if let Some(book) = self.existing_book(&server_id) {
            book.lock().unwrap_or_else(PoisonError::into_inner).retired = false;
        }
    }

    /// Release the commitment `service_id` holds on `server_id`.
    ///
    /// Returns true if a commitment was removed.
    pub fn release(&self, server_id: ServerId, service_id: ServiceId) -> bool {
        let Some(book) = self.existing_book(&server_id) else {
            return false;
        };
        let mut book = book.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = book.commitments.remove(&service_id).is_some();
        if removed {
            debug!(server_id = %server_id, service_id = %service_id, "Released capacity");
        }
        removed
    }

    /// True if `service_id` holds a commitment on `server_id`.
    pub fn is_committed(&self, server_id: ServerId, service_id: ServiceId) -> bool {
        self.existing_book(&server_id).is_some_and(|book| {
            book.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .commitments
                .contains_key(&service_id)
        })
    }

    /// Number of services committed on `server_id`.
    pub fn commitments(&self, server_id: ServerId) -> usize {
        self.existing_book(&server_id).map_or(0, |book| {
            book.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .commitments
                .len()
        })
    }

    /// Committed and residual capacity of `server`.
    pub fn usage(&self, server: &Server) -> ServerUsage {
        let (capacity, committed, services) = match self.existing_book(&server.id) {
            Some(book) => {
                let book = book.lock().unwrap_or_else(PoisonError::into_inner);
                (book.capacity(server), book.committed(), book.commitments.len())
            }
            None => (server.specs, Specs::ZERO, 0),
        };

        ServerUsage {
            capacity,
            committed,
            residual: capacity.saturating_sub(committed),
            services,
        }
    }
}

/// A commitment that rolls itself back unless confirmed.
///
/// Dropping the guard, including when the owning future is cancelled,
/// releases the commitment.
#[derive(Debug)]
pub struct Reservation {
    ledger: Arc<CapacityLedger>,
    server_id: ServerId,
    service_id: ServiceId,
    armed: bool,
}

impl Reservation {
    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    /// Keep the commitment.
    pub fn confirm(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            self.ledger.release(self.server_id, self.service_id);
            debug!(
                server_id = %self.server_id,
                service_id = %self.service_id,
                "Reservation rolled back"
            );
        }
    }
}
