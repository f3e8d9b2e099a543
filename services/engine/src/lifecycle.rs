//! Service lifecycle.
//!
//! Applies lifecycle actions to a service and runs their side effects:
//! capacity commit and release, and calls to the host server. Every
//! transition is persisted before it returns; if the store write fails the
//! caller's copy of the service is left exactly as it was.
//!
//! Transitions of one service are serialized and validated against its
//! stored status, not the caller's copy.
//!
//! Provisioning commits capacity before calling the host. If the host
//! refuses, does not answer within the provisioning timeout, or the caller
//! drops the request mid-flight, the commitment is released and the service
//! stays `pending`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use hostpool_id::{PackageId, ServerId, ServiceId, UserId};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::catalog::PackageCache;
use crate::error::{EngineError, EngineResult};
use crate::host::{HostError, HostManagementClient};
use crate::ledger::CapacityLedger;
use crate::model::{
    BillingDuration, Invoice, LifecycleAction, Pricing, Server, Service, ServiceStatus,
    SuspensionRecord,
};
use crate::selector::ServerSelector;
use crate::store::Store;

/// Default time allowed for a host to acknowledge provisioning.
pub const DEFAULT_PROVISION_TIMEOUT: Duration = Duration::from_secs(30);

/// A request to create a service from a catalog package.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub user: UserId,
    pub package: PackageId,
    pub name: String,
    pub region: String,
}

/// Per-service async locks. Transitions of one service run one at a time.
#[derive(Debug, Default)]
struct ServiceLocks {
    locks: Mutex<HashMap<ServiceId, Arc<AsyncMutex<()>>>>,
}

impl ServiceLocks {
    async fn acquire(&self, id: ServiceId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(id).or_default())
        };
        lock.lock_owned().await
    }

    /// Drop the lock of a service that reached a terminal status.
    fn forget(&self, id: ServiceId) {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

/// Drives services through their status transitions.
///
/// Each transition holds the service's lock and is checked against the
/// stored copy of the service, so a caller holding an outdated copy cannot
/// move a service out of a status it has already left.
pub struct ServiceLifecycle {
    store: Store,
    ledger: Arc<CapacityLedger>,
    selector: ServerSelector,
    host: Arc<dyn HostManagementClient>,
    packages: Arc<PackageCache>,
    provision_timeout: Duration,
    locks: ServiceLocks,
}

impl ServiceLifecycle {
    pub fn new(
        store: Store,
        ledger: Arc<CapacityLedger>,
        host: Arc<dyn HostManagementClient>,
        packages: Arc<PackageCache>,
    ) -> Self {
        Self {
            selector: ServerSelector::new(store.clone(), Arc::clone(&ledger)),
            store,
            ledger,
            host,
            packages,
            provision_timeout: DEFAULT_PROVISION_TIMEOUT,
            locks: ServiceLocks::default(),
        }
    }

    pub fn with_provision_timeout(mut self, timeout: Duration) -> Self {
        self.provision_timeout = timeout;
        self
    }

    /// Load a service by ID.
    pub async fn service(&self, id: ServiceId) -> EngineResult<Service> {
        self.store
            .find(&id)
            .await?
            .ok_or_else(|| EngineError::not_found("service", id))
    }

    /// Build and persist a `pending` service from a catalog package.
    #[instrument(skip(self, request), fields(user_id = %request.user, package_id = %request.package))]
    pub async fn create_pending(&self, request: ProvisionRequest) -> EngineResult<Service> {
        let package = self.packages.package(request.package).await?;
        let now = Utc::now();

        if !package.is_available(now) {
            return Err(EngineError::PackageUnavailable(package.id));
        }
        if !package.serves_region(&request.region) {
            return Err(EngineError::RegionNotEligible {
                package_id: package.id,
                region: request.region,
            });
        }

        let service = Service {
            id: ServiceId::new(),
            name: request.name,
            user: request.user,
            series: package.server_series.clone(),
            region: request.region,
            package: package.id,
            specs: package.specs,
            pricing: Pricing {
                price: package.cost.price,
                currency: package.cost.currency.clone(),
                symbol: package.cost.symbol.clone(),
                duration: BillingDuration::days(package.cost.days),
                billing_start: now,
            },
            status: ServiceStatus::Pending,
            suspended: None,
            active_invoice: None,
            server: None,
            service_address: None,
            created_at: now,
            updated_at: now,
        };

        self.store.save(&service).await?;
        info!(service_id = %service.id, "Created pending service");
        Ok(service)
    }

    /// `pending -> installing`: pick a host, commit capacity, ask the host to
    /// begin provisioning. Returns the chosen server.
    #[instrument(skip(self, service), fields(service_id = %service.id))]
    pub async fn provision(&self, service: &mut Service) -> EngineResult<ServerId> {
        let _guard = self.locks.acquire(service.id).await;
        let current = self.current(service).await?;
        let target = next_status(&current, LifecycleAction::Provision)?;
        let (server, reservation) = self.selector.reserve(&current).await?;

        let acknowledged = tokio::time::timeout(
            self.provision_timeout,
            self.host.begin_provisioning(&server, &current),
        )
        .await
        .unwrap_or(Err(HostError::Timeout));

        if let Err(e) = acknowledged {
            warn!(server_id = %server.id, error = %e, "Host did not accept provisioning; releasing capacity");
            return Err(EngineError::ProvisioningFailed {
                service_id: current.id,
                server_id: server.id,
                reason: e.to_string(),
            });
        }

        let mut next = current;
        next.status = target;
        next.server = Some(server.id);
        next.updated_at = Utc::now();

        if let Err(e) = self.store.save(&next).await {
            drop(reservation);
            warn!(server_id = %server.id, error = %e, "Failed to persist provisioning; rolling back");
            if let Err(e) = self.host.deprovision(&server, &next).await {
                warn!(server_id = %server.id, error = %e, "Rollback deprovision failed");
            }
            return Err(e.into());
        }

        reservation.confirm();
        *service = next;
        info!(server_id = %server.id, "Service provisioning started");
        Ok(server.id)
    }

    /// `installing -> active`, once the host reports the build finished.
    #[instrument(skip(self, service), fields(service_id = %service.id))]
    pub async fn activate(
        &self,
        service: &mut Service,
        service_address: Option<String>,
    ) -> EngineResult<()> {
        self.transition(service, LifecycleAction::Activate, |next| {
            if service_address.is_some() {
                next.service_address = service_address;
            }
        })
        .await
    }

    /// `active -> inactive`. Capacity stays committed.
    #[instrument(skip(self, service), fields(service_id = %service.id))]
    pub async fn stop(&self, service: &mut Service) -> EngineResult<()> {
        self.transition(service, LifecycleAction::Stop, |_| {}).await
    }

    /// `inactive -> active`.
    #[instrument(skip(self, service), fields(service_id = %service.id))]
    pub async fn start(&self, service: &mut Service) -> EngineResult<()> {
        self.transition(service, LifecycleAction::Start, |_| {}).await
    }

    /// `active | installing | inactive -> suspended`. Capacity stays
    /// committed; the service is not reactivated when the record lapses.
    ///
    /// A record that ends before it starts is refused.
    #[instrument(skip(self, service, record), fields(service_id = %service.id))]
    pub async fn suspend(
        &self,
        service: &mut Service,
        record: SuspensionRecord,
    ) -> EngineResult<()> {
        if record.suspension_end < record.suspension_start {
            return Err(EngineError::InvalidSuspension {
                service_id: service.id,
            });
        }

        self.transition(service, LifecycleAction::Suspend, |next| {
            next.suspended = Some(record);
        })
        .await
    }

    /// `suspended -> active`, clearing the suspension record.
    #[instrument(skip(self, service), fields(service_id = %service.id))]
    pub async fn resume(&self, service: &mut Service) -> EngineResult<()> {
        self.transition(service, LifecycleAction::Resume, |next| {
            next.suspended = None;
        })
        .await
    }

    /// Any non-terminal status `-> terminated`.
    ///
    /// Persists first, then releases capacity and asks the host to
    /// deprovision. A deprovision failure is logged and not retried.
    /// Terminating a terminated service succeeds without side effects.
    #[instrument(skip(self, service), fields(service_id = %service.id))]
    pub async fn terminate(&self, service: &mut Service) -> EngineResult<()> {
        let _guard = self.locks.acquire(service.id).await;
        let current = self.current(service).await?;
        if current.status == ServiceStatus::Terminated {
            debug!("Service already terminated");
            *service = current;
            return Ok(());
        }

        let target = next_status(&current, LifecycleAction::Terminate)?;
        let mut next = current;
        next.status = target;
        next.suspended = None;
        self.commit_transition(service, next).await?;
        self.locks.forget(service.id);

        let Some(server_id) = service.server else {
            info!("Terminated unplaced service");
            return Ok(());
        };

        self.ledger.release(server_id, service.id);

        match self.store.find::<Server>(&server_id).await {
            Ok(Some(server)) => {
                if let Err(e) = self.host.deprovision(&server, service).await {
                    warn!(server_id = %server_id, error = %e, "Deprovision failed; host may still run the service");
                }
            }
            Ok(None) => {
                warn!(server_id = %server_id, "Host server no longer exists; skipping deprovision");
            }
            Err(e) => {
                warn!(server_id = %server_id, error = %e, "Could not load host server; skipping deprovision");
            }
        }

        info!(server_id = %server_id, "Service terminated");
        Ok(())
    }

    /// `pending -> cancelled`. No capacity was ever committed.
    #[instrument(skip(self, service), fields(service_id = %service.id))]
    pub async fn cancel(&self, service: &mut Service) -> EngineResult<()> {
        self.transition(service, LifecycleAction::Cancel, |_| {}).await?;
        self.locks.forget(service.id);
        Ok(())
    }

    /// Make `invoice` the active invoice of `service`.
    ///
    /// The invoice must belong to the service's owner. The service's status
    /// is left as stored.
    #[instrument(skip(self, service, invoice), fields(service_id = %service.id, invoice_id = %invoice.id))]
    pub async fn attach_invoice(&self, service: &mut Service, invoice: &Invoice) -> EngineResult<()> {
        let _guard = self.locks.acquire(service.id).await;
        let mut next = self.current(service).await?;
        if invoice.user != next.user {
            return Err(EngineError::InvoiceOwnerMismatch {
                invoice_id: invoice.id.clone(),
                user_id: next.user,
            });
        }

        next.active_invoice = Some(invoice.id.clone());
        self.commit_transition(service, next).await
    }

    /// The stored copy of `service`, or the caller's copy if it was never
    /// persisted.
    async fn current(&self, service: &Service) -> EngineResult<Service> {
        Ok(self
            .store
            .find(&service.id)
            .await?
            .unwrap_or_else(|| service.clone()))
    }

    async fn transition(
        &self,
        service: &mut Service,
        action: LifecycleAction,
        edit: impl FnOnce(&mut Service),
    ) -> EngineResult<()> {
        let _guard = self.locks.acquire(service.id).await;
        let current = self.current(service).await?;
        let target = next_status(&current, action)?;
        let mut next = current;
        next.status = target;
        edit(&mut next);
        self.commit_transition(service, next).await
    }

    async fn commit_transition(&self, service: &mut Service, mut next: Service) -> EngineResult<()> {
        next.updated_at = Utc::now();
        self.store.save(&next).await?;
        debug!(from = %service.status, to = %next.status, "Transition persisted");
        *service = next;
        Ok(())
    }
}

fn next_status(service: &Service, action: LifecycleAction) -> EngineResult<ServiceStatus> {
    service
        .status
        .apply(action)
        .ok_or(EngineError::InvalidTransition {
            service_id: service.id,
            from: service.status,
            action,
        })
}

/// Suspended services whose suspension ended before `now`.
pub async fn expired_suspensions(store: &Store, now: DateTime<Utc>) -> EngineResult<Vec<Service>> {
    Ok(store
        .filter(move |s: &Service| {
            s.status == ServiceStatus::Suspended
                && s.suspended.as_ref().is_some_and(|r| r.has_lapsed(now))
        })
        .await?)
}
