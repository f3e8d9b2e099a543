//! In-process host client for tests and dev mode.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use hostpool_id::{ServerId, ServiceId};
use tracing::debug;

use super::{HostError, HostManagementClient};
use crate::model::{Server, Service};

/// A call received by [`MockHostClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCall {
    Provision {
        server_id: ServerId,
        service_id: ServiceId,
    },
    Deprovision {
        server_id: ServerId,
        service_id: ServiceId,
    },
}

/// Records calls and acknowledges them, unless told to fail or stall.
#[derive(Debug, Default)]
pub struct MockHostClient {
    calls: Mutex<Vec<HostCall>>,
    fail_provision: AtomicBool,
    fail_deprovision: AtomicBool,
    provision_delay: Mutex<Option<Duration>>,
    offline: Mutex<HashSet<ServerId>>,
}

impl MockHostClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client whose hosts reject every provisioning request.
    pub fn failing() -> Self {
        let client = Self::new();
        client.set_fail_provision(true);
        client
    }

    /// A client that waits `delay` before acknowledging provisioning.
    pub fn with_provision_delay(delay: Duration) -> Self {
        let client = Self::new();
        *client
            .provision_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(delay);
        client
    }

    pub fn set_fail_provision(&self, fail: bool) {
        self.fail_provision.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deprovision(&self, fail: bool) {
        self.fail_deprovision.store(fail, Ordering::SeqCst);
    }

    /// Mark `server_id` as reachable or not for the availability probe.
    pub fn set_online(&self, server_id: ServerId, online: bool) {
        let mut offline = self.offline.lock().unwrap_or_else(PoisonError::into_inner);
        if online {
            offline.remove(&server_id);
        } else {
            offline.insert(server_id);
        }
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<HostCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: HostCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

#[async_trait]
impl HostManagementClient for MockHostClient {
    async fn begin_provisioning(
        &self,
        server: &Server,
        service: &Service,
    ) -> Result<(), HostError> {
        self.record(HostCall::Provision {
            server_id: server.id,
            service_id: service.id,
        });

        let delay = *self
            .provision_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_provision.load(Ordering::SeqCst) {
            return Err(HostError::Rejected("mock host configured to fail".into()));
        }

        debug!(server_id = %server.id, service_id = %service.id, "Mock host provisioning");
        Ok(())
    }

    async fn deprovision(&self, server: &Server, service: &Service) -> Result<(), HostError> {
        self.record(HostCall::Deprovision {
            server_id: server.id,
            service_id: service.id,
        });

        if self.fail_deprovision.load(Ordering::SeqCst) {
            return Err(HostError::Unreachable("mock host configured to fail".into()));
        }
        Ok(())
    }

    async fn is_available(&self, server: &Server) -> Result<bool, HostError> {
        let offline = self.offline.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(!offline.contains(&server.id))
    }
}
