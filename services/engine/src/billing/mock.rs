//! In-process billing provider for tests and dev mode.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use hostpool_id::InvoiceId;

use super::{BillingError, BillingProvider};

/// Answers from a mutable table of invoice statuses.
#[derive(Debug, Default)]
pub struct MockBillingProvider {
    statuses: Mutex<HashMap<String, String>>,
    outage: AtomicBool,
    lookups: AtomicUsize,
}

impl MockBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the raw provider status reported for `id`.
    pub fn set_status(&self, id: &str, status: &str) {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), status.to_string());
    }

    /// Forget `id`, so lookups report not found.
    pub fn remove(&self, id: &str) {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    /// While set, every lookup fails as unreachable.
    pub fn set_outage(&self, outage: bool) {
        self.outage.store(outage, Ordering::SeqCst);
    }

    /// Lookups attempted so far, failed ones included.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    async fn invoice_status(&self, id: &InvoiceId) -> Result<Option<String>, BillingError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.outage.load(Ordering::SeqCst) {
            return Err(BillingError::Unreachable("mock provider outage".into()));
        }

        Ok(self
            .statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id.as_str())
            .cloned())
    }
}
