//! Invoice reconciliation against the billing provider.
//!
//! The provider is the source of truth for invoice status. Every
//! reconciliation fetches the provider's status, maps it onto
//! [`InvoiceStatus`] and overwrites the stored invoice only when the mapped
//! status differs. If the provider cannot be reached the stored status is
//! kept and the invoice is retried on the next pass.

mod mock;
mod stripe;

pub use mock::MockBillingProvider;
pub use stripe::{BillingConfig, StripeInvoiceClient};

use std::sync::Arc;

use async_trait::async_trait;
use hostpool_id::InvoiceId;
use hostpool_reconcile::{Convergence, RetryTracker};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{EngineError, EngineResult};
use crate::model::{Invoice, InvoiceStatus};
use crate::store::Store;

/// Errors from the billing provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BillingError {
    #[error("billing provider unreachable: {0}")]
    Unreachable(String),

    #[error("unexpected billing provider response: {0}")]
    Unexpected(String),
}

/// Invoice status lookups at the billing provider.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// The provider's raw status for `id`, or `None` if it has no such invoice.
    async fn invoice_status(&self, id: &InvoiceId) -> Result<Option<String>, BillingError>;
}

/// Statistics from a reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileStats {
    pub invoices_checked: u32,
    pub invoices_updated: u32,
    pub invoices_failed: u32,
    pub invoices_skipped: u32,
}

/// Keeps stored invoice status convergent with the provider.
pub struct InvoiceReconciler {
    store: Store,
    provider: Arc<dyn BillingProvider>,
    retries: Mutex<RetryTracker>,
}

impl InvoiceReconciler {
    pub fn new(store: Store, provider: Arc<dyn BillingProvider>) -> Self {
        Self {
            store,
            provider,
            retries: Mutex::new(RetryTracker::default()),
        }
    }

    pub fn with_retry_tracker(mut self, tracker: RetryTracker) -> Self {
        self.retries = Mutex::new(tracker);
        self
    }

    /// Reconcile one invoice, persisting the new status if it changed.
    ///
    /// On success `invoice` holds the stored status; on failure it is left
    /// untouched.
    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.id))]
    pub async fn reconcile(&self, invoice: &mut Invoice) -> EngineResult<Convergence<InvoiceStatus>> {
        let raw = self
            .provider
            .invoice_status(&invoice.id)
            .await
            .map_err(|e| EngineError::ReconciliationUnavailable {
                invoice_id: invoice.id.clone(),
                reason: e.to_string(),
            })?;

        let observed = invoice.status.observe(raw.as_deref());
        let outcome = Convergence::between(invoice.status, observed);

        if outcome.needs_write() {
            let mut next = invoice.clone();
            next.status = observed;
            self.store.save(&next).await?;
            info!(from = %invoice.status, to = %observed, "Invoice status updated");
            *invoice = next;
        } else {
            debug!(status = %observed, "Invoice status unchanged");
        }

        Ok(outcome)
    }

    /// Reconcile the stored invoice with `id`.
    pub async fn reconcile_by_id(&self, id: &InvoiceId) -> EngineResult<Invoice> {
        let mut invoice: Invoice = self
            .store
            .find(id)
            .await?
            .ok_or_else(|| EngineError::not_found("invoice", id))?;
        self.reconcile(&mut invoice).await?;
        Ok(invoice)
    }

    /// Reconcile every invoice that is not cancelled.
    ///
    /// Invoices that keep failing are skipped until their retry window
    /// lapses.
    #[instrument(skip(self))]
    pub async fn reconcile_all(&self) -> EngineResult<ReconcileStats> {
        let mut stats = ReconcileStats::default();
        let invoices: Vec<Invoice> = self
            .store
            .filter(|i: &Invoice| i.status != InvoiceStatus::Cancelled)
            .await?;
        debug!(invoice_count = invoices.len(), "Found invoices to reconcile");

        let mut retries = self.retries.lock().await;
        retries.prune();

        for mut invoice in invoices {
            let key = invoice.id.to_string();
            if let Err(e) = retries.check(&key) {
                debug!(invoice_id = %invoice.id, error = %e, "Skipping invoice");
                stats.invoices_skipped += 1;
                continue;
            }

            stats.invoices_checked += 1;
            match self.reconcile(&mut invoice).await {
                Ok(outcome) => {
                    retries.clear(&key);
                    if outcome.needs_write() {
                        stats.invoices_updated += 1;
                    }
                }
                Err(e) => {
                    let exhausted = retries.record_failure(&key);
                    warn!(
                        invoice_id = %invoice.id,
                        error = %e,
                        exhausted,
                        "Failed to reconcile invoice"
                    );
                    stats.invoices_failed += 1;
                }
            }
        }

        info!(
            invoices_checked = stats.invoices_checked,
            invoices_updated = stats.invoices_updated,
            invoices_failed = stats.invoices_failed,
            invoices_skipped = stats.invoices_skipped,
            "Reconciliation pass complete"
        );

        Ok(stats)
    }
}
