//! Settlement reconciliation.
//!
//! Re-derives a target's payment-driven fields from the full payment set -
//! never by incrementally adjusting the stored figures. That full re-derivation
//! is what keeps concurrent payment mutations safe without locking: whichever
//! reconciliation runs last recomputes from everything on disk.

use std::sync::Arc;

use freightdesk_core::{InvoiceId, ThnId};
use freightdesk_payments::{PaymentTarget, sum_amounts};

use crate::store::{InvoiceStore, PaymentStore, StoreError, ThnStore};

/// Recomputes invoice/THN settlement after payment mutations.
#[derive(Clone)]
pub struct StatusReconciler {
    invoices: Arc<dyn InvoiceStore>,
    notes: Arc<dyn ThnStore>,
    payments: Arc<dyn PaymentStore>,
}

impl StatusReconciler {
    pub fn new(
        invoices: Arc<dyn InvoiceStore>,
        notes: Arc<dyn ThnStore>,
        payments: Arc<dyn PaymentStore>,
    ) -> Self {
        Self {
            invoices,
            notes,
            payments,
        }
    }

    /// Recompute an invoice's settlement status. A missing invoice is a
    /// no-op: the target may have been deleted since the payment mutation.
    pub async fn reconcile_invoice(&self, id: InvoiceId) -> Result<(), StoreError> {
        let Some(mut invoice) = self.invoices.get(id).await? else {
            tracing::debug!(invoice = %id, "reconciliation target gone; nothing to do");
            return Ok(());
        };
        let payments = self
            .payments
            .list_for_target(PaymentTarget::Invoice(id))
            .await?;
        let paid = sum_amounts(&payments);
        if invoice.apply_settlement(paid) {
            tracing::info!(invoice = %id, paid, status = %invoice.status(), "invoice settlement updated");
            self.invoices.put(invoice).await?;
        }
        Ok(())
    }

    /// Recompute a hiring note's paid amount, balance, and status.
    pub async fn reconcile_thn(&self, id: ThnId) -> Result<(), StoreError> {
        let Some(mut note) = self.notes.get(id).await? else {
            tracing::debug!(thn = %id, "reconciliation target gone; nothing to do");
            return Ok(());
        };
        let payments = self
            .payments
            .list_for_target(PaymentTarget::TruckHiringNote(id))
            .await?;
        let paid = sum_amounts(&payments);
        if note.apply_settlement(paid) {
            tracing::info!(
                thn = %id,
                paid,
                balance = note.balance_amount(),
                status = %note.status(),
                "hiring note settlement updated"
            );
            self.notes.put(note).await?;
        }
        Ok(())
    }

    pub async fn reconcile_target(&self, target: PaymentTarget) -> Result<(), StoreError> {
        match target {
            PaymentTarget::Invoice(id) => self.reconcile_invoice(id).await,
            PaymentTarget::TruckHiringNote(id) => self.reconcile_thn(id).await,
        }
    }

    /// Reconciliation must never fail the payment request that triggered it;
    /// a failure is logged and left for the next reconciliation pass.
    pub async fn reconcile_target_best_effort(&self, target: PaymentTarget) {
        if let Err(e) = self.reconcile_target(target).await {
            tracing::warn!(?target, error = %e, "settlement reconciliation failed; will correct on next pass");
        }
    }
}
