//! Lorry receipt lifecycle coordination.
//!
//! Receipts move to `Invoiced` when they join an invoice's set and revert
//! when they leave it. The coordinator only diffs membership; deletion guards
//! live with the use cases in [`crate::service`].

use std::sync::Arc;

use freightdesk_core::LorryReceiptId;
use freightdesk_receipts::LrStatus;

use crate::store::{LorryReceiptStore, StoreError};

/// Applies invoice-membership changes to lorry receipt statuses.
#[derive(Clone)]
pub struct LifecycleCoordinator {
    receipts: Arc<dyn LorryReceiptStore>,
}

impl LifecycleCoordinator {
    pub fn new(receipts: Arc<dyn LorryReceiptStore>) -> Self {
        Self { receipts }
    }

    /// Apply the difference between an invoice's old and new receipt sets.
    ///
    /// Newly attached receipts become `Invoiced`; detached ones revert to
    /// `revert_to` (normally `Created` - any in-transit/delivered progress
    /// recorded meanwhile is deliberately overwritten). Each receipt is an
    /// independent write; a failure aborts mid-set and the remainder is
    /// corrected by a later re-save.
    pub async fn on_invoice_lr_set_changed(
        &self,
        old_ids: &[LorryReceiptId],
        new_ids: &[LorryReceiptId],
        revert_to: LrStatus,
    ) -> Result<(), StoreError> {
        for id in new_ids.iter().filter(|id| !old_ids.contains(id)) {
            let Some(mut receipt) = self.receipts.get(*id).await? else {
                tracing::warn!(lr = %id, "attached lorry receipt missing; skipping");
                continue;
            };
            receipt.mark_invoiced();
            self.receipts.put(receipt).await?;
        }

        for id in old_ids.iter().filter(|id| !new_ids.contains(id)) {
            let Some(mut receipt) = self.receipts.get(*id).await? else {
                tracing::warn!(lr = %id, "detached lorry receipt missing; skipping");
                continue;
            };
            receipt.revert_to(revert_to);
            self.receipts.put(receipt).await?;
        }

        Ok(())
    }
}
