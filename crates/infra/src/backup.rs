//! Bulk export/import of the whole ledger.
//!
//! The bundle carries the numbering state (counters + ranges) alongside the
//! documents: restoring documents without their sequences would let the next
//! allocation collide with restored numbers.

use serde::{Deserialize, Serialize};

use freightdesk_hiring::TruckHiringNote;
use freightdesk_invoicing::Invoice;
use freightdesk_numbering::{NumberingRange, SequenceCounter};
use freightdesk_payments::Payment;
use freightdesk_receipts::LorryReceipt;

/// Everything needed to rebuild a ledger from nothing.
///
/// Restore REPLACES existing state per collection - merging would break the
/// gapless-within-range numbering invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupBundle {
    pub counters: Vec<SequenceCounter>,
    pub ranges: Vec<NumberingRange>,
    pub lorry_receipts: Vec<LorryReceipt>,
    pub invoices: Vec<Invoice>,
    pub truck_hiring_notes: Vec<TruckHiringNote>,
    pub payments: Vec<Payment>,
}
