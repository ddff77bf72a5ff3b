//! Application service: the use cases behind the HTTP surface.
//!
//! `LedgerService` composes the allocator, reconciler, and lifecycle
//! coordinator over the store traits. Every use case runs its steps in a
//! fixed order inside the request (save payment → link to target →
//! reconcile); there is no transaction spanning documents, so a failure
//! mid-sequence leaves individually-valid documents for the next
//! reconciliation to correct.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use freightdesk_core::{
    CustomerId, DomainError, InvoiceId, LorryReceiptId, PaymentId, ThnId, VehicleId,
};
use freightdesk_hiring::TruckHiringNote;
use freightdesk_invoicing::{Invoice, InvoiceTotals, TaxBreakup};
use freightdesk_numbering::{DocumentKind, NumberingRange};
use freightdesk_payments::{Payment, PaymentMethod, PaymentTarget};
use freightdesk_receipts::{LorryReceipt, LrCharges, LrStatus};

use crate::allocator::{AllocationError, SequenceAllocator};
use crate::backup::BackupBundle;
use crate::lifecycle::LifecycleCoordinator;
use crate::reconcile::StatusReconciler;
use crate::store::{
    CounterStore, InMemoryCounterStore, InMemoryInvoiceStore, InMemoryLorryReceiptStore,
    InMemoryPaymentStore, InMemoryRangeStore, InMemoryThnStore, InvoiceStore, LorryReceiptStore,
    PaymentStore, PostgresStores, RangeStore, StoreError, ThnStore,
};

/// Service-boundary error; the HTTP layer maps these to status codes.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0} range exhausted; update the numbering range in Settings")]
    RangeExhausted(DocumentKind),

    #[error("invalid numbering range: {0}")]
    InvalidRange(String),

    #[error("duplicate document number: {0}")]
    DuplicateNumber(String),

    #[error("cannot delete invoice {number}: {payments} payment(s) recorded against it")]
    InvoiceHasPayments { number: String, payments: usize },

    #[error("cannot delete lorry receipt {number}: it is billed on an invoice")]
    LrAlreadyInvoiced { number: String },

    #[error("not found")]
    NotFound,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Duplicate(msg) => LedgerError::DuplicateNumber(msg),
            other => LedgerError::Store(other),
        }
    }
}

impl From<AllocationError> for LedgerError {
    fn from(value: AllocationError) -> Self {
        match value {
            AllocationError::RangeExhausted(kind) => LedgerError::RangeExhausted(kind),
            AllocationError::Store(e) => e.into(),
        }
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => LedgerError::Validation(msg),
            DomainError::InvalidId(msg) => LedgerError::Validation(msg),
            DomainError::InvariantViolation(msg) => LedgerError::InvariantViolation(msg),
            DomainError::Conflict(msg) => LedgerError::InvariantViolation(msg),
            DomainError::NotFound => LedgerError::NotFound,
        }
    }
}

/// Command: create a lorry receipt. `number: None` allocates; `Some` is a
/// manual entry (permitted only where the numbering range allows it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLorryReceipt {
    #[serde(default)]
    pub number: Option<String>,
    pub date: DateTime<Utc>,
    pub consignor: CustomerId,
    pub consignee: CustomerId,
    pub vehicle: VehicleId,
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub charges: LrCharges,
}

/// Command: create an invoice over existing lorry receipts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvoice {
    #[serde(default)]
    pub number: Option<String>,
    pub date: DateTime<Utc>,
    pub customer: CustomerId,
    pub lr_ids: Vec<LorryReceiptId>,
    pub taxable_amount: u64,
    #[serde(default)]
    pub tax: TaxBreakup,
}

/// Command: create a truck hiring note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTruckHiringNote {
    #[serde(default)]
    pub number: Option<String>,
    pub date: DateTime<Utc>,
    pub truck_owner: String,
    pub vehicle: VehicleId,
    pub freight: u64,
    #[serde(default)]
    pub advance: u64,
}

/// Command: record a payment against an invoice or hiring note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayment {
    pub amount: u64,
    pub date: DateTime<Utc>,
    pub target: PaymentTarget,
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: Option<String>,
}

/// Command: replace a payment's fields (same id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentUpdate {
    pub amount: u64,
    pub date: DateTime<Utc>,
    pub target: PaymentTarget,
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: Option<String>,
}

/// Command: configure the numbering range of a document kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeConfig {
    pub prefix: String,
    pub start_number: u64,
    pub end_number: u64,
    #[serde(default)]
    pub allow_manual_entry: bool,
    #[serde(default)]
    pub allow_outside_range: bool,
}

/// The back-office use cases, composed over the store boundary.
#[derive(Clone)]
pub struct LedgerService {
    receipts: Arc<dyn LorryReceiptStore>,
    invoices: Arc<dyn InvoiceStore>,
    notes: Arc<dyn ThnStore>,
    payments: Arc<dyn PaymentStore>,
    ranges: Arc<dyn RangeStore>,
    counters: Arc<dyn CounterStore>,
    allocator: SequenceAllocator,
    reconciler: StatusReconciler,
    lifecycle: LifecycleCoordinator,
}

impl LedgerService {
    pub fn new(
        receipts: Arc<dyn LorryReceiptStore>,
        invoices: Arc<dyn InvoiceStore>,
        notes: Arc<dyn ThnStore>,
        payments: Arc<dyn PaymentStore>,
        ranges: Arc<dyn RangeStore>,
        counters: Arc<dyn CounterStore>,
    ) -> Self {
        let allocator = SequenceAllocator::new(ranges.clone(), counters.clone());
        let reconciler = StatusReconciler::new(invoices.clone(), notes.clone(), payments.clone());
        let lifecycle = LifecycleCoordinator::new(receipts.clone());
        Self {
            receipts,
            invoices,
            notes,
            payments,
            ranges,
            counters,
            allocator,
            reconciler,
            lifecycle,
        }
    }

    /// Fully in-memory wiring (tests/dev).
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryLorryReceiptStore::new()),
            Arc::new(InMemoryInvoiceStore::new()),
            Arc::new(InMemoryThnStore::new()),
            Arc::new(InMemoryPaymentStore::new()),
            Arc::new(InMemoryRangeStore::new()),
            Arc::new(InMemoryCounterStore::new()),
        )
    }

    /// All collections on one Postgres pool.
    pub fn with_postgres(stores: PostgresStores) -> Self {
        Self::new(
            Arc::new(stores.clone()),
            Arc::new(stores.clone()),
            Arc::new(stores.clone()),
            Arc::new(stores.clone()),
            Arc::new(stores.clone()),
            Arc::new(stores),
        )
    }

    // ----- numbering -----

    /// Pick the document number: allocate, or accept a manual entry where the
    /// range permits it. Manual numbers are not deduplicated here - the
    /// store's (kind, number) uniqueness constraint has the last word.
    async fn resolve_number(
        &self,
        kind: DocumentKind,
        manual: Option<String>,
    ) -> Result<String, LedgerError> {
        match manual {
            None => Ok(self.allocator.allocate(kind).await?.render()),
            Some(number) => {
                if let Some(range) = self.ranges.get(kind).await? {
                    if !range.allow_manual_entry {
                        return Err(LedgerError::Validation(format!(
                            "manual {kind} numbers are not enabled for the configured range"
                        )));
                    }
                }
                // No configured range: legacy behavior accepts manual numbers.
                Ok(number)
            }
        }
    }

    /// Create or replace the numbering range for a kind (§ Settings screen).
    pub async fn upsert_range(
        &self,
        kind: DocumentKind,
        config: RangeConfig,
    ) -> Result<NumberingRange, LedgerError> {
        let invalid = |e: DomainError| match e {
            DomainError::Validation(msg) => LedgerError::InvalidRange(msg),
            other => other.into(),
        };

        let range = match self.ranges.get(kind).await? {
            None => NumberingRange::new(
                kind,
                config.prefix,
                config.start_number,
                config.end_number,
                config.allow_manual_entry,
                config.allow_outside_range,
            )
            .map_err(invalid)?,
            Some(current) => {
                let (next, rebased) = current
                    .reconfigured(
                        config.prefix,
                        config.start_number,
                        config.end_number,
                        config.allow_manual_entry,
                        config.allow_outside_range,
                    )
                    .map_err(invalid)?;
                if rebased {
                    tracing::warn!(
                        kind = %kind,
                        old_position = current.current_number,
                        new_position = next.current_number,
                        "numbering position rebased by reconfiguration; already-issued numbers may repeat"
                    );
                }
                next
            }
        };

        self.ranges.put(range.clone()).await?;
        Ok(range)
    }

    pub async fn list_ranges(&self) -> Result<Vec<NumberingRange>, LedgerError> {
        Ok(self.ranges.list().await?)
    }

    // ----- lorry receipts -----

    pub async fn create_lorry_receipt(
        &self,
        cmd: NewLorryReceipt,
    ) -> Result<LorryReceipt, LedgerError> {
        let number = self
            .resolve_number(DocumentKind::LorryReceipt, cmd.number)
            .await?;
        let receipt = LorryReceipt::new(
            LorryReceiptId::new(),
            number,
            cmd.date,
            cmd.consignor,
            cmd.consignee,
            cmd.vehicle,
            cmd.origin,
            cmd.destination,
            cmd.charges,
        )?;
        self.receipts.insert(receipt.clone()).await?;
        tracing::info!(lr = %receipt.id_typed(), number = receipt.number(), "lorry receipt created");
        Ok(receipt)
    }

    pub async fn get_lorry_receipt(&self, id: LorryReceiptId) -> Result<LorryReceipt, LedgerError> {
        self.receipts.get(id).await?.ok_or(LedgerError::NotFound)
    }

    pub async fn list_lorry_receipts(&self) -> Result<Vec<LorryReceipt>, LedgerError> {
        Ok(self.receipts.list().await?)
    }

    pub async fn delete_lorry_receipt(&self, id: LorryReceiptId) -> Result<(), LedgerError> {
        let receipt = self.get_lorry_receipt(id).await?;
        if !receipt.can_delete() {
            return Err(LedgerError::LrAlreadyInvoiced {
                number: receipt.number().to_string(),
            });
        }
        self.receipts.remove(id).await?;
        Ok(())
    }

    pub async fn record_delivery(
        &self,
        id: LorryReceiptId,
        when: DateTime<Utc>,
    ) -> Result<LorryReceipt, LedgerError> {
        let mut receipt = self.get_lorry_receipt(id).await?;
        receipt.record_delivery(when)?;
        self.receipts.put(receipt.clone()).await?;
        Ok(receipt)
    }

    pub async fn mark_lr_in_transit(&self, id: LorryReceiptId) -> Result<LorryReceipt, LedgerError> {
        let mut receipt = self.get_lorry_receipt(id).await?;
        receipt.mark_in_transit()?;
        self.receipts.put(receipt.clone()).await?;
        Ok(receipt)
    }

    /// Manual terminal transition; nothing derives this from invoice
    /// settlement.
    pub async fn mark_lr_paid(&self, id: LorryReceiptId) -> Result<LorryReceipt, LedgerError> {
        let mut receipt = self.get_lorry_receipt(id).await?;
        receipt.mark_paid();
        self.receipts.put(receipt.clone()).await?;
        Ok(receipt)
    }

    // ----- invoices -----

    pub async fn create_invoice(&self, cmd: NewInvoice) -> Result<Invoice, LedgerError> {
        self.ensure_receipts_exist(&cmd.lr_ids).await?;
        let number = self.resolve_number(DocumentKind::Invoice, cmd.number).await?;
        let totals = InvoiceTotals::new(cmd.taxable_amount, cmd.tax)?;
        let invoice = Invoice::new(
            InvoiceId::new(),
            number,
            cmd.date,
            cmd.customer,
            cmd.lr_ids,
            totals,
        )?;
        self.invoices.insert(invoice.clone()).await?;
        self.lifecycle
            .on_invoice_lr_set_changed(&[], invoice.lr_ids(), LrStatus::Created)
            .await?;
        tracing::info!(invoice = %invoice.id_typed(), number = invoice.number(), "invoice created");
        Ok(invoice)
    }

    pub async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, LedgerError> {
        self.invoices.get(id).await?.ok_or(LedgerError::NotFound)
    }

    pub async fn list_invoices(&self) -> Result<Vec<Invoice>, LedgerError> {
        Ok(self.invoices.list().await?)
    }

    /// Replace the receipt set billed by an invoice; newly attached receipts
    /// become Invoiced, detached ones revert to Created.
    pub async fn update_invoice_lrs(
        &self,
        id: InvoiceId,
        lr_ids: Vec<LorryReceiptId>,
    ) -> Result<Invoice, LedgerError> {
        let mut invoice = self.get_invoice(id).await?;
        self.ensure_receipts_exist(&lr_ids).await?;
        let old = invoice.lr_ids().to_vec();
        invoice.replace_lr_set(lr_ids)?;
        self.invoices.put(invoice.clone()).await?;
        self.lifecycle
            .on_invoice_lr_set_changed(&old, invoice.lr_ids(), LrStatus::Created)
            .await?;
        Ok(invoice)
    }

    pub async fn delete_invoice(&self, id: InvoiceId) -> Result<(), LedgerError> {
        let invoice = self.get_invoice(id).await?;
        if invoice.has_payments() {
            return Err(LedgerError::InvoiceHasPayments {
                number: invoice.number().to_string(),
                payments: invoice.payment_ids().len(),
            });
        }
        self.lifecycle
            .on_invoice_lr_set_changed(invoice.lr_ids(), &[], LrStatus::Created)
            .await?;
        self.invoices.remove(id).await?;
        Ok(())
    }

    async fn ensure_receipts_exist(&self, lr_ids: &[LorryReceiptId]) -> Result<(), LedgerError> {
        for id in lr_ids {
            if self.receipts.get(*id).await?.is_none() {
                return Err(LedgerError::Validation(format!(
                    "lorry receipt {id} does not exist"
                )));
            }
        }
        Ok(())
    }

    // ----- truck hiring notes -----

    pub async fn create_truck_hiring_note(
        &self,
        cmd: NewTruckHiringNote,
    ) -> Result<TruckHiringNote, LedgerError> {
        let number = self
            .resolve_number(DocumentKind::TruckHiringNote, cmd.number)
            .await?;
        let note = TruckHiringNote::new(
            ThnId::new(),
            number,
            cmd.date,
            cmd.truck_owner,
            cmd.vehicle,
            cmd.freight,
            cmd.advance,
        )?;
        self.notes.insert(note.clone()).await?;
        tracing::info!(thn = %note.id_typed(), number = note.number(), "truck hiring note created");
        Ok(note)
    }

    pub async fn get_truck_hiring_note(&self, id: ThnId) -> Result<TruckHiringNote, LedgerError> {
        self.notes.get(id).await?.ok_or(LedgerError::NotFound)
    }

    pub async fn list_truck_hiring_notes(&self) -> Result<Vec<TruckHiringNote>, LedgerError> {
        Ok(self.notes.list().await?)
    }

    // ----- payments -----

    /// Fixed in-request sequence: save payment → link on target → reconcile.
    /// Reconciliation is best-effort and never fails the request.
    pub async fn record_payment(&self, cmd: NewPayment) -> Result<Payment, LedgerError> {
        self.ensure_target_exists(cmd.target).await?;
        let payment = Payment::new(
            PaymentId::new(),
            cmd.amount,
            cmd.date,
            cmd.target,
            cmd.method,
            cmd.reference,
        )?;
        self.payments.insert(payment.clone()).await?;
        self.link_payment(payment.target(), payment.id_typed()).await?;
        self.reconciler
            .reconcile_target_best_effort(payment.target())
            .await;
        Ok(payment)
    }

    pub async fn get_payment(&self, id: PaymentId) -> Result<Payment, LedgerError> {
        self.payments.get(id).await?.ok_or(LedgerError::NotFound)
    }

    pub async fn list_payments(&self) -> Result<Vec<Payment>, LedgerError> {
        Ok(self.payments.list().await?)
    }

    /// On retarget, both the old and the new target are reconciled - leaving
    /// the old one stale until an unrelated mutation would be wrong.
    pub async fn update_payment(
        &self,
        id: PaymentId,
        cmd: PaymentUpdate,
    ) -> Result<Payment, LedgerError> {
        let existing = self.get_payment(id).await?;
        let retargeted = existing.target() != cmd.target;
        if retargeted {
            self.ensure_target_exists(cmd.target).await?;
        }
        let updated = Payment::new(id, cmd.amount, cmd.date, cmd.target, cmd.method, cmd.reference)?;
        self.payments.put(updated.clone()).await?;

        if retargeted {
            self.unlink_payment(existing.target(), id).await?;
            self.link_payment(updated.target(), id).await?;
            self.reconciler
                .reconcile_target_best_effort(existing.target())
                .await;
        }
        self.reconciler
            .reconcile_target_best_effort(updated.target())
            .await;
        Ok(updated)
    }

    pub async fn delete_payment(&self, id: PaymentId) -> Result<(), LedgerError> {
        let existing = self.get_payment(id).await?;
        self.payments.remove(id).await?;
        self.unlink_payment(existing.target(), id).await?;
        self.reconciler
            .reconcile_target_best_effort(existing.target())
            .await;
        Ok(())
    }

    async fn ensure_target_exists(&self, target: PaymentTarget) -> Result<(), LedgerError> {
        let found = match target {
            PaymentTarget::Invoice(id) => self.invoices.get(id).await?.is_some(),
            PaymentTarget::TruckHiringNote(id) => self.notes.get(id).await?.is_some(),
        };
        if found { Ok(()) } else { Err(LedgerError::NotFound) }
    }

    async fn link_payment(
        &self,
        target: PaymentTarget,
        payment_id: PaymentId,
    ) -> Result<(), LedgerError> {
        match target {
            PaymentTarget::Invoice(id) => {
                if let Some(mut invoice) = self.invoices.get(id).await? {
                    invoice.attach_payment(payment_id);
                    self.invoices.put(invoice).await?;
                } else {
                    tracing::warn!(invoice = %id, "payment target vanished before linking");
                }
            }
            PaymentTarget::TruckHiringNote(id) => {
                if let Some(mut note) = self.notes.get(id).await? {
                    note.attach_payment(payment_id);
                    self.notes.put(note).await?;
                } else {
                    tracing::warn!(thn = %id, "payment target vanished before linking");
                }
            }
        }
        Ok(())
    }

    async fn unlink_payment(
        &self,
        target: PaymentTarget,
        payment_id: PaymentId,
    ) -> Result<(), LedgerError> {
        match target {
            PaymentTarget::Invoice(id) => {
                if let Some(mut invoice) = self.invoices.get(id).await? {
                    invoice.detach_payment(&payment_id);
                    self.invoices.put(invoice).await?;
                }
            }
            PaymentTarget::TruckHiringNote(id) => {
                if let Some(mut note) = self.notes.get(id).await? {
                    note.detach_payment(&payment_id);
                    self.notes.put(note).await?;
                }
            }
        }
        Ok(())
    }

    // ----- backup / restore -----

    pub async fn export_backup(&self) -> Result<BackupBundle, LedgerError> {
        Ok(BackupBundle {
            counters: self.counters.dump().await?,
            ranges: self.ranges.list().await?,
            lorry_receipts: self.receipts.list().await?,
            invoices: self.invoices.list().await?,
            truck_hiring_notes: self.notes.list().await?,
            payments: self.payments.list().await?,
        })
    }

    /// Replace every collection with the bundle's contents. Never merges.
    pub async fn restore_backup(&self, bundle: BackupBundle) -> Result<(), LedgerError> {
        self.counters.replace_all(bundle.counters).await?;
        self.ranges.replace_all(bundle.ranges).await?;
        self.receipts.replace_all(bundle.lorry_receipts).await?;
        self.invoices.replace_all(bundle.invoices).await?;
        self.notes.replace_all(bundle.truck_hiring_notes).await?;
        self.payments.replace_all(bundle.payments).await?;
        tracing::info!("backup restored; every collection replaced");
        Ok(())
    }
}
