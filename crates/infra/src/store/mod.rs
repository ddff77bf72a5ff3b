//! Document store boundary.
//!
//! Every engine in this crate talks to storage exclusively through these
//! traits. Each call is one independent round trip; nothing here wraps
//! multiple documents in a transaction. The two pieces of state with a true
//! race - the range position and the legacy counters - are only reachable
//! through single atomic read-modify-write operations ([`RangeStore::claim_next`],
//! [`CounterStore::increment_and_get`]).

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use freightdesk_core::{InvoiceId, LorryReceiptId, PaymentId, ThnId};
use freightdesk_hiring::TruckHiringNote;
use freightdesk_invoicing::Invoice;
use freightdesk_numbering::{DocumentKind, DocumentNumber, NumberingRange, SequenceCounter};
use freightdesk_payments::{Payment, PaymentTarget};
use freightdesk_receipts::LorryReceipt;

pub use in_memory::{
    InMemoryCounterStore, InMemoryInvoiceStore, InMemoryLorryReceiptStore, InMemoryPaymentStore,
    InMemoryRangeStore, InMemoryThnStore,
};
pub use postgres::PostgresStores;

/// Storage-boundary error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The (kind, number) uniqueness constraint rejected a write.
    #[error("duplicate document number: {0}")]
    Duplicate(String),

    /// A document failed to (de)serialize at the boundary.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The backend refused or dropped the operation (connectivity, locks).
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Outcome of an atomic range claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeClaim {
    /// An in-range value was issued and the position advanced, in one
    /// conditional read-modify-write.
    Issued(DocumentNumber),
    /// A range exists but every in-range value is consumed.
    Exhausted { allow_outside_range: bool },
    /// No range is configured for this kind.
    Unconfigured,
}

/// Legacy counters: unbounded, monotonic, per sequence name.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomic increment-and-return. A missing counter is created at zero
    /// first, so the first call yields 1. Never a separate read and write.
    async fn increment_and_get(&self, name: &str) -> Result<u64, StoreError>;

    async fn dump(&self) -> Result<Vec<SequenceCounter>, StoreError>;

    /// Replace every counter (restore path). Never merges.
    async fn replace_all(&self, counters: Vec<SequenceCounter>) -> Result<(), StoreError>;
}

/// Configured numbering ranges, one per document kind.
#[async_trait]
pub trait RangeStore: Send + Sync {
    async fn get(&self, kind: DocumentKind) -> Result<Option<NumberingRange>, StoreError>;

    async fn put(&self, range: NumberingRange) -> Result<(), StoreError>;

    /// Atomically claim the next value of the kind's range, advancing
    /// `current_number` in the same conditional write. Exhaustion and the
    /// unconfigured case report without mutating anything.
    async fn claim_next(&self, kind: DocumentKind) -> Result<RangeClaim, StoreError>;

    async fn list(&self) -> Result<Vec<NumberingRange>, StoreError>;

    /// Replace every range (restore path). Never merges.
    async fn replace_all(&self, ranges: Vec<NumberingRange>) -> Result<(), StoreError>;
}

/// Lorry receipt collection, unique on the receipt number.
#[async_trait]
pub trait LorryReceiptStore: Send + Sync {
    async fn insert(&self, receipt: LorryReceipt) -> Result<(), StoreError>;
    async fn get(&self, id: LorryReceiptId) -> Result<Option<LorryReceipt>, StoreError>;
    async fn put(&self, receipt: LorryReceipt) -> Result<(), StoreError>;
    async fn remove(&self, id: LorryReceiptId) -> Result<bool, StoreError>;
    async fn list(&self) -> Result<Vec<LorryReceipt>, StoreError>;
    async fn replace_all(&self, receipts: Vec<LorryReceipt>) -> Result<(), StoreError>;
}

/// Invoice collection, unique on the invoice number.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn insert(&self, invoice: Invoice) -> Result<(), StoreError>;
    async fn get(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError>;
    async fn put(&self, invoice: Invoice) -> Result<(), StoreError>;
    async fn remove(&self, id: InvoiceId) -> Result<bool, StoreError>;
    async fn list(&self) -> Result<Vec<Invoice>, StoreError>;
    async fn replace_all(&self, invoices: Vec<Invoice>) -> Result<(), StoreError>;
}

/// Truck hiring note collection, unique on the note number.
#[async_trait]
pub trait ThnStore: Send + Sync {
    async fn insert(&self, note: TruckHiringNote) -> Result<(), StoreError>;
    async fn get(&self, id: ThnId) -> Result<Option<TruckHiringNote>, StoreError>;
    async fn put(&self, note: TruckHiringNote) -> Result<(), StoreError>;
    async fn remove(&self, id: ThnId) -> Result<bool, StoreError>;
    async fn list(&self) -> Result<Vec<TruckHiringNote>, StoreError>;
    async fn replace_all(&self, notes: Vec<TruckHiringNote>) -> Result<(), StoreError>;
}

/// Payment collection, queryable by settlement target.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, payment: Payment) -> Result<(), StoreError>;
    async fn get(&self, id: PaymentId) -> Result<Option<Payment>, StoreError>;
    async fn put(&self, payment: Payment) -> Result<(), StoreError>;
    async fn remove(&self, id: PaymentId) -> Result<bool, StoreError>;
    async fn list(&self) -> Result<Vec<Payment>, StoreError>;
    async fn list_for_target(&self, target: PaymentTarget) -> Result<Vec<Payment>, StoreError>;
    async fn replace_all(&self, payments: Vec<Payment>) -> Result<(), StoreError>;
}
