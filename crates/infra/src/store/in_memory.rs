//! In-memory stores.
//!
//! Intended for tests/dev. Not optimized for performance; uniqueness checks
//! scan the collection. The counter increment and the range claim run inside
//! a single write-lock hold, which is what makes them atomic here.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use freightdesk_core::{Entity, InvoiceId, LorryReceiptId, PaymentId, ThnId};
use freightdesk_hiring::TruckHiringNote;
use freightdesk_invoicing::Invoice;
use freightdesk_numbering::{DocumentKind, NumberingRange, SequenceCounter};
use freightdesk_payments::{Payment, PaymentTarget};
use freightdesk_receipts::LorryReceipt;

use super::{
    CounterStore, InvoiceStore, LorryReceiptStore, PaymentStore, RangeClaim, RangeStore,
    StoreError, ThnStore,
};

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

/// In-memory legacy counters.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counters: RwLock<HashMap<String, u64>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment_and_get(&self, name: &str) -> Result<u64, StoreError> {
        let mut counters = self.counters.write().map_err(|_| poisoned())?;
        let value = counters.entry(name.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn dump(&self) -> Result<Vec<SequenceCounter>, StoreError> {
        let counters = self.counters.read().map_err(|_| poisoned())?;
        Ok(counters
            .iter()
            .map(|(name, value)| SequenceCounter {
                name: name.clone(),
                value: *value,
            })
            .collect())
    }

    async fn replace_all(&self, replacement: Vec<SequenceCounter>) -> Result<(), StoreError> {
        let mut counters = self.counters.write().map_err(|_| poisoned())?;
        counters.clear();
        for c in replacement {
            counters.insert(c.name, c.value);
        }
        Ok(())
    }
}

/// In-memory numbering ranges.
#[derive(Debug, Default)]
pub struct InMemoryRangeStore {
    ranges: RwLock<HashMap<DocumentKind, NumberingRange>>,
}

impl InMemoryRangeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RangeStore for InMemoryRangeStore {
    async fn get(&self, kind: DocumentKind) -> Result<Option<NumberingRange>, StoreError> {
        let ranges = self.ranges.read().map_err(|_| poisoned())?;
        Ok(ranges.get(&kind).cloned())
    }

    async fn put(&self, range: NumberingRange) -> Result<(), StoreError> {
        let mut ranges = self.ranges.write().map_err(|_| poisoned())?;
        ranges.insert(range.document_kind, range);
        Ok(())
    }

    async fn claim_next(&self, kind: DocumentKind) -> Result<RangeClaim, StoreError> {
        // Issue + advance under one write-lock hold: the in-memory equivalent
        // of a conditional UPDATE .. RETURNING.
        let mut ranges = self.ranges.write().map_err(|_| poisoned())?;
        let Some(range) = ranges.get_mut(&kind) else {
            return Ok(RangeClaim::Unconfigured);
        };
        match range.issue_next() {
            Some(value) => Ok(RangeClaim::Issued(range.number_for(value))),
            None => Ok(RangeClaim::Exhausted {
                allow_outside_range: range.allow_outside_range,
            }),
        }
    }

    async fn list(&self) -> Result<Vec<NumberingRange>, StoreError> {
        let ranges = self.ranges.read().map_err(|_| poisoned())?;
        let mut all: Vec<NumberingRange> = ranges.values().cloned().collect();
        all.sort_by_key(|r| r.document_kind.as_str());
        Ok(all)
    }

    async fn replace_all(&self, replacement: Vec<NumberingRange>) -> Result<(), StoreError> {
        let mut ranges = self.ranges.write().map_err(|_| poisoned())?;
        ranges.clear();
        for r in replacement {
            ranges.insert(r.document_kind, r);
        }
        Ok(())
    }
}

macro_rules! in_memory_document_store {
    ($store:ident, $trait:ident, $doc:ty, $id:ty, $label:literal) => {
        #[derive(Debug, Default)]
        pub struct $store {
            documents: RwLock<HashMap<$id, $doc>>,
        }

        impl $store {
            pub fn new() -> Self {
                Self::default()
            }

            fn number_taken(
                documents: &HashMap<$id, $doc>,
                candidate: &$doc,
            ) -> bool {
                documents.values().any(|existing| {
                    existing.number() == candidate.number()
                        && Entity::id(existing) != Entity::id(candidate)
                })
            }
        }

        #[async_trait]
        impl $trait for $store {
            async fn insert(&self, document: $doc) -> Result<(), StoreError> {
                let mut documents = self.documents.write().map_err(|_| poisoned())?;
                if Self::number_taken(&documents, &document) {
                    return Err(StoreError::Duplicate(format!(
                        concat!($label, " {}"),
                        document.number()
                    )));
                }
                documents.insert(document.id_typed(), document);
                Ok(())
            }

            async fn get(&self, id: $id) -> Result<Option<$doc>, StoreError> {
                let documents = self.documents.read().map_err(|_| poisoned())?;
                Ok(documents.get(&id).cloned())
            }

            async fn put(&self, document: $doc) -> Result<(), StoreError> {
                let mut documents = self.documents.write().map_err(|_| poisoned())?;
                if Self::number_taken(&documents, &document) {
                    return Err(StoreError::Duplicate(format!(
                        concat!($label, " {}"),
                        document.number()
                    )));
                }
                documents.insert(document.id_typed(), document);
                Ok(())
            }

            async fn remove(&self, id: $id) -> Result<bool, StoreError> {
                let mut documents = self.documents.write().map_err(|_| poisoned())?;
                Ok(documents.remove(&id).is_some())
            }

            async fn list(&self) -> Result<Vec<$doc>, StoreError> {
                let documents = self.documents.read().map_err(|_| poisoned())?;
                let mut all: Vec<$doc> = documents.values().cloned().collect();
                all.sort_by(|a, b| a.number().cmp(b.number()));
                Ok(all)
            }

            async fn replace_all(&self, replacement: Vec<$doc>) -> Result<(), StoreError> {
                let mut documents = self.documents.write().map_err(|_| poisoned())?;
                documents.clear();
                for d in replacement {
                    documents.insert(d.id_typed(), d);
                }
                Ok(())
            }
        }
    };
}

in_memory_document_store!(
    InMemoryLorryReceiptStore,
    LorryReceiptStore,
    LorryReceipt,
    LorryReceiptId,
    "lorry receipt"
);
in_memory_document_store!(InMemoryInvoiceStore, InvoiceStore, Invoice, InvoiceId, "invoice");
in_memory_document_store!(
    InMemoryThnStore,
    ThnStore,
    TruckHiringNote,
    ThnId,
    "truck hiring note"
);

/// In-memory payments, with a linear scan standing in for the target index.
#[derive(Debug, Default)]
pub struct InMemoryPaymentStore {
    payments: RwLock<HashMap<PaymentId, Payment>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, payment: Payment) -> Result<(), StoreError> {
        let mut payments = self.payments.write().map_err(|_| poisoned())?;
        payments.insert(payment.id_typed(), payment);
        Ok(())
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        let payments = self.payments.read().map_err(|_| poisoned())?;
        Ok(payments.get(&id).cloned())
    }

    async fn put(&self, payment: Payment) -> Result<(), StoreError> {
        let mut payments = self.payments.write().map_err(|_| poisoned())?;
        payments.insert(payment.id_typed(), payment);
        Ok(())
    }

    async fn remove(&self, id: PaymentId) -> Result<bool, StoreError> {
        let mut payments = self.payments.write().map_err(|_| poisoned())?;
        Ok(payments.remove(&id).is_some())
    }

    async fn list(&self) -> Result<Vec<Payment>, StoreError> {
        let payments = self.payments.read().map_err(|_| poisoned())?;
        Ok(payments.values().cloned().collect())
    }

    async fn list_for_target(&self, target: PaymentTarget) -> Result<Vec<Payment>, StoreError> {
        let payments = self.payments.read().map_err(|_| poisoned())?;
        Ok(payments
            .values()
            .filter(|p| p.target() == target)
            .cloned()
            .collect())
    }

    async fn replace_all(&self, replacement: Vec<Payment>) -> Result<(), StoreError> {
        let mut payments = self.payments.write().map_err(|_| poisoned())?;
        payments.clear();
        for p in replacement {
            payments.insert(p.id_typed(), p);
        }
        Ok(())
    }
}
