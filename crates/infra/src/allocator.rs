//! Sequence allocation.
//!
//! One allocator call issues one document number. With a configured range the
//! number comes out of the range's atomic claim; without one (or past the end
//! of a range that permits it) the unbounded legacy counter takes over. The
//! claim and the counter increment are both single read-modify-write store
//! operations, so two concurrent callers can never receive the same value.

use std::sync::Arc;

use thiserror::Error;

use freightdesk_numbering::{DocumentKind, DocumentNumber};

use crate::store::{CounterStore, RangeClaim, RangeStore, StoreError};

/// Allocation failure.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// Every in-range value is consumed and the range forbids overflowing
    /// into the legacy counter. Recoverable by reconfiguring the range.
    #[error("{0} range exhausted; update the numbering range in Settings")]
    RangeExhausted(DocumentKind),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Issues the next number of a named sequence.
#[derive(Clone)]
pub struct SequenceAllocator {
    ranges: Arc<dyn RangeStore>,
    counters: Arc<dyn CounterStore>,
}

impl SequenceAllocator {
    pub fn new(ranges: Arc<dyn RangeStore>, counters: Arc<dyn CounterStore>) -> Self {
        Self { ranges, counters }
    }

    /// Allocate the next number for `kind`.
    pub async fn allocate(&self, kind: DocumentKind) -> Result<DocumentNumber, AllocationError> {
        match self.ranges.claim_next(kind).await? {
            RangeClaim::Issued(number) => Ok(number),
            RangeClaim::Unconfigured => self.legacy_next(kind).await,
            RangeClaim::Exhausted {
                allow_outside_range: true,
            } => {
                // The configured range stays untouched; numbering continues
                // unbounded on the legacy counter.
                tracing::debug!(kind = %kind, "range exhausted, issuing from legacy counter");
                self.legacy_next(kind).await
            }
            RangeClaim::Exhausted {
                allow_outside_range: false,
            } => Err(AllocationError::RangeExhausted(kind)),
        }
    }

    async fn legacy_next(&self, kind: DocumentKind) -> Result<DocumentNumber, AllocationError> {
        let value = self.counters.increment_and_get(kind.as_str()).await?;
        Ok(DocumentNumber::bare(value))
    }
}
