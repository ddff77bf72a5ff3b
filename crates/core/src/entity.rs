//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Documents (lorry receipts, invoices, hiring notes, payments) are entities:
/// two with identical attribute values are still distinct records.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
