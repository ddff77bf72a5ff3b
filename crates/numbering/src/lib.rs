//! `freightdesk-numbering` - document number sequences.
//!
//! Pure domain model for the numbering engine: per-document-kind ranges with
//! prefix and bounds, the unbounded legacy counter, and the rendered
//! [`DocumentNumber`]. Atomicity of issuance lives at the store boundary;
//! this crate owns the arithmetic and the invariants.

pub mod sequence;

pub use sequence::{DocumentKind, DocumentNumber, NumberingRange, SequenceCounter};
