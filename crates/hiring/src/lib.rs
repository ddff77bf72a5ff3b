//! `freightdesk-hiring` - truck hiring notes (supplier-side freight).
//!
//! A THN records hiring a third-party truck for a haul. Its paid amount,
//! balance, and settlement status all derive from the payment set against
//! the freight figure; [`TruckHiringNote::apply_settlement`] is the single
//! mutation point, driven by the reconciler.

pub mod note;

pub use note::TruckHiringNote;
