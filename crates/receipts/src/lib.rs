//! `freightdesk-receipts` - lorry receipts (consignment notes).
//!
//! A lorry receipt is the foundational transport-service record for one
//! shipment. Its lifecycle is driven partly by hand (transit, delivery) and
//! partly by invoice membership (invoiced, reverted), with the guard rules
//! enforced here and orchestrated by the lifecycle coordinator.

pub mod receipt;

pub use receipt::{LorryReceipt, LrCharges, LrStatus};
