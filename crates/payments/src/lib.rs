//! `freightdesk-payments` - payment records and settlement derivation.
//!
//! Payments are independent aggregate roots addressed at exactly one target
//! (an invoice or a truck hiring note). A target's settlement status is never
//! stored authoritatively here - it is re-derived from the full payment set
//! by [`SettlementStatus::classify`], which the reconciler calls after every
//! payment mutation.

pub mod payment;

pub use payment::{Payment, PaymentMethod, PaymentTarget, SettlementStatus, sum_amounts};
