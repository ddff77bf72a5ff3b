//! `freightdesk-invoicing` - customer invoices over lorry receipts.
//!
//! An invoice bills a customer for an ordered set of lorry receipts. Its
//! settlement status is payment-derived (see `freightdesk-payments`); the
//! only place it changes outside creation is [`Invoice::apply_settlement`],
//! called by the reconciler.

pub mod invoice;

pub use invoice::{Invoice, InvoiceTotals, TaxBreakup};
