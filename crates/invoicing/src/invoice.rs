use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use freightdesk_core::{
    CustomerId, DomainError, DomainResult, Entity, InvoiceId, LorryReceiptId, PaymentId,
};
use freightdesk_payments::SettlementStatus;

/// GST components, in the smallest currency unit (paise).
///
/// Intra-state billing carries CGST+SGST, inter-state carries IGST; the
/// engine does not police the split, only the total arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaxBreakup {
    pub cgst: u64,
    pub sgst: u64,
    pub igst: u64,
}

impl TaxBreakup {
    pub fn total(&self) -> u64 {
        self.cgst
            .saturating_add(self.sgst)
            .saturating_add(self.igst)
    }
}

/// Monetary totals of an invoice.
///
/// `grand_total` is computed, never supplied, so the
/// `taxable_amount + taxes == grand_total` invariant holds by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub taxable_amount: u64,
    pub tax: TaxBreakup,
    pub grand_total: u64,
}

impl InvoiceTotals {
    pub fn new(taxable_amount: u64, tax: TaxBreakup) -> DomainResult<Self> {
        let grand_total = taxable_amount
            .checked_add(tax.cgst)
            .and_then(|t| t.checked_add(tax.sgst))
            .and_then(|t| t.checked_add(tax.igst))
            .ok_or_else(|| DomainError::invariant("invoice total overflow"))?;
        Ok(Self {
            taxable_amount,
            tax,
            grand_total,
        })
    }
}

/// Aggregate root: customer invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    id: InvoiceId,
    number: String,
    date: DateTime<Utc>,
    customer: CustomerId,
    lr_ids: Vec<LorryReceiptId>,
    totals: InvoiceTotals,
    payment_ids: Vec<PaymentId>,
    status: SettlementStatus,
}

impl Invoice {
    pub fn new(
        id: InvoiceId,
        number: impl Into<String>,
        date: DateTime<Utc>,
        customer: CustomerId,
        lr_ids: Vec<LorryReceiptId>,
        totals: InvoiceTotals,
    ) -> DomainResult<Self> {
        let number = number.into();
        if number.trim().is_empty() {
            return Err(DomainError::validation("invoice number must not be empty"));
        }
        Self::validate_lr_set(&lr_ids)?;
        Ok(Self {
            id,
            number,
            date,
            customer,
            lr_ids,
            totals,
            payment_ids: Vec::new(),
            status: SettlementStatus::Unpaid,
        })
    }

    fn validate_lr_set(lr_ids: &[LorryReceiptId]) -> DomainResult<()> {
        if lr_ids.is_empty() {
            return Err(DomainError::validation(
                "invoice must cover at least one lorry receipt",
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for id in lr_ids {
            if !seen.insert(*id) {
                return Err(DomainError::validation(format!(
                    "lorry receipt {id} listed twice on invoice"
                )));
            }
        }
        Ok(())
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn customer(&self) -> CustomerId {
        self.customer
    }

    pub fn lr_ids(&self) -> &[LorryReceiptId] {
        &self.lr_ids
    }

    pub fn totals(&self) -> InvoiceTotals {
        self.totals
    }

    pub fn payment_ids(&self) -> &[PaymentId] {
        &self.payment_ids
    }

    pub fn status(&self) -> SettlementStatus {
        self.status
    }

    /// Invariant: an invoice with recorded payments must not be deleted.
    pub fn has_payments(&self) -> bool {
        !self.payment_ids.is_empty()
    }

    /// Replace the covered lorry receipt set (ordered, duplicate-free).
    ///
    /// Status is untouched; the caller runs the lifecycle coordinator over
    /// the old/new difference.
    pub fn replace_lr_set(&mut self, lr_ids: Vec<LorryReceiptId>) -> DomainResult<()> {
        Self::validate_lr_set(&lr_ids)?;
        self.lr_ids = lr_ids;
        Ok(())
    }

    /// Link a payment to this invoice's payment list (idempotent).
    pub fn attach_payment(&mut self, payment_id: PaymentId) {
        if !self.payment_ids.contains(&payment_id) {
            self.payment_ids.push(payment_id);
        }
    }

    /// Unlink a payment; returns whether it was present.
    pub fn detach_payment(&mut self, payment_id: &PaymentId) -> bool {
        let before = self.payment_ids.len();
        self.payment_ids.retain(|p| p != payment_id);
        self.payment_ids.len() != before
    }

    /// Re-derive settlement from the given paid sum. Returns whether the
    /// stored status changed (callers skip the write when it did not).
    pub fn apply_settlement(&mut self, paid: u64) -> bool {
        let next = SettlementStatus::classify(paid, self.totals.grand_total);
        if next == self.status {
            return false;
        }
        self.status = next;
        true
    }
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn totals(taxable: u64) -> InvoiceTotals {
        InvoiceTotals::new(
            taxable,
            TaxBreakup {
                cgst: taxable / 20,
                sgst: taxable / 20,
                igst: 0,
            },
        )
        .unwrap()
    }

    fn invoice(taxable: u64) -> Invoice {
        Invoice::new(
            InvoiceId::new(),
            "INV-1",
            Utc::now(),
            CustomerId::new(),
            vec![LorryReceiptId::new()],
            totals(taxable),
        )
        .unwrap()
    }

    #[test]
    fn grand_total_is_taxable_plus_taxes() {
        let t = totals(100_000);
        assert_eq!(t.grand_total, 110_000);
        assert_eq!(t.tax.total(), 10_000);
    }

    #[test]
    fn new_invoice_is_unpaid_with_no_payments() {
        let inv = invoice(100_000);
        assert_eq!(inv.status(), SettlementStatus::Unpaid);
        assert!(!inv.has_payments());
    }

    #[test]
    fn empty_lr_set_is_rejected() {
        let err = Invoice::new(
            InvoiceId::new(),
            "INV-1",
            Utc::now(),
            CustomerId::new(),
            vec![],
            totals(100_000),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn duplicate_lr_is_rejected() {
        let lr = LorryReceiptId::new();
        let err = Invoice::new(
            InvoiceId::new(),
            "INV-1",
            Utc::now(),
            CustomerId::new(),
            vec![lr, lr],
            totals(100_000),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn settlement_transitions_and_skips_redundant_writes() {
        let mut inv = invoice(100_000); // grand_total 110_000
        assert!(inv.apply_settlement(50_000));
        assert_eq!(inv.status(), SettlementStatus::PartiallyPaid);

        // Same derived status: no write needed.
        assert!(!inv.apply_settlement(60_000));

        assert!(inv.apply_settlement(110_000));
        assert_eq!(inv.status(), SettlementStatus::Paid);

        assert!(inv.apply_settlement(0));
        assert_eq!(inv.status(), SettlementStatus::Unpaid);
    }

    #[test]
    fn payment_links_are_idempotent() {
        let mut inv = invoice(100_000);
        let p = PaymentId::new();
        inv.attach_payment(p);
        inv.attach_payment(p);
        assert_eq!(inv.payment_ids().len(), 1);
        assert!(inv.detach_payment(&p));
        assert!(!inv.detach_payment(&p));
        assert!(!inv.has_payments());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: apply_settlement is idempotent - a second application of
        /// the same paid sum never reports a change.
        #[test]
        fn settlement_is_idempotent(taxable in 1u64..10_000_000, paid in 0u64..20_000_000) {
            let mut inv = invoice(taxable);
            inv.apply_settlement(paid);
            let status = inv.status();
            prop_assert!(!inv.apply_settlement(paid));
            prop_assert_eq!(inv.status(), status);
        }
    }
}
