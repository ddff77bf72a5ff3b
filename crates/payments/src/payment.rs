use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use freightdesk_core::{DomainError, DomainResult, Entity, InvoiceId, PaymentId, ThnId};

/// Settlement status shared by invoices and truck hiring notes.
///
/// Always a pure function of the payment sum against the target amount -
/// there is no setter; the reconciler re-derives it after every payment
/// mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl SettlementStatus {
    /// Three-way classification of `paid` against `target_amount`.
    ///
    /// Nothing paid is Unpaid even for a zero target; `paid >= target_amount`
    /// is Paid, so overpayment stays Paid.
    pub fn classify(paid: u64, target_amount: u64) -> Self {
        if paid == 0 {
            SettlementStatus::Unpaid
        } else if paid < target_amount {
            SettlementStatus::PartiallyPaid
        } else {
            SettlementStatus::Paid
        }
    }
}

impl core::fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            SettlementStatus::Unpaid => "unpaid",
            SettlementStatus::PartiallyPaid => "partially_paid",
            SettlementStatus::Paid => "paid",
        };
        f.write_str(s)
    }
}

/// What a payment settles: exactly one invoice or one truck hiring note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum PaymentTarget {
    Invoice(InvoiceId),
    TruckHiringNote(ThnId),
}

/// How the money moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Cheque,
    BankTransfer,
    Upi,
}

/// A received or disbursed payment, in the smallest currency unit (paise).
///
/// Immutable once constructed; an edit replaces the record wholesale through
/// [`Payment::new`], so the amount invariant re-runs every time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    amount: u64,
    date: DateTime<Utc>,
    target: PaymentTarget,
    method: PaymentMethod,
    /// Instrument reference (cheque number, UTR, …).
    reference: Option<String>,
}

impl Payment {
    pub fn new(
        id: PaymentId,
        amount: u64,
        date: DateTime<Utc>,
        target: PaymentTarget,
        method: PaymentMethod,
        reference: Option<String>,
    ) -> DomainResult<Self> {
        if amount == 0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        Ok(Self {
            id,
            amount,
            date,
            target,
            method,
            reference,
        })
    }

    pub fn id_typed(&self) -> PaymentId {
        self.id
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn target(&self) -> PaymentTarget {
        self.target
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }
}

impl Entity for Payment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Sum a payment set, saturating rather than wrapping on pathological input.
pub fn sum_amounts<'a, I>(payments: I) -> u64
where
    I: IntoIterator<Item = &'a Payment>,
{
    payments
        .into_iter()
        .fold(0u64, |acc, p| acc.saturating_add(p.amount()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_amount_is_rejected() {
        let err = Payment::new(
            PaymentId::new(),
            0,
            Utc::now(),
            PaymentTarget::Invoice(InvoiceId::new()),
            PaymentMethod::Cash,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn classify_three_way() {
        assert_eq!(SettlementStatus::classify(0, 1000), SettlementStatus::Unpaid);
        assert_eq!(
            SettlementStatus::classify(400, 1000),
            SettlementStatus::PartiallyPaid
        );
        assert_eq!(SettlementStatus::classify(1000, 1000), SettlementStatus::Paid);
        assert_eq!(SettlementStatus::classify(1500, 1000), SettlementStatus::Paid);
    }

    #[test]
    fn nothing_paid_is_unpaid_even_for_zero_target() {
        assert_eq!(SettlementStatus::classify(0, 0), SettlementStatus::Unpaid);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: classification is monotone in the paid amount - paying
        /// more never moves the status away from Paid.
        #[test]
        fn classification_is_monotone(
            target in 1u64..10_000_000,
            paid in 0u64..10_000_000,
            extra in 0u64..10_000_000,
        ) {
            fn rank(s: SettlementStatus) -> u8 {
                match s {
                    SettlementStatus::Unpaid => 0,
                    SettlementStatus::PartiallyPaid => 1,
                    SettlementStatus::Paid => 2,
                }
            }
            let before = SettlementStatus::classify(paid, target);
            let after = SettlementStatus::classify(paid + extra, target);
            prop_assert!(rank(after) >= rank(before));
        }

        /// Property: classify agrees with the comparison it abstracts.
        #[test]
        fn classify_matches_comparison(target in 1u64..1_000_000, paid in 0u64..2_000_000) {
            let status = SettlementStatus::classify(paid, target);
            match status {
                SettlementStatus::Unpaid => prop_assert_eq!(paid, 0),
                SettlementStatus::PartiallyPaid => {
                    prop_assert!(paid > 0 && paid < target);
                }
                SettlementStatus::Paid => prop_assert!(paid >= target),
            }
        }
    }
}
