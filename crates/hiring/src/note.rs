use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use freightdesk_core::{DomainError, DomainResult, Entity, PaymentId, ThnId, VehicleId};
use freightdesk_payments::SettlementStatus;

/// Aggregate root: truck hiring note.
///
/// `paid_amount`, `balance_amount`, and `status` are derived fields kept in
/// sync by [`apply_settlement`](TruckHiringNote::apply_settlement). The
/// balance is signed: an overpaid note shows a negative balance rather than
/// clamping to zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruckHiringNote {
    id: ThnId,
    number: String,
    date: DateTime<Utc>,
    truck_owner: String,
    vehicle: VehicleId,
    /// Agreed freight for the haul, in the smallest currency unit (paise).
    freight: u64,
    /// Advance figure agreed up front. A recorded figure only - money that
    /// actually moved must be entered as a payment to count.
    advance: u64,
    payment_ids: Vec<PaymentId>,
    paid_amount: u64,
    balance_amount: i64,
    status: SettlementStatus,
}

impl TruckHiringNote {
    pub fn new(
        id: ThnId,
        number: impl Into<String>,
        date: DateTime<Utc>,
        truck_owner: impl Into<String>,
        vehicle: VehicleId,
        freight: u64,
        advance: u64,
    ) -> DomainResult<Self> {
        let number = number.into();
        let truck_owner = truck_owner.into();
        if number.trim().is_empty() {
            return Err(DomainError::validation(
                "truck hiring note number must not be empty",
            ));
        }
        if truck_owner.trim().is_empty() {
            return Err(DomainError::validation("truck owner must not be empty"));
        }
        if freight == 0 {
            return Err(DomainError::validation("freight must be positive"));
        }
        if advance > freight {
            return Err(DomainError::validation(
                "advance must not exceed the agreed freight",
            ));
        }
        Ok(Self {
            id,
            number,
            date,
            truck_owner,
            vehicle,
            freight,
            advance,
            payment_ids: Vec::new(),
            paid_amount: 0,
            balance_amount: freight as i64,
            status: SettlementStatus::Unpaid,
        })
    }

    pub fn id_typed(&self) -> ThnId {
        self.id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn truck_owner(&self) -> &str {
        &self.truck_owner
    }

    pub fn vehicle(&self) -> VehicleId {
        self.vehicle
    }

    pub fn freight(&self) -> u64 {
        self.freight
    }

    pub fn advance(&self) -> u64 {
        self.advance
    }

    pub fn payment_ids(&self) -> &[PaymentId] {
        &self.payment_ids
    }

    pub fn paid_amount(&self) -> u64 {
        self.paid_amount
    }

    pub fn balance_amount(&self) -> i64 {
        self.balance_amount
    }

    pub fn status(&self) -> SettlementStatus {
        self.status
    }

    /// Link a payment to this note's payment list (idempotent).
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

    /// Re-derive paid amount, balance, and status from the given paid sum.
    /// Returns whether any stored derived field changed.
    pub fn apply_settlement(&mut self, paid: u64) -> bool {
        let balance = self.freight as i64 - paid as i64;
        let status = SettlementStatus::classify(paid, self.freight);

        if paid == self.paid_amount && balance == self.balance_amount && status == self.status {
            return false;
        }
        self.paid_amount = paid;
        self.balance_amount = balance;
        self.status = status;
        true
    }
}

impl Entity for TruckHiringNote {
    type Id = ThnId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn note(freight: u64) -> TruckHiringNote {
        TruckHiringNote::new(
            ThnId::new(),
            "THN-1",
            Utc::now(),
            "Sharma Transport",
            VehicleId::new(),
            freight,
            0,
        )
        .unwrap()
    }

    #[test]
    fn new_note_carries_full_balance() {
        let thn = note(500_000);
        assert_eq!(thn.paid_amount(), 0);
        assert_eq!(thn.balance_amount(), 500_000);
        assert_eq!(thn.status(), SettlementStatus::Unpaid);
    }

    #[test]
    fn zero_freight_is_rejected() {
        let err = TruckHiringNote::new(
            ThnId::new(),
            "THN-1",
            Utc::now(),
            "Sharma Transport",
            VehicleId::new(),
            0,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn advance_beyond_freight_is_rejected() {
        let err = TruckHiringNote::new(
            ThnId::new(),
            "THN-1",
            Utc::now(),
            "Sharma Transport",
            VehicleId::new(),
            100,
            101,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn settlement_walks_partial_paid_and_overpaid() {
        let mut thn = note(5_000);

        assert!(thn.apply_settlement(2_000));
        assert_eq!(thn.paid_amount(), 2_000);
        assert_eq!(thn.balance_amount(), 3_000);
        assert_eq!(thn.status(), SettlementStatus::PartiallyPaid);

        assert!(thn.apply_settlement(5_000));
        assert_eq!(thn.balance_amount(), 0);
        assert_eq!(thn.status(), SettlementStatus::Paid);

        // Overpayment stays Paid and shows a negative balance.
        assert!(thn.apply_settlement(5_500));
        assert_eq!(thn.balance_amount(), -500);
        assert_eq!(thn.status(), SettlementStatus::Paid);
    }

    #[test]
    fn unchanged_settlement_reports_no_write() {
        let mut thn = note(5_000);
        thn.apply_settlement(2_000);
        assert!(!thn.apply_settlement(2_000));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: paid + balance always reconstructs the freight figure.
        #[test]
        fn paid_plus_balance_is_freight(
            freight in 1u64..1_000_000_000,
            paid in 0u64..2_000_000_000,
        ) {
            let mut thn = note(freight);
            thn.apply_settlement(paid);
            prop_assert_eq!(
                thn.paid_amount() as i64 + thn.balance_amount(),
                freight as i64
            );
        }
    }
}
