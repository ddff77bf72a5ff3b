use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use freightdesk_core::{CustomerId, DomainError, DomainResult, Entity, LorryReceiptId, VehicleId};

/// Lorry receipt lifecycle.
///
/// `Created → Invoiced` and back are driven by invoice membership.
/// `InTransit` and `Delivered` are recorded by hand against the physical
/// movement; `Paid` is a manual terminal state (nothing derives it from
/// invoice settlement).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LrStatus {
    Created,
    InTransit,
    Delivered,
    Invoiced,
    Paid,
}

/// Freight charges on a receipt, in the smallest currency unit (paise).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LrCharges {
    pub freight: u64,
    pub loading: u64,
    pub unloading: u64,
    pub detention: u64,
}

impl LrCharges {
    pub fn total(&self) -> u64 {
        self.freight
            .saturating_add(self.loading)
            .saturating_add(self.unloading)
            .saturating_add(self.detention)
    }
}

/// Aggregate root: lorry receipt (consignment note).
///
/// Status is only reachable through the transition methods; the lifecycle
/// coordinator and the manual operations own all mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LorryReceipt {
    id: LorryReceiptId,
    number: String,
    date: DateTime<Utc>,
    consignor: CustomerId,
    consignee: CustomerId,
    vehicle: VehicleId,
    origin: String,
    destination: String,
    charges: LrCharges,
    delivered_at: Option<DateTime<Utc>>,
    status: LrStatus,
}

impl LorryReceipt {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: LorryReceiptId,
        number: impl Into<String>,
        date: DateTime<Utc>,
        consignor: CustomerId,
        consignee: CustomerId,
        vehicle: VehicleId,
        origin: impl Into<String>,
        destination: impl Into<String>,
        charges: LrCharges,
    ) -> DomainResult<Self> {
        let number = number.into();
        let origin = origin.into();
        let destination = destination.into();
        if number.trim().is_empty() {
            return Err(DomainError::validation("lorry receipt number must not be empty"));
        }
        if origin.trim().is_empty() || destination.trim().is_empty() {
            return Err(DomainError::validation(
                "origin and destination must not be empty",
            ));
        }
        Ok(Self {
            id,
            number,
            date,
            consignor,
            consignee,
            vehicle,
            origin,
            destination,
            charges,
            delivered_at: None,
            status: LrStatus::Created,
        })
    }

    pub fn id_typed(&self) -> LorryReceiptId {
        self.id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn consignor(&self) -> CustomerId {
        self.consignor
    }

    pub fn consignee(&self) -> CustomerId {
        self.consignee
    }

    pub fn vehicle(&self) -> VehicleId {
        self.vehicle
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn charges(&self) -> LrCharges {
        self.charges
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn status(&self) -> LrStatus {
        self.status
    }

    /// Invariant: a receipt bound to an invoice must not be deleted.
    pub fn can_delete(&self) -> bool {
        self.status != LrStatus::Invoiced
    }

    /// Attach to an invoice: membership forces `Invoiced`, whatever progress
    /// was recorded before.
    pub fn mark_invoiced(&mut self) {
        self.status = LrStatus::Invoiced;
    }

    /// Detach from the last invoice: revert to the given prior state.
    pub fn revert_to(&mut self, status: LrStatus) {
        self.status = status;
    }

    /// Record physical delivery.
    pub fn record_delivery(&mut self, when: DateTime<Utc>) -> DomainResult<()> {
        if self.status == LrStatus::Paid {
            return Err(DomainError::invariant(format!(
                "lorry receipt {} is already settled",
                self.number
            )));
        }
        self.status = LrStatus::Delivered;
        self.delivered_at = Some(when);
        Ok(())
    }

    /// Manually flag the consignment as moving. Only a fresh receipt can be
    /// put in transit; invoiced/delivered progress is never overwritten here.
    pub fn mark_in_transit(&mut self) -> DomainResult<()> {
        if self.status != LrStatus::Created {
            return Err(DomainError::invariant(format!(
                "lorry receipt {} cannot move to in_transit from {:?}",
                self.number, self.status
            )));
        }
        self.status = LrStatus::InTransit;
        Ok(())
    }

    /// Manual terminal state; reachable from any live state.
    pub fn mark_paid(&mut self) {
        self.status = LrStatus::Paid;
    }
}

impl Entity for LorryReceipt {
    type Id = LorryReceiptId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt() -> LorryReceipt {
        LorryReceipt::new(
            LorryReceiptId::new(),
            "LR-100",
            Utc::now(),
            CustomerId::new(),
            CustomerId::new(),
            VehicleId::new(),
            "Nagpur",
            "Pune",
            LrCharges {
                freight: 500_000,
                loading: 10_000,
                unloading: 10_000,
                detention: 0,
            },
        )
        .unwrap()
    }

    #[test]
    fn new_receipt_starts_created() {
        let lr = receipt();
        assert_eq!(lr.status(), LrStatus::Created);
        assert!(lr.delivered_at().is_none());
        assert_eq!(lr.charges().total(), 520_000);
    }

    #[test]
    fn empty_route_is_rejected() {
        let err = LorryReceipt::new(
            LorryReceiptId::new(),
            "LR-100",
            Utc::now(),
            CustomerId::new(),
            CustomerId::new(),
            VehicleId::new(),
            "",
            "Pune",
            LrCharges::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn invoice_membership_round_trip() {
        let mut lr = receipt();
        lr.mark_invoiced();
        assert_eq!(lr.status(), LrStatus::Invoiced);
        assert!(!lr.can_delete());

        lr.revert_to(LrStatus::Created);
        assert_eq!(lr.status(), LrStatus::Created);
        assert!(lr.can_delete());
    }

    #[test]
    fn delivery_records_timestamp() {
        let mut lr = receipt();
        lr.mark_invoiced();
        let when = Utc::now();
        lr.record_delivery(when).unwrap();
        assert_eq!(lr.status(), LrStatus::Delivered);
        assert_eq!(lr.delivered_at(), Some(when));
    }

    #[test]
    fn settled_receipt_rejects_delivery() {
        let mut lr = receipt();
        lr.mark_paid();
        assert!(lr.record_delivery(Utc::now()).is_err());
    }

    #[test]
    fn in_transit_only_from_created() {
        let mut lr = receipt();
        lr.mark_in_transit().unwrap();
        assert_eq!(lr.status(), LrStatus::InTransit);

        let mut invoiced = receipt();
        invoiced.mark_invoiced();
        assert!(invoiced.mark_in_transit().is_err());
    }
}
