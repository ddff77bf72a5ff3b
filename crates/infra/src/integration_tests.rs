//! Integration tests for the composed engine.
//!
//! Exercises: allocation (ranges, legacy fallback, exhaustion, concurrency),
//! settlement reconciliation after payment mutations, the lorry receipt
//! lifecycle driven by invoice membership, and backup/restore - all against
//! the in-memory stores.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use freightdesk_core::{CustomerId, VehicleId};
    use freightdesk_numbering::{DocumentKind, NumberingRange};
    use freightdesk_payments::{PaymentMethod, PaymentTarget, SettlementStatus};
    use freightdesk_receipts::{LrCharges, LrStatus};

    use crate::allocator::{AllocationError, SequenceAllocator};
    use crate::service::{
        LedgerError, LedgerService, NewInvoice, NewLorryReceipt, NewPayment, NewTruckHiringNote,
        PaymentUpdate, RangeConfig,
    };
    use crate::store::{InMemoryCounterStore, InMemoryRangeStore, RangeStore};

    fn lr_cmd(number: Option<&str>) -> NewLorryReceipt {
        NewLorryReceipt {
            number: number.map(str::to_string),
            date: Utc::now(),
            consignor: CustomerId::new(),
            consignee: CustomerId::new(),
            vehicle: VehicleId::new(),
            origin: "Nagpur".to_string(),
            destination: "Pune".to_string(),
            charges: LrCharges {
                freight: 100_000,
                ..LrCharges::default()
            },
        }
    }

    fn payment_cmd(amount: u64, target: PaymentTarget) -> NewPayment {
        NewPayment {
            amount,
            date: Utc::now(),
            target,
            method: PaymentMethod::BankTransfer,
            reference: None,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_allocation_is_gapless_and_unique() {
        let ranges: Arc<InMemoryRangeStore> = Arc::new(InMemoryRangeStore::new());
        ranges
            .put(NumberingRange::new(DocumentKind::Invoice, "INV-", 1, 1000, false, false).unwrap())
            .await
            .unwrap();
        let allocator =
            SequenceAllocator::new(ranges.clone(), Arc::new(InMemoryCounterStore::new()));

        let mut handles = Vec::new();
        for _ in 0..100 {
            let allocator = allocator.clone();
            handles.push(tokio::spawn(async move {
                allocator.allocate(DocumentKind::Invoice).await.unwrap().value
            }));
        }

        let mut values = Vec::with_capacity(handles.len());
        for handle in handles {
            values.push(handle.await.unwrap());
        }
        values.sort_unstable();
        assert_eq!(values, (1..=100).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn exhausted_range_without_overflow_fails() {
        let ranges: Arc<InMemoryRangeStore> = Arc::new(InMemoryRangeStore::new());
        ranges
            .put(NumberingRange::new(DocumentKind::Invoice, "INV-", 1, 2, false, false).unwrap())
            .await
            .unwrap();
        let allocator =
            SequenceAllocator::new(ranges.clone(), Arc::new(InMemoryCounterStore::new()));

        assert_eq!(allocator.allocate(DocumentKind::Invoice).await.unwrap().value, 1);
        assert_eq!(allocator.allocate(DocumentKind::Invoice).await.unwrap().value, 2);

        let err = allocator.allocate(DocumentKind::Invoice).await.unwrap_err();
        assert!(
            err.to_string().contains("invoice range exhausted"),
            "unexpected message: {err}"
        );
        assert!(matches!(
            err,
            AllocationError::RangeExhausted(DocumentKind::Invoice)
        ));
    }

    #[tokio::test]
    async fn exhausted_range_with_overflow_falls_back_to_legacy_counter() {
        let ranges: Arc<InMemoryRangeStore> = Arc::new(InMemoryRangeStore::new());
        ranges
            .put(NumberingRange::new(DocumentKind::Invoice, "INV-", 1, 2, false, true).unwrap())
            .await
            .unwrap();
        let allocator =
            SequenceAllocator::new(ranges.clone(), Arc::new(InMemoryCounterStore::new()));

        assert_eq!(allocator.allocate(DocumentKind::Invoice).await.unwrap().render(), "INV-1");
        assert_eq!(allocator.allocate(DocumentKind::Invoice).await.unwrap().render(), "INV-2");

        // Third allocation succeeds unbounded, bare-rendered.
        let third = allocator.allocate(DocumentKind::Invoice).await.unwrap();
        assert_eq!(third.render(), "1");

        // The configured range is left where exhaustion parked it.
        let range = RangeStore::get(ranges.as_ref(), DocumentKind::Invoice)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(range.current_number, 3);
    }

    #[tokio::test]
    async fn allocation_without_range_uses_legacy_counter() {
        let allocator = SequenceAllocator::new(
            Arc::new(InMemoryRangeStore::new()),
            Arc::new(InMemoryCounterStore::new()),
        );
        for expected in 1u64..=3 {
            let number = allocator.allocate(DocumentKind::LorryReceipt).await.unwrap();
            assert_eq!(number.value, expected);
            assert!(number.prefix.is_none());
        }
    }

    #[tokio::test]
    async fn invoice_settlement_follows_payment_set() {
        let service = LedgerService::in_memory();
        let lr = service.create_lorry_receipt(lr_cmd(None)).await.unwrap();
        let invoice = service
            .create_invoice(NewInvoice {
                number: None,
                date: Utc::now(),
                customer: CustomerId::new(),
                lr_ids: vec![lr.id_typed()],
                taxable_amount: 1000,
                tax: Default::default(),
            })
            .await
            .unwrap();
        let target = PaymentTarget::Invoice(invoice.id_typed());

        service.record_payment(payment_cmd(400, target)).await.unwrap();
        let second = service.record_payment(payment_cmd(600, target)).await.unwrap();
        assert_eq!(
            service.get_invoice(invoice.id_typed()).await.unwrap().status(),
            SettlementStatus::Paid
        );

        // Removing a payment drops the status back; no residual Paid flag.
        service.delete_payment(second.id_typed()).await.unwrap();
        let after = service.get_invoice(invoice.id_typed()).await.unwrap();
        assert_eq!(after.status(), SettlementStatus::PartiallyPaid);
        assert_eq!(after.payment_ids().len(), 1);
    }

    #[tokio::test]
    async fn thn_balance_arithmetic_and_overpayment() {
        let service = LedgerService::in_memory();
        let note = service
            .create_truck_hiring_note(NewTruckHiringNote {
                number: None,
                date: Utc::now(),
                truck_owner: "Sharma Transport".to_string(),
                vehicle: VehicleId::new(),
                freight: 5000,
                advance: 0,
            })
            .await
            .unwrap();
        let target = PaymentTarget::TruckHiringNote(note.id_typed());

        service.record_payment(payment_cmd(2000, target)).await.unwrap();
        let after = service.get_truck_hiring_note(note.id_typed()).await.unwrap();
        assert_eq!(after.paid_amount(), 2000);
        assert_eq!(after.balance_amount(), 3000);
        assert_eq!(after.status(), SettlementStatus::PartiallyPaid);

        service.record_payment(payment_cmd(3000, target)).await.unwrap();
        let after = service.get_truck_hiring_note(note.id_typed()).await.unwrap();
        assert_eq!(after.balance_amount(), 0);
        assert_eq!(after.status(), SettlementStatus::Paid);

        // Overpayment is representable, not clamped.
        service.record_payment(payment_cmd(500, target)).await.unwrap();
        let after = service.get_truck_hiring_note(note.id_typed()).await.unwrap();
        assert_eq!(after.balance_amount(), -500);
        assert_eq!(after.status(), SettlementStatus::Paid);
    }

    #[tokio::test]
    async fn lr_lifecycle_round_trip() {
        let service = LedgerService::in_memory();
        let lr = service.create_lorry_receipt(lr_cmd(None)).await.unwrap();
        assert_eq!(lr.status(), LrStatus::Created);

        let invoice = service
            .create_invoice(NewInvoice {
                number: None,
                date: Utc::now(),
                customer: CustomerId::new(),
                lr_ids: vec![lr.id_typed()],
                taxable_amount: 1000,
                tax: Default::default(),
            })
            .await
            .unwrap();
        assert_eq!(
            service.get_lorry_receipt(lr.id_typed()).await.unwrap().status(),
            LrStatus::Invoiced
        );

        // An invoiced receipt refuses deletion.
        let err = service.delete_lorry_receipt(lr.id_typed()).await.unwrap_err();
        assert!(matches!(err, LedgerError::LrAlreadyInvoiced { .. }));

        // Deleting the invoice reverts the receipt.
        service.delete_invoice(invoice.id_typed()).await.unwrap();
        assert_eq!(
            service.get_lorry_receipt(lr.id_typed()).await.unwrap().status(),
            LrStatus::Created
        );

        service.delete_lorry_receipt(lr.id_typed()).await.unwrap();
        assert!(matches!(
            service.get_lorry_receipt(lr.id_typed()).await.unwrap_err(),
            LedgerError::NotFound
        ));
    }

    #[tokio::test]
    async fn invoice_with_payments_refuses_deletion() {
        let service = LedgerService::in_memory();
        let lr = service.create_lorry_receipt(lr_cmd(None)).await.unwrap();
        let invoice = service
            .create_invoice(NewInvoice {
                number: None,
                date: Utc::now(),
                customer: CustomerId::new(),
                lr_ids: vec![lr.id_typed()],
                taxable_amount: 1000,
                tax: Default::default(),
            })
            .await
            .unwrap();
        let payment = service
            .record_payment(payment_cmd(400, PaymentTarget::Invoice(invoice.id_typed())))
            .await
            .unwrap();

        let err = service.delete_invoice(invoice.id_typed()).await.unwrap_err();
        match err {
            LedgerError::InvoiceHasPayments { payments, .. } => assert_eq!(payments, 1),
            other => panic!("expected InvoiceHasPayments, got {other:?}"),
        }

        // Clearing the payments (each pass reconciling) unblocks deletion.
        service.delete_payment(payment.id_typed()).await.unwrap();
        assert_eq!(
            service.get_invoice(invoice.id_typed()).await.unwrap().status(),
            SettlementStatus::Unpaid
        );
        service.delete_invoice(invoice.id_typed()).await.unwrap();
    }

    #[tokio::test]
    async fn manual_numbers_follow_range_permission() {
        let service = LedgerService::in_memory();
        service
            .upsert_range(
                DocumentKind::LorryReceipt,
                RangeConfig {
                    prefix: "LR-".to_string(),
                    start_number: 1,
                    end_number: 100,
                    allow_manual_entry: false,
                    allow_outside_range: false,
                },
            )
            .await
            .unwrap();

        let err = service
            .create_lorry_receipt(lr_cmd(Some("CUSTOM-9")))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        service
            .upsert_range(
                DocumentKind::LorryReceipt,
                RangeConfig {
                    prefix: "LR-".to_string(),
                    start_number: 1,
                    end_number: 100,
                    allow_manual_entry: true,
                    allow_outside_range: false,
                },
            )
            .await
            .unwrap();

        service
            .create_lorry_receipt(lr_cmd(Some("CUSTOM-9")))
            .await
            .unwrap();

        // The uniqueness constraint has the last word on collisions.
        let err = service
            .create_lorry_receipt(lr_cmd(Some("CUSTOM-9")))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateNumber(_)));
    }

    #[tokio::test]
    async fn retargeted_payment_reconciles_both_targets() {
        let service = LedgerService::in_memory();
        let lr_a = service.create_lorry_receipt(lr_cmd(None)).await.unwrap();
        let lr_b = service.create_lorry_receipt(lr_cmd(None)).await.unwrap();
        let invoice_a = service
            .create_invoice(NewInvoice {
                number: None,
                date: Utc::now(),
                customer: CustomerId::new(),
                lr_ids: vec![lr_a.id_typed()],
                taxable_amount: 1000,
                tax: Default::default(),
            })
            .await
            .unwrap();
        let invoice_b = service
            .create_invoice(NewInvoice {
                number: None,
                date: Utc::now(),
                customer: CustomerId::new(),
                lr_ids: vec![lr_b.id_typed()],
                taxable_amount: 1000,
                tax: Default::default(),
            })
            .await
            .unwrap();

        let payment = service
            .record_payment(payment_cmd(1000, PaymentTarget::Invoice(invoice_a.id_typed())))
            .await
            .unwrap();
        assert_eq!(
            service.get_invoice(invoice_a.id_typed()).await.unwrap().status(),
            SettlementStatus::Paid
        );

        service
            .update_payment(
                payment.id_typed(),
                PaymentUpdate {
                    amount: 1000,
                    date: Utc::now(),
                    target: PaymentTarget::Invoice(invoice_b.id_typed()),
                    method: PaymentMethod::BankTransfer,
                    reference: None,
                },
            )
            .await
            .unwrap();

        let a = service.get_invoice(invoice_a.id_typed()).await.unwrap();
        let b = service.get_invoice(invoice_b.id_typed()).await.unwrap();
        assert_eq!(a.status(), SettlementStatus::Unpaid);
        assert!(a.payment_ids().is_empty());
        assert_eq!(b.status(), SettlementStatus::Paid);
        assert_eq!(b.payment_ids().len(), 1);
    }

    #[tokio::test]
    async fn restore_replaces_instead_of_merging() {
        let service = LedgerService::in_memory();
        service.create_lorry_receipt(lr_cmd(None)).await.unwrap();
        let bundle = service.export_backup().await.unwrap();
        assert_eq!(bundle.lorry_receipts.len(), 1);
        assert_eq!(bundle.counters.len(), 1);

        // State diverges after the export...
        let extra = service.create_lorry_receipt(lr_cmd(None)).await.unwrap();
        assert_eq!(service.list_lorry_receipts().await.unwrap().len(), 2);

        // ...and restore brings back exactly the bundle, nothing else.
        service.restore_backup(bundle).await.unwrap();
        let receipts = service.list_lorry_receipts().await.unwrap();
        assert_eq!(receipts.len(), 1);
        assert!(receipts.iter().all(|r| r.id_typed() != extra.id_typed()));

        // The restored counter resumes where the bundle left it: next
        // allocation repeats the post-export value.
        let next = service.create_lorry_receipt(lr_cmd(None)).await.unwrap();
        assert_eq!(next.number(), "2");
    }
}
