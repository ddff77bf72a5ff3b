use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use chrono::Utc;

use freightdesk_core::{CustomerId, VehicleId};
use freightdesk_infra::allocator::SequenceAllocator;
use freightdesk_infra::service::{LedgerService, NewInvoice, NewLorryReceipt, NewPayment};
use freightdesk_infra::store::{InMemoryCounterStore, InMemoryRangeStore, RangeStore};
use freightdesk_numbering::{DocumentKind, NumberingRange};
use freightdesk_payments::{PaymentMethod, PaymentTarget};
use freightdesk_receipts::LrCharges;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
}

fn bench_allocation(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("allocation");
    group.throughput(Throughput::Elements(1));

    group.bench_function("range_claim", |b| {
        let ranges = Arc::new(InMemoryRangeStore::new());
        rt.block_on(RangeStore::put(
            ranges.as_ref(),
            NumberingRange::new(DocumentKind::Invoice, "INV-", 1, u64::MAX - 1, false, false)
                .expect("range"),
        ))
        .expect("seed range");
        let allocator = SequenceAllocator::new(ranges, Arc::new(InMemoryCounterStore::new()));

        b.iter(|| {
            let number = rt
                .block_on(allocator.allocate(DocumentKind::Invoice))
                .expect("allocate");
            black_box(number.value)
        });
    });

    group.bench_function("legacy_counter", |b| {
        let allocator = SequenceAllocator::new(
            Arc::new(InMemoryRangeStore::new()),
            Arc::new(InMemoryCounterStore::new()),
        );

        b.iter(|| {
            let number = rt
                .block_on(allocator.allocate(DocumentKind::Invoice))
                .expect("allocate");
            black_box(number.value)
        });
    });

    group.finish();
}

fn bench_reconciliation(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("reconciliation");
    group.throughput(Throughput::Elements(1));

    // One invoice with ten payments; each record_payment runs a full
    // re-derivation over the payment set.
    group.bench_function("record_payment_10_existing", |b| {
        let (service, target) = rt.block_on(async {
            let service = LedgerService::in_memory();
            let lr = service
                .create_lorry_receipt(NewLorryReceipt {
                    number: None,
                    date: Utc::now(),
                    consignor: CustomerId::new(),
                    consignee: CustomerId::new(),
                    vehicle: VehicleId::new(),
                    origin: "Nagpur".to_string(),
                    destination: "Pune".to_string(),
                    charges: LrCharges::default(),
                })
                .await
                .expect("lr");
            let invoice = service
                .create_invoice(NewInvoice {
                    number: None,
                    date: Utc::now(),
                    customer: CustomerId::new(),
                    lr_ids: vec![lr.id_typed()],
                    taxable_amount: 10_000_000,
                    tax: Default::default(),
                })
                .await
                .expect("invoice");
            let target = PaymentTarget::Invoice(invoice.id_typed());
            for _ in 0..10 {
                service
                    .record_payment(NewPayment {
                        amount: 1_000,
                        date: Utc::now(),
                        target,
                        method: PaymentMethod::BankTransfer,
                        reference: None,
                    })
                    .await
                    .expect("payment");
            }
            (service, target)
        });

        b.iter(|| {
            rt.block_on(service.record_payment(NewPayment {
                amount: 1_000,
                date: Utc::now(),
                target,
                method: PaymentMethod::BankTransfer,
                reference: None,
            }))
            .expect("payment")
        });
    });

    group.finish();
}

criterion_group!(benches, bench_allocation, bench_reconciliation);
criterion_main!(benches);
