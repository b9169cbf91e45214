use std::sync::Arc;

use chrono::NaiveDate;
use criterion::{Criterion, criterion_group, criterion_main};
use records::{
    ContractStatus, InMemoryRecordStore, Money, NewContract, NewSupplier, RecordId, RecordStore,
    TransactionStatus,
};
use saga::{
    FnStep, InMemoryEventSink, InMemorySagaRepository, InvoicePaymentRequest, InvoicePaymentSaga,
    SagaOrchestrator, SagaStep, StepContext, StepError,
};
use serde_json::json;

fn steps(count: usize, failing: Option<usize>) -> Vec<Arc<dyn SagaStep>> {
    (0..count)
        .map(|i| {
            let fail = Some(i) == failing;
            Arc::new(FnStep::new(
                format!("step_{i}"),
                format!("Step {i}"),
                move |_ctx: StepContext| async move {
                    if fail {
                        Err(StepError::Validation("bench failure".to_string()))
                    } else {
                        Ok(json!({ "index": i }))
                    }
                },
                |_| async { Ok::<_, StepError>(json!({ "undone": true })) },
            )) as Arc<dyn SagaStep>
        })
        .collect()
}

fn bench_engine_success(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let orchestrator = SagaOrchestrator::new(InMemorySagaRepository::new());

    c.bench_function("engine/execute_5_steps", |b| {
        b.iter(|| {
            rt.block_on(async {
                let id = orchestrator.create_saga("bench", steps(5, None)).await.unwrap();
                orchestrator.execute_saga(id).await.unwrap();
                orchestrator.remove_saga(id).await.unwrap();
            });
        });
    });
}

fn bench_engine_compensation(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let orchestrator = SagaOrchestrator::new(InMemorySagaRepository::new());

    c.bench_function("engine/fail_last_of_5_and_compensate", |b| {
        b.iter(|| {
            rt.block_on(async {
                let id = orchestrator
                    .create_saga("bench", steps(5, Some(4)))
                    .await
                    .unwrap();
                orchestrator.execute_saga(id).await.unwrap();
                orchestrator.remove_saga(id).await.unwrap();
            });
        });
    });
}

fn bench_invoice_pipeline(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("pipeline/invoice_payment", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryRecordStore::new();
                let supplier = store
                    .insert_supplier(NewSupplier {
                        name: "Bench".to_string(),
                        rating: 5.0,
                    })
                    .await
                    .unwrap();
                store
                    .insert_contract(NewContract {
                        supplier_id: supplier.id,
                        title: "Bench".to_string(),
                        value: Money::from_major(1_000),
                        status: ContractStatus::Active,
                    })
                    .await
                    .unwrap();

                let saga = InvoicePaymentSaga::new(store, InMemoryEventSink::new());
                let report = saga
                    .create_invoice_with_payment(InvoicePaymentRequest {
                        contract_id: RecordId::FIRST,
                        amount: Money::from_major(100),
                        received_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                        due_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
                        confirmation_code: "BENCH-1".to_string(),
                        transaction_status: TransactionStatus::Success,
                    })
                    .await;
                assert!(report.success);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_engine_success,
    bench_engine_compensation,
    bench_invoice_pipeline
);
criterion_main!(benches);
