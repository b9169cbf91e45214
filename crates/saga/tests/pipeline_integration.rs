//! Integration tests for the fixed invoice and penalty pipelines.

use chrono::NaiveDate;
use records::{
    ContractStatus, InMemoryRecordStore, InvoiceStatus, Money, NewContract, NewSupplier, RecordId,
    RecordStore, Table, TransactionStatus,
};
use saga::pipeline::log::ROLLBACK_STEP;
use saga::{
    InMemoryEventSink, InvoicePaymentRequest, InvoicePaymentSaga, LogStatus, PenaltyRequest,
    PenaltySaga,
};

struct TestHarness {
    store: InMemoryRecordStore,
    sink: InMemoryEventSink,
    invoices: InvoicePaymentSaga<InMemoryRecordStore, InMemoryEventSink>,
    penalties: PenaltySaga<InMemoryRecordStore, InMemoryEventSink>,
}

impl TestHarness {
    async fn new() -> Self {
        let store = InMemoryRecordStore::new();
        let sink = InMemoryEventSink::new();

        let supplier = store
            .insert_supplier(NewSupplier {
                name: "Nordic Steel".to_string(),
                rating: 7.5,
            })
            .await
            .unwrap();
        store
            .insert_contract(NewContract {
                supplier_id: supplier.id,
                title: "Rebar supply 2024".to_string(),
                value: Money::from_major(2_000_000),
                status: ContractStatus::Active,
            })
            .await
            .unwrap();

        Self {
            invoices: InvoicePaymentSaga::new(store.clone(), sink.clone()),
            penalties: PenaltySaga::new(store.clone(), sink.clone()),
            store,
            sink,
        }
    }
}

fn invoice_request(code: &str) -> InvoicePaymentRequest {
    InvoicePaymentRequest {
        contract_id: RecordId::new(1),
        amount: Money::parse("150000.00").unwrap(),
        received_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
        due_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        confirmation_code: code.to_string(),
        transaction_status: TransactionStatus::Success,
    }
}

#[tokio::test]
async fn test_invoice_payment_happy_path() {
    let h = TestHarness::new().await;

    let report = h
        .invoices
        .create_invoice_with_payment(invoice_request("TRX-001"))
        .await;

    assert!(report.success, "{:?}", report.error);
    let receipt = report.data.unwrap();
    assert!(receipt.invoice_id.as_i64() > 0);
    assert!(receipt.transaction_id.as_i64() > 0);
    assert_eq!(receipt.sink_status, "synced");
    assert_eq!(
        h.store.get_invoice(receipt.invoice_id).await.unwrap().status,
        InvoiceStatus::Paid
    );

    let events = h.sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload["amount"], 150000.0);
    assert_eq!(events[0].payload["confirmation_code"], "TRX-001");
    assert_eq!(events[0].payload["status"], "success");
    assert_eq!(events[0].payload["invoice_id"], receipt.invoice_id.as_i64());
}

#[tokio::test]
async fn test_invoice_sink_failure_rolls_back_both_records() {
    let h = TestHarness::new().await;
    h.sink.set_fail_on_publish(true);

    let report = h
        .invoices
        .create_invoice_with_payment(invoice_request("TRX-001"))
        .await;

    assert!(!report.success);
    assert!(report.data.is_none());
    assert!(report.error.is_some());
    assert!(
        h.store
            .get_invoice(RecordId::FIRST)
            .await
            .unwrap_err()
            .is_not_found()
    );
    assert_eq!(h.store.row_count(Table::Transactions).await, 0);

    assert_eq!(report.log.count("STEP_3_FAILED", LogStatus::Error), 1);
    assert_eq!(report.log.count(ROLLBACK_STEP, LogStatus::Success), 2);
    assert_eq!(h.sink.cancellation_count(), 0);
}

#[tokio::test]
async fn test_invoice_log_phases_on_success() {
    let h = TestHarness::new().await;

    let report = h
        .invoices
        .create_invoice_with_payment(invoice_request("TRX-LOG"))
        .await;

    let successes: Vec<_> = report
        .log
        .entries()
        .iter()
        .filter(|e| e.status == LogStatus::Success)
        .map(|e| e.step.as_str())
        .collect();
    assert_eq!(
        successes,
        vec!["STEP_1_SUCCESS", "STEP_2_SUCCESS", "STEP_3_SUCCESS", "SAGA_SUCCESS"]
    );
}

#[tokio::test]
async fn test_invoice_log_phases_on_failure() {
    let h = TestHarness::new().await;
    h.sink.set_fail_on_publish(true);

    let report = h
        .invoices
        .create_invoice_with_payment(invoice_request("TRX-LOG"))
        .await;

    let phases: Vec<_> = report
        .log
        .entries()
        .iter()
        .filter(|e| e.status != LogStatus::Info)
        .map(|e| (e.step.as_str(), e.status))
        .collect();
    assert_eq!(
        phases,
        vec![
            ("STEP_1_SUCCESS", LogStatus::Success),
            ("STEP_2_SUCCESS", LogStatus::Success),
            ("STEP_3_FAILED", LogStatus::Error),
            ("ROLLBACK_STEP", LogStatus::Success),
            ("ROLLBACK_STEP", LogStatus::Success),
        ]
    );
    assert!(!report.log.steps().contains(&"SAGA_SUCCESS"));
    assert!(report.log.entries().iter().any(|e| e.step == "ROLLBACK_START"));
    assert_eq!(report.log.steps().last(), Some(&"ROLLBACK_COMPLETE"));
    assert!(report.log.entries()[8].details.contains("Transaction 1"));
    assert!(
        report
            .log
            .entries()
            .iter()
            .rev()
            .nth(1)
            .unwrap()
            .details
            .contains("Invoice 1")
    );
}

#[tokio::test]
async fn test_duplicate_confirmation_code_rolls_back_invoice() {
    let h = TestHarness::new().await;

    assert!(
        h.invoices
            .create_invoice_with_payment(invoice_request("TRX-DUP"))
            .await
            .success
    );
    let report = h
        .invoices
        .create_invoice_with_payment(invoice_request("TRX-DUP"))
        .await;

    assert!(!report.success);
    assert_eq!(report.log.count("STEP_2_FAILED", LogStatus::Error), 1);
    assert_eq!(report.log.count(ROLLBACK_STEP, LogStatus::Success), 1);
    assert_eq!(h.store.row_count(Table::Invoices).await, 1);
    assert_eq!(h.store.row_count(Table::Transactions).await, 1);
    assert_eq!(h.sink.attempt_count(), 1);
}

#[tokio::test]
async fn test_invoice_for_missing_contract_writes_nothing() {
    let h = TestHarness::new().await;
    let mut request = invoice_request("TRX-404");
    request.contract_id = RecordId::new(99);

    let report = h.invoices.create_invoice_with_payment(request).await;

    assert!(!report.success);
    assert!(report.error.unwrap().contains("does not exist"));
    assert!(!report.log.steps().contains(&"ROLLBACK_START"));
    assert_eq!(h.store.row_count(Table::Invoices).await, 0);
    assert_eq!(h.sink.attempt_count(), 0);
}

#[tokio::test]
async fn test_sequential_runs_allocate_distinct_ids() {
    let h = TestHarness::new().await;

    let first = h
        .invoices
        .create_invoice_with_payment(invoice_request("TRX-A"))
        .await
        .data
        .unwrap();
    let second = h
        .invoices
        .create_invoice_with_payment(invoice_request("TRX-B"))
        .await
        .data
        .unwrap();

    assert_eq!(first.invoice_id, RecordId::FIRST);
    assert_eq!(first.transaction_id, RecordId::FIRST);
    assert_eq!(second.invoice_id, RecordId::new(2));
    assert_eq!(second.transaction_id, RecordId::new(2));

    let p1 = h
        .penalties
        .create_penalty_with_sync(penalty_request())
        .await
        .data
        .unwrap();
    let p2 = h
        .penalties
        .create_penalty_with_sync(penalty_request())
        .await
        .data
        .unwrap();
    assert_eq!(p1.penalty_id, RecordId::FIRST);
    assert_ne!(p1.penalty_id, p2.penalty_id);
}

fn penalty_request() -> PenaltyRequest {
    PenaltyRequest {
        contract_id: RecordId::new(1),
        reason: "Delivery 12 days late".to_string(),
        amount: Money::from_major(7_500),
    }
}

#[tokio::test]
async fn test_penalty_for_missing_contract_fails_fast() {
    let h = TestHarness::new().await;
    let mut request = penalty_request();
    request.contract_id = RecordId::new(42);

    let report = h.penalties.create_penalty_with_sync(request).await;

    assert!(!report.success);
    assert_eq!(h.store.row_count(Table::Penalties).await, 0);
    assert_eq!(h.sink.attempt_count(), 0);
    assert_eq!(
        report.log.steps(),
        vec!["SAGA_START", "STEP_1_START", "STEP_1_FAILED"]
    );
}

#[tokio::test]
async fn test_penalty_sink_failure_deletes_penalty() {
    let h = TestHarness::new().await;
    h.sink.set_fail_on_publish(true);

    let report = h.penalties.create_penalty_with_sync(penalty_request()).await;

    assert!(!report.success);
    assert_eq!(h.store.row_count(Table::Penalties).await, 0);
    assert_eq!(report.log.count("STEP_2_FAILED", LogStatus::Error), 1);
    assert_eq!(report.log.count(ROLLBACK_STEP, LogStatus::Success), 1);
}

#[tokio::test]
async fn test_report_serializes_with_log() {
    let h = TestHarness::new().await;

    let report = h.penalties.create_penalty_with_sync(penalty_request()).await;
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["penalty_id"], 1);
    assert_eq!(json["data"]["sink_status"], "synced");
    assert!(json.get("error").is_none());
    assert_eq!(json["log"][0]["step"], "SAGA_START");
}
