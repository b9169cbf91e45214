//! Tests for the HTTP event sink against a stub server.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::NaiveDate;
use records::{
    ContractStatus, InMemoryRecordStore, Money, NewContract, NewSupplier, RecordId, RecordStore,
    Table, TransactionStatus,
};
use saga::{
    EventKind, EventSink, EventSinkConfig, HttpEventSink, InvoicePaymentRequest,
    InvoicePaymentSaga, SinkError,
};
use serde_json::{Value, json};

#[derive(Clone)]
struct Stub {
    status: StatusCode,
    delay: Duration,
    received: Arc<Mutex<Vec<(String, Value)>>>,
}

impl Stub {
    fn new(status: StatusCode) -> Self {
        Self {
            status,
            delay: Duration::ZERO,
            received: Arc::default(),
        }
    }

    fn received(&self) -> Vec<(String, Value)> {
        self.received.lock().unwrap().clone()
    }
}

async fn receive(
    State(stub): State<Stub>,
    Path(kind): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    if !stub.delay.is_zero() {
        tokio::time::sleep(stub.delay).await;
    }
    stub.received.lock().unwrap().push((kind, body));
    stub.status
}

async fn spawn_stub(stub: Stub) -> SocketAddr {
    let app = Router::new()
        .route("/api/events/{kind}", post(receive))
        .with_state(stub);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn sink_for(addr: SocketAddr) -> HttpEventSink {
    HttpEventSink::new(EventSinkConfig {
        base_url: format!("http://{addr}"),
        timeout: Duration::from_secs(2),
        rollback_timeout: Duration::from_secs(1),
    })
    .unwrap()
}

#[tokio::test]
async fn test_created_is_success() {
    let stub = Stub::new(StatusCode::CREATED);
    let sink = sink_for(spawn_stub(stub.clone()).await);

    sink.publish(EventKind::Penalty, &json!({ "amount": 10.5 }))
        .await
        .unwrap();

    let received = stub.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, "penalty");
    assert_eq!(received[0].1["amount"], 10.5);
}

#[tokio::test]
async fn test_other_success_codes_are_failures() {
    for status in [StatusCode::OK, StatusCode::ACCEPTED, StatusCode::INTERNAL_SERVER_ERROR] {
        let sink = sink_for(spawn_stub(Stub::new(status)).await);

        let err = sink
            .publish(EventKind::Transaction, &json!({}))
            .await
            .unwrap_err();

        assert!(
            matches!(err, SinkError::UnexpectedStatus { status: s, .. } if s == status.as_u16()),
            "{status}: {err}"
        );
    }
}

#[tokio::test]
async fn test_slow_sink_times_out() {
    let mut stub = Stub::new(StatusCode::CREATED);
    stub.delay = Duration::from_millis(500);
    let addr = spawn_stub(stub).await;
    let sink = HttpEventSink::new(EventSinkConfig {
        base_url: format!("http://{addr}"),
        timeout: Duration::from_millis(50),
        rollback_timeout: Duration::from_millis(50),
    })
    .unwrap();

    let err = sink
        .publish(EventKind::Transaction, &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, SinkError::Timeout(_)), "{err}");

    let err = sink
        .publish_cancellation(EventKind::Transaction, &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, SinkError::Timeout(d) if d == Duration::from_millis(50)));
}

#[tokio::test]
async fn test_unreachable_sink_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = sink_for(addr)
        .publish(EventKind::Visit, &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, SinkError::Transport(_)), "{err}");
}

async fn store_with_contract() -> InMemoryRecordStore {
    let store = InMemoryRecordStore::new();
    let supplier = store
        .insert_supplier(NewSupplier {
            name: "Harbor Foods".to_string(),
            rating: 9.0,
        })
        .await
        .unwrap();
    store
        .insert_contract(NewContract {
            supplier_id: supplier.id,
            title: "Frozen goods".to_string(),
            value: Money::from_major(500_000),
            status: ContractStatus::Active,
        })
        .await
        .unwrap();
    store
}

fn invoice_request() -> InvoicePaymentRequest {
    InvoicePaymentRequest {
        contract_id: RecordId::FIRST,
        amount: Money::parse("150000.00").unwrap(),
        received_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        due_date: NaiveDate::from_ymd_opt(2024, 2, 14).unwrap(),
        confirmation_code: "TRX-001".to_string(),
        transaction_status: TransactionStatus::Success,
    }
}

#[tokio::test]
async fn test_invoice_saga_over_http() {
    let stub = Stub::new(StatusCode::CREATED);
    let sink = sink_for(spawn_stub(stub.clone()).await);
    let store = store_with_contract().await;
    let saga = InvoicePaymentSaga::new(store.clone(), sink);

    let report = saga.create_invoice_with_payment(invoice_request()).await;

    assert!(report.success, "{:?}", report.error);
    let received = stub.received();
    assert_eq!(received[0].0, "transaction");
    assert_eq!(received[0].1["amount"], 150000.0);
    assert_eq!(received[0].1["status"], "success");
}

#[tokio::test]
async fn test_invoice_saga_rolls_back_on_http_500() {
    let stub = Stub::new(StatusCode::INTERNAL_SERVER_ERROR);
    let sink = sink_for(spawn_stub(stub.clone()).await);
    let store = store_with_contract().await;
    let saga = InvoicePaymentSaga::new(store.clone(), sink);

    let report = saga.create_invoice_with_payment(invoice_request()).await;

    assert!(!report.success);
    assert!(report.error.unwrap().contains("500"));
    assert_eq!(store.row_count(Table::Invoices).await, 0);
    assert_eq!(store.row_count(Table::Transactions).await, 0);
    assert_eq!(stub.received().len(), 1);
}
