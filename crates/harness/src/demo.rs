//! End-to-end scenarios against in-memory collaborators.
//!
//! Every scenario gets a fresh seeded store and sink, so they can run in
//! any order and say nothing about each other.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use records::{
    InMemoryRecordStore, Money, NewVisit, RecordId, RecordStore, Severity, Table,
    TransactionStatus,
};
use saga::recipes::{
    ComplaintRequest, SupplierContractRequest, VisitRequest, complaint_with_rating_penalty,
    schedule_visit, supplier_with_contract,
};
use saga::{
    EventKind, FnStep, InMemoryEventSink, InMemorySagaRepository, InvoicePaymentRequest,
    InvoicePaymentSaga, PenaltyRequest, PenaltySaga, SagaDefinition, SagaOrchestrator, SagaStep, StepError,
};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use crate::commands::{run_definition, seeded_store};
use crate::config::Config;
use crate::error::Result;

/// Result of one demo scenario.
#[derive(Debug, Serialize)]
pub struct ScenarioOutcome {
    pub name: &'static str,
    pub expected_success: bool,
    pub success: bool,
    /// Observations checked after the run, e.g. rows left behind.
    pub checks: Value,
    pub output: Value,
}

impl ScenarioOutcome {
    pub fn as_expected(&self) -> bool {
        self.success == self.expected_success
    }
}

/// Runs every scenario and returns their outcomes in order.
pub async fn run_demo() -> Result<Vec<ScenarioOutcome>> {
    let outcomes = vec![
        invoice_success().await?,
        invoice_sink_failure().await?,
        engine_failing_step().await?,
        penalty_unknown_contract().await?,
        supplier_onboarding().await?,
        complaint_sync_failure().await?,
        overlapping_visit().await?,
    ];

    for outcome in &outcomes {
        info!(
            scenario = outcome.name,
            success = outcome.success,
            as_expected = outcome.as_expected(),
            "Scenario finished"
        );
    }
    Ok(outcomes)
}

fn invoice_request(code: &str) -> InvoicePaymentRequest {
    InvoicePaymentRequest {
        contract_id: RecordId::FIRST,
        amount: Money::from_major(150_000),
        received_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap_or_default(),
        due_date: NaiveDate::from_ymd_opt(2024, 2, 14).unwrap_or_default(),
        confirmation_code: code.to_string(),
        transaction_status: TransactionStatus::Success,
    }
}

async fn invoice_success() -> Result<ScenarioOutcome> {
    let store = seeded_store().await?;
    let sink = InMemoryEventSink::new();
    let report = InvoicePaymentSaga::new(store.clone(), sink.clone())
        .create_invoice_with_payment(invoice_request("TRX-001"))
        .await;

    Ok(ScenarioOutcome {
        name: "invoice_payment",
        expected_success: true,
        success: report.success,
        checks: json!({
            "invoices": store.row_count(Table::Invoices).await,
            "transactions": store.row_count(Table::Transactions).await,
            "events_published": sink.published_count(),
        }),
        output: serde_json::to_value(&report)?,
    })
}

async fn invoice_sink_failure() -> Result<ScenarioOutcome> {
    let store = seeded_store().await?;
    let sink = InMemoryEventSink::new();
    sink.set_fail_on_publish(true);
    let report = InvoicePaymentSaga::new(store.clone(), sink.clone())
        .create_invoice_with_payment(invoice_request("TRX-002"))
        .await;

    Ok(ScenarioOutcome {
        name: "invoice_payment_sink_down",
        expected_success: false,
        success: report.success,
        checks: json!({
            "invoices": store.row_count(Table::Invoices).await,
            "transactions": store.row_count(Table::Transactions).await,
            "cancellations": sink.cancellation_count(),
        }),
        output: serde_json::to_value(&report)?,
    })
}

async fn engine_failing_step() -> Result<ScenarioOutcome> {
    let orchestrator = SagaOrchestrator::new(InMemorySagaRepository::new());
    let steps = vec![
        Arc::new(FnStep::new(
            "reserve",
            "Reserve budget",
            |_| async { Ok::<_, StepError>(json!({ "reserved": 1000 })) },
            |ctx| async move {
                let reserved = ctx.field("reserve", "reserved")?.clone();
                Ok::<_, StepError>(json!({ "released": reserved }))
            },
        )) as Arc<dyn SagaStep>,
        Arc::new(FnStep::new(
            "approve",
            "Request approval",
            |_| async { Err::<Value, _>(StepError::Validation("approver rejected".to_string())) },
            |_| async { Ok::<_, StepError>(json!({ "noop": true })) },
        )) as Arc<dyn SagaStep>,
        Arc::new(FnStep::without_compensation("notify", "Notify requester", |_| async {
            Ok::<_, StepError>(json!({ "notified": true }))
        })) as Arc<dyn SagaStep>,
    ];

    let saga_id = orchestrator.create_saga("budget_approval", steps).await?;
    let result = orchestrator.execute_saga(saga_id).await?;
    let status = orchestrator.get_saga_status(saga_id).await?;

    Ok(ScenarioOutcome {
        name: "engine_failing_step",
        expected_success: false,
        success: result.success,
        checks: json!({
            "compensated_steps": result
                .compensation
                .as_ref()
                .map(|c| c.compensated_steps)
                .unwrap_or_default(),
        }),
        output: json!({ "result": result, "status": status }),
    })
}

async fn penalty_unknown_contract() -> Result<ScenarioOutcome> {
    let store = seeded_store().await?;
    let sink = InMemoryEventSink::new();
    let report = PenaltySaga::new(store.clone(), sink.clone())
        .create_penalty_with_sync(PenaltyRequest {
            contract_id: RecordId::new(999),
            reason: "Late delivery".to_string(),
            amount: Money::from_major(5_000),
        })
        .await;

    Ok(ScenarioOutcome {
        name: "penalty_unknown_contract",
        expected_success: false,
        success: report.success,
        checks: json!({
            "penalties": store.row_count(Table::Penalties).await,
            "sink_attempts": sink.attempt_count(),
        }),
        output: serde_json::to_value(&report)?,
    })
}

async fn supplier_onboarding() -> Result<ScenarioOutcome> {
    let store = Arc::new(InMemoryRecordStore::new());
    let sink = Arc::new(InMemoryEventSink::new());
    let definition = supplier_with_contract(
        store.clone(),
        sink.clone(),
        SupplierContractRequest {
            supplier_name: "Polar Logistics".to_string(),
            rating: 8.5,
            contract_title: "Cold chain 2025".to_string(),
            contract_value: Money::from_major(320_000),
        },
    );
    let (success, output) = run_recipe(definition).await?;

    Ok(ScenarioOutcome {
        name: "supplier_with_contract",
        expected_success: true,
        success,
        checks: json!({
            "suppliers": store.row_count(Table::Suppliers).await,
            "contracts": store.row_count(Table::Contracts).await,
        }),
        output,
    })
}

async fn complaint_sync_failure() -> Result<ScenarioOutcome> {
    let store = Arc::new(seeded_store().await?);
    let sink = Arc::new(InMemoryEventSink::new());
    sink.fail_kind(EventKind::Complaint);

    let definition = complaint_with_rating_penalty(
        store.clone(),
        sink.clone(),
        ComplaintRequest {
            supplier_id: RecordId::FIRST,
            description: "Damaged pallets".to_string(),
            severity: Severity::High,
        },
    );
    let (success, output) = run_recipe(definition).await?;

    Ok(ScenarioOutcome {
        name: "complaint_sync_down",
        expected_success: false,
        success,
        checks: json!({
            "complaints": store.row_count(Table::Complaints).await,
            "rating": store.get_supplier(RecordId::FIRST).await?.rating,
        }),
        output,
    })
}

async fn overlapping_visit() -> Result<ScenarioOutcome> {
    let store = Arc::new(seeded_store().await?);
    let sink = Arc::new(InMemoryEventSink::new());
    let nine = Utc::now() + Duration::days(1);
    let (ten, eleven, noon) = (
        nine + Duration::hours(1),
        nine + Duration::hours(2),
        nine + Duration::hours(3),
    );

    store
        .insert_visit(NewVisit {
            supplier_id: RecordId::FIRST,
            starts_at: nine,
            ends_at: eleven,
            purpose: "Quarterly audit".to_string(),
        })
        .await?;

    let definition = schedule_visit(
        store.clone(),
        sink.clone(),
        VisitRequest {
            supplier_id: RecordId::FIRST,
            starts_at: ten,
            ends_at: noon,
            purpose: "Follow-up".to_string(),
        },
    );
    let (success, output) = run_recipe(definition).await?;

    Ok(ScenarioOutcome {
        name: "overlapping_visit",
        expected_success: false,
        success,
        checks: json!({
            "visits": store.row_count(Table::Visits).await,
            "sink_attempts": sink.attempt_count(),
        }),
        output,
    })
}

async fn run_recipe(definition: SagaDefinition) -> Result<(bool, Value)> {
    let outcome = run_definition(&Config::default(), definition).await?;
    Ok((outcome.success, outcome.output))
}
