//! Runs one CLI command against the configured collaborators.

use std::sync::Arc;

use records::{
    ContractStatus, InMemoryRecordStore, Money, NewContract, NewSupplier, PostgresRecordStore,
    RecordStore,
};
use saga::recipes::{complaint_with_rating_penalty, schedule_visit, supplier_with_contract};
use saga::{
    EventSink, HttpEventSink, InMemoryEventSink, InMemorySagaRepository, InvoicePaymentSaga,
    PenaltySaga, SagaDefinition, SagaOrchestrator,
};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use crate::cli::{Command, SagaCommand};
use crate::config::Config;
use crate::demo;
use crate::error::Result;

/// What a command printed and whether the saga behind it succeeded.
#[derive(Debug, Serialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub output: Value,
}

/// Runs `command`. Store and sink are chosen from `config` and `offline`.
pub async fn run(command: Command, offline: bool, config: &Config) -> Result<CommandOutcome> {
    let name = command.name();
    let outcome = match command {
        Command::Demo => {
            let scenarios = demo::run_demo().await?;
            CommandOutcome {
                success: scenarios.iter().all(|s| s.as_expected()),
                output: serde_json::to_value(&scenarios)?,
            }
        }
        Command::Saga(command) => match &config.database_url {
            Some(url) => {
                info!("Using PostgreSQL record store");
                let store = PostgresRecordStore::connect(url).await?;
                store.run_migrations().await?;
                with_sink(command, offline, config, store).await?
            }
            None => {
                info!("DATABASE_URL not set, using seeded in-memory record store");
                with_sink(command, offline, config, seeded_store().await?).await?
            }
        },
    };

    let result = if outcome.success { "success" } else { "failure" };
    metrics::counter!("harness_commands_total", "command" => name, "result" => result)
        .increment(1);
    info!(command = name, result, "Command finished");
    Ok(outcome)
}

async fn with_sink<S>(
    command: SagaCommand,
    offline: bool,
    config: &Config,
    store: S,
) -> Result<CommandOutcome>
where
    S: RecordStore + Clone + 'static,
{
    if offline {
        execute(command, config, store, InMemoryEventSink::new()).await
    } else {
        let sink = HttpEventSink::new(config.sink_config())?;
        execute(command, config, store, sink).await
    }
}

async fn execute<S, E>(
    command: SagaCommand,
    config: &Config,
    store: S,
    sink: E,
) -> Result<CommandOutcome>
where
    S: RecordStore + Clone + 'static,
    E: EventSink + Clone + 'static,
{
    match command {
        SagaCommand::Invoice(args) => {
            let report = InvoicePaymentSaga::new(store, sink)
                .create_invoice_with_payment(args.into())
                .await;
            Ok(CommandOutcome {
                success: report.success,
                output: serde_json::to_value(&report)?,
            })
        }
        SagaCommand::Penalty(args) => {
            let report = PenaltySaga::new(store, sink)
                .create_penalty_with_sync(args.into())
                .await;
            Ok(CommandOutcome {
                success: report.success,
                output: serde_json::to_value(&report)?,
            })
        }
        SagaCommand::Supplier(args) => {
            let definition = supplier_with_contract(Arc::new(store), Arc::new(sink), args.into());
            run_definition(config, definition).await
        }
        SagaCommand::Complaint(args) => {
            let definition =
                complaint_with_rating_penalty(Arc::new(store), Arc::new(sink), args.into());
            run_definition(config, definition).await
        }
        SagaCommand::Visit(args) => {
            let definition = schedule_visit(Arc::new(store), Arc::new(sink), args.into());
            run_definition(config, definition).await
        }
    }
}

/// Executes a recipe on a fresh engine and reports its result and final
/// step statuses.
pub async fn run_definition(config: &Config, definition: SagaDefinition) -> Result<CommandOutcome> {
    let orchestrator =
        SagaOrchestrator::new(InMemorySagaRepository::new()).with_retention(config.saga_retention);

    let saga_id = orchestrator.create_from(definition).await?;
    let result = orchestrator.execute_saga(saga_id).await?;
    let status = orchestrator.get_saga_status(saga_id).await?;

    Ok(CommandOutcome {
        success: result.success,
        output: json!({ "result": result, "status": status }),
    })
}

/// In-memory store holding one supplier with one active contract, so the
/// pipelines have something to reference without a database.
pub async fn seeded_store() -> Result<InMemoryRecordStore> {
    let store = InMemoryRecordStore::new();
    let supplier = store
        .insert_supplier(NewSupplier {
            name: "Acme Industrial Supply".to_string(),
            rating: 8.0,
        })
        .await?;
    store
        .insert_contract(NewContract {
            supplier_id: supplier.id,
            title: "Framework agreement".to_string(),
            value: Money::from_major(1_000_000),
            status: ContractStatus::Active,
        })
        .await?;
    Ok(store)
}
