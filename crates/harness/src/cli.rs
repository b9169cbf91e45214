//! Command-line interface.

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use records::{Money, RecordId, Severity, TransactionStatus};
use saga::recipes::{ComplaintRequest, SupplierContractRequest, VisitRequest};
use saga::{InvoicePaymentRequest, PenaltyRequest};

#[derive(Debug, Parser)]
#[command(name = "procurement-saga", version, about = "Runs procurement sagas and prints their reports")]
pub struct Cli {
    /// Record sink events in memory instead of posting them to SINK_BASE_URL.
    #[arg(long, global = true)]
    pub offline: bool,

    /// Print Prometheus metrics after the report.
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run every scenario against in-memory collaborators.
    Demo,

    #[command(flatten)]
    Saga(SagaCommand),
}

impl Command {
    /// Short name used in logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Demo => "demo",
            Command::Saga(SagaCommand::Invoice(_)) => "invoice",
            Command::Saga(SagaCommand::Penalty(_)) => "penalty",
            Command::Saga(SagaCommand::Supplier(_)) => "supplier",
            Command::Saga(SagaCommand::Complaint(_)) => "complaint",
            Command::Saga(SagaCommand::Visit(_)) => "visit",
        }
    }
}

/// Commands that run one saga against the configured store and sink.
#[derive(Debug, Subcommand)]
pub enum SagaCommand {
    /// Create an invoice with its payment transaction.
    Invoice(InvoiceArgs),
    /// Create a contractual penalty.
    Penalty(PenaltyArgs),
    /// Create a supplier together with its first contract.
    Supplier(SupplierArgs),
    /// Record a complaint and lower the supplier's rating.
    Complaint(ComplaintArgs),
    /// Schedule a supplier visit.
    Visit(VisitArgs),
}

#[derive(Debug, Args)]
pub struct InvoiceArgs {
    #[arg(long)]
    pub contract_id: i64,
    /// Decimal amount, e.g. 150000.00
    #[arg(long)]
    pub amount: Money,
    #[arg(long)]
    pub received_date: NaiveDate,
    #[arg(long)]
    pub due_date: NaiveDate,
    #[arg(long)]
    pub confirmation_code: String,
    /// `success`, `failed`, or any other outcome.
    #[arg(long, default_value = "success")]
    pub transaction_status: String,
}

impl From<InvoiceArgs> for InvoicePaymentRequest {
    fn from(args: InvoiceArgs) -> Self {
        Self {
            contract_id: RecordId::new(args.contract_id),
            amount: args.amount,
            received_date: args.received_date,
            due_date: args.due_date,
            confirmation_code: args.confirmation_code,
            transaction_status: TransactionStatus::from(args.transaction_status),
        }
    }
}

#[derive(Debug, Args)]
pub struct PenaltyArgs {
    #[arg(long)]
    pub contract_id: i64,
    #[arg(long)]
    pub reason: String,
    #[arg(long)]
    pub amount: Money,
}

impl From<PenaltyArgs> for PenaltyRequest {
    fn from(args: PenaltyArgs) -> Self {
        Self {
            contract_id: RecordId::new(args.contract_id),
            reason: args.reason,
            amount: args.amount,
        }
    }
}

#[derive(Debug, Args)]
pub struct SupplierArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long, default_value_t = 5.0)]
    pub rating: f64,
    #[arg(long)]
    pub contract_title: String,
    #[arg(long)]
    pub contract_value: Money,
}

impl From<SupplierArgs> for SupplierContractRequest {
    fn from(args: SupplierArgs) -> Self {
        Self {
            supplier_name: args.name,
            rating: args.rating,
            contract_title: args.contract_title,
            contract_value: args.contract_value,
        }
    }
}

#[derive(Debug, Args)]
pub struct ComplaintArgs {
    #[arg(long)]
    pub supplier_id: i64,
    #[arg(long)]
    pub description: String,
    /// low, medium, high or critical
    #[arg(long)]
    pub severity: Severity,
}

impl From<ComplaintArgs> for ComplaintRequest {
    fn from(args: ComplaintArgs) -> Self {
        Self {
            supplier_id: RecordId::new(args.supplier_id),
            description: args.description,
            severity: args.severity,
        }
    }
}

#[derive(Debug, Args)]
pub struct VisitArgs {
    #[arg(long)]
    pub supplier_id: i64,
    /// RFC 3339 timestamp
    #[arg(long)]
    pub starts_at: DateTime<Utc>,
    /// RFC 3339 timestamp
    #[arg(long)]
    pub ends_at: DateTime<Utc>,
    #[arg(long)]
    pub purpose: String,
}

impl From<VisitArgs> for VisitRequest {
    fn from(args: VisitArgs) -> Self {
        Self {
            supplier_id: RecordId::new(args.supplier_id),
            starts_at: args.starts_at,
            ends_at: args.ends_at,
            purpose: args.purpose,
        }
    }
}
