//! Saga orchestration for procurement workflows.
//!
//! Two orchestration styles live here:
//!
//! - Fixed pipelines ([`pipeline`]) hard-code a short sequence of record
//!   store writes followed by a remote event sink notification, and roll
//!   back by hand with an ordered audit log.
//! - The generic engine ([`SagaOrchestrator`]) runs any ordered list of
//!   [`SagaStep`]s and compensates completed steps in reverse order when a
//!   step fails. [`recipes`] assembles domain sagas on top of it.
//!
//! Compensation is best-effort in both: a failing compensation is recorded
//! and the remaining compensations still run.

pub mod context;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod recipes;
pub mod repository;
pub mod saga;
pub mod services;
pub mod state;
pub mod step;

pub use context::StepContext;
pub use error::{SagaError, StepError};
pub use orchestrator::{
    CompensationOutcome, CompensationSummary, ExecutionResult, SagaOrchestrator,
};
pub use pipeline::{
    InvoicePaymentReceipt, InvoicePaymentRequest, InvoicePaymentSaga, LogEntry, LogStatus,
    PenaltyReceipt, PenaltyRequest, PenaltySaga, SagaLog, SagaReport,
};
pub use recipes::SagaDefinition;
pub use repository::{InMemorySagaRepository, SagaRepository};
pub use saga::{Saga, SagaStatusReport, SagaSummary, StepRecord, StepStatusReport};
pub use services::{
    EventKind, EventSink, EventSinkConfig, HttpEventSink, InMemoryEventSink, RecordedEvent,
    SinkError,
};
pub use state::{SagaStatus, StepStatus};
pub use step::{FnStep, SagaStep};
