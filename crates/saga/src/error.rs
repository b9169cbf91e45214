//! Saga error types.

use common::SagaId;
use records::StoreError;
use thiserror::Error;

use crate::services::SinkError;
use crate::state::SagaStatus;

/// Errors raised by a single step's forward or compensating action.
#[derive(Debug, Error)]
pub enum StepError {
    /// The record store rejected the operation.
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    /// The remote event sink rejected the notification.
    #[error("Event sink error: {0}")]
    Sink(#[from] SinkError),

    /// A business rule rejected the step before anything was written.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A value the step needs from an earlier step is missing.
    #[error("Missing context value '{field}' from step '{step_id}'")]
    MissingContext { step_id: String, field: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// No saga is registered under the given ID.
    #[error("Saga not found: {0}")]
    NotFound(SagaId),

    /// Saga is in an invalid state for the requested operation.
    #[error("Invalid saga state: expected {expected}, actual {actual}")]
    InvalidState {
        expected: &'static str,
        actual: SagaStatus,
    },

    /// Two steps of the same saga share an ID.
    #[error("Duplicate step id '{0}'")]
    DuplicateStepId(String),

    /// A step index recorded by the orchestrator no longer exists.
    #[error("Saga {saga_id} has no step at index {index}")]
    StepIndexOutOfRange { saga_id: SagaId, index: usize },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
