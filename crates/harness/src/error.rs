//! Harness error types.

use records::StoreError;
use saga::{SagaError, SinkError};
use thiserror::Error;

/// Errors that stop a harness command before it can print a report.
///
/// Saga failures are not errors here: they are reported as data.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    #[error("Event sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Saga engine error: {0}")]
    Saga(#[from] SagaError),

    #[error("Failed to install metrics recorder: {0}")]
    Metrics(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
