use serde::Serialize;

use super::log::SagaLog;

/// Outcome of a fixed pipeline run.
///
/// Pipelines never return `Err`; every failure is folded in here, and the
/// log is always present.
#[derive(Debug, Clone, Serialize)]
pub struct SagaReport<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub log: SagaLog,
}

impl<T> SagaReport<T> {
    pub fn succeeded(message: impl Into<String>, data: T, log: SagaLog) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error: None,
            log,
        }
    }

    pub fn failed(message: impl Into<String>, error: impl Into<String>, log: SagaLog) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error: Some(error.into()),
            log,
        }
    }
}
