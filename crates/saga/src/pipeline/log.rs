//! Ordered audit log kept by the fixed pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SAGA_START: &str = "SAGA_START";
pub const SAGA_SUCCESS: &str = "SAGA_SUCCESS";
pub const ROLLBACK_START: &str = "ROLLBACK_START";
pub const ROLLBACK_STEP: &str = "ROLLBACK_STEP";
pub const ROLLBACK_COMPLETE: &str = "ROLLBACK_COMPLETE";

/// `STEP_{n}_START`
pub fn step_start(n: usize) -> String {
    format!("STEP_{n}_START")
}

/// `STEP_{n}_SUCCESS`
pub fn step_success(n: usize) -> String {
    format!("STEP_{n}_SUCCESS")
}

/// `STEP_{n}_FAILED`
pub fn step_failed(n: usize) -> String {
    format!("STEP_{n}_FAILED")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Info,
    Success,
    Error,
}

/// One phase of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub step: String,
    pub status: LogStatus,
    pub details: String,
}

/// Append-only log for one pipeline run.
///
/// Every entry is also emitted as a `tracing` event under the saga's name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SagaLog {
    entries: Vec<LogEntry>,
}

impl SagaLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, step: impl Into<String>, details: impl Into<String>) {
        self.push(step.into(), LogStatus::Info, details.into());
    }

    pub fn success(&mut self, step: impl Into<String>, details: impl Into<String>) {
        self.push(step.into(), LogStatus::Success, details.into());
    }

    pub fn error(&mut self, step: impl Into<String>, details: impl Into<String>) {
        self.push(step.into(), LogStatus::Error, details.into());
    }

    fn push(&mut self, step: String, status: LogStatus, details: String) {
        match status {
            LogStatus::Info => tracing::info!(step = %step, %details, "saga log"),
            LogStatus::Success => tracing::info!(step = %step, %details, "saga log success"),
            LogStatus::Error => tracing::error!(step = %step, %details, "saga log error"),
        }
        self.entries.push(LogEntry {
            timestamp: Utc::now(),
            step,
            status,
            details,
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Phase tags in order.
    pub fn steps(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.step.as_str()).collect()
    }

    /// Entries with the given tag and status.
    pub fn count(&self, step: &str, status: LogStatus) -> usize {
        self.entries
            .iter()
            .filter(|e| e.step == step && e.status == status)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_keep_order_and_status() {
        let mut log = SagaLog::new();
        log.info(SAGA_START, "begin");
        log.success(step_success(1), "invoice 1 created");
        log.error(step_failed(2), "boom");

        assert_eq!(log.steps(), vec!["SAGA_START", "STEP_1_SUCCESS", "STEP_2_FAILED"]);
        assert_eq!(log.count("STEP_2_FAILED", LogStatus::Error), 1);
        assert_eq!(log.entries()[1].details, "invoice 1 created");
        assert!(log.entries()[0].timestamp <= log.entries()[2].timestamp);
    }

    #[test]
    fn test_serializes_as_list() {
        let mut log = SagaLog::new();
        log.info(step_start(1), "x");
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json[0]["step"], "STEP_1_START");
        assert_eq!(json[0]["status"], "info");
    }
}
