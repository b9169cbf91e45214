//! Saga and step state machines.

use serde::{Deserialize, Serialize};

/// The state of a saga in its lifecycle.
///
/// State transitions:
/// ```text
/// Started ──► InProgress ──┬──► Completed
///                          └──► Failed ──► Compensating ──► Compensated
/// ```
///
/// A saga whose compensation partly failed still ends in `Compensated`;
/// the per-step failures are kept on the steps and in the compensation
/// summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SagaStatus {
    /// Registered, not executed yet.
    #[default]
    Started,

    /// Steps are being executed.
    InProgress,

    /// All steps completed successfully (terminal state).
    Completed,

    /// A step failed; compensation has not started yet.
    Failed,

    /// Completed steps are being compensated.
    Compensating,

    /// Compensation finished after a failure (terminal state).
    Compensated,
}

impl SagaStatus {
    /// Returns true if the saga can begin executing.
    pub fn can_execute(&self) -> bool {
        matches!(self, SagaStatus::Started)
    }

    /// Returns true if the saga can begin compensation.
    pub fn can_compensate(&self) -> bool {
        matches!(self, SagaStatus::Failed)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaStatus::Completed | SagaStatus::Compensated)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "started",
            SagaStatus::InProgress => "in_progress",
            SagaStatus::Completed => "completed",
            SagaStatus::Failed => "failed",
            SagaStatus::Compensating => "compensating",
            SagaStatus::Compensated => "compensated",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The state of a single step.
///
/// State transitions:
/// ```text
/// Pending ──► Executing ──┬──► Completed ──► Compensating ──┬──► Compensated
///                         └──► Failed                        └──► CompensationFailed
/// ```
///
/// A step that is never reached stays `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Executing,
    Completed,
    Failed,
    Compensating,
    Compensated,
    CompensationFailed,
}

impl StepStatus {
    /// Returns true if the step's compensating action may be invoked.
    pub fn can_compensate(&self) -> bool {
        matches!(self, StepStatus::Completed)
    }

    /// Returns true if the forward action finished successfully at some
    /// point, whether or not it has been compensated since.
    pub fn forward_completed(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed
                | StepStatus::Compensating
                | StepStatus::Compensated
                | StepStatus::CompensationFailed
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Executing => "executing",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Compensating => "compensating",
            StepStatus::Compensated => "compensated",
            StepStatus::CompensationFailed => "compensation_failed",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_states() {
        assert_eq!(SagaStatus::default(), SagaStatus::Started);
        assert_eq!(StepStatus::default(), StepStatus::Pending);
    }

    #[test]
    fn test_can_execute() {
        assert!(SagaStatus::Started.can_execute());
        assert!(!SagaStatus::InProgress.can_execute());
        assert!(!SagaStatus::Completed.can_execute());
        assert!(!SagaStatus::Failed.can_execute());
        assert!(!SagaStatus::Compensating.can_execute());
        assert!(!SagaStatus::Compensated.can_execute());
    }

    #[test]
    fn test_can_compensate() {
        assert!(!SagaStatus::Started.can_compensate());
        assert!(!SagaStatus::InProgress.can_compensate());
        assert!(SagaStatus::Failed.can_compensate());
        assert!(!SagaStatus::Completed.can_compensate());
        assert!(!SagaStatus::Compensated.can_compensate());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SagaStatus::Started.is_terminal());
        assert!(!SagaStatus::InProgress.is_terminal());
        assert!(!SagaStatus::Failed.is_terminal());
        assert!(!SagaStatus::Compensating.is_terminal());
        assert!(SagaStatus::Completed.is_terminal());
        assert!(SagaStatus::Compensated.is_terminal());
    }

    #[test]
    fn test_only_completed_steps_are_compensable() {
        assert!(StepStatus::Completed.can_compensate());
        assert!(!StepStatus::Pending.can_compensate());
        assert!(!StepStatus::Failed.can_compensate());
        assert!(!StepStatus::Compensated.can_compensate());
    }

    #[test]
    fn test_forward_completed() {
        assert!(StepStatus::Completed.forward_completed());
        assert!(StepStatus::Compensated.forward_completed());
        assert!(StepStatus::CompensationFailed.forward_completed());
        assert!(!StepStatus::Pending.forward_completed());
        assert!(!StepStatus::Failed.forward_completed());
    }

    #[test]
    fn test_display() {
        assert_eq!(SagaStatus::InProgress.to_string(), "in_progress");
        assert_eq!(SagaStatus::Compensated.to_string(), "compensated");
        assert_eq!(
            StepStatus::CompensationFailed.to_string(),
            "compensation_failed"
        );
    }

    #[test]
    fn test_serialization_matches_display() {
        let json = serde_json::to_string(&SagaStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let back: StepStatus = serde_json::from_str("\"compensating\"").unwrap();
        assert_eq!(back, StepStatus::Compensating);
    }
}
