//! Saga instances held by the generic engine.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::SagaId;
use serde::Serialize;
use serde_json::Value;

use crate::context::StepContext;
use crate::error::SagaError;
use crate::state::{SagaStatus, StepStatus};
use crate::step::SagaStep;

/// A step of a saga instance together with its runtime state.
#[derive(Clone)]
pub struct StepRecord {
    step: Arc<dyn SagaStep>,
    status: StepStatus,
    result: Option<Value>,
    error: Option<String>,
    executed_at: Option<DateTime<Utc>>,
    compensated_at: Option<DateTime<Utc>>,
}

impl StepRecord {
    fn new(step: Arc<dyn SagaStep>) -> Self {
        Self {
            step,
            status: StepStatus::Pending,
            result: None,
            error: None,
            executed_at: None,
            compensated_at: None,
        }
    }

    pub fn id(&self) -> &str {
        self.step.id()
    }

    pub fn name(&self) -> &str {
        self.step.name()
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn executed_at(&self) -> Option<DateTime<Utc>> {
        self.executed_at
    }

    pub fn compensated_at(&self) -> Option<DateTime<Utc>> {
        self.compensated_at
    }

    pub(crate) fn step(&self) -> Arc<dyn SagaStep> {
        Arc::clone(&self.step)
    }

    pub(crate) fn mark_executing(&mut self) {
        self.status = StepStatus::Executing;
        self.executed_at = Some(Utc::now());
    }

    pub(crate) fn mark_completed(&mut self, result: Value) {
        self.status = StepStatus::Completed;
        self.result = Some(result);
    }

    pub(crate) fn mark_failed(&mut self, error: String) {
        self.status = StepStatus::Failed;
        self.error = Some(error);
    }

    pub(crate) fn mark_compensating(&mut self) {
        self.status = StepStatus::Compensating;
        self.compensated_at = Some(Utc::now());
    }

    pub(crate) fn mark_compensated(&mut self) {
        self.status = StepStatus::Compensated;
    }

    pub(crate) fn mark_compensation_failed(&mut self, error: String) {
        self.status = StepStatus::CompensationFailed;
        self.error = Some(error);
    }

    fn report(&self) -> StepStatusReport {
        StepStatusReport {
            id: self.id().to_string(),
            name: self.name().to_string(),
            status: self.status,
            executed_at: self.executed_at,
            compensated_at: self.compensated_at,
            error: self.error.clone(),
        }
    }
}

impl std::fmt::Debug for StepRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRecord")
            .field("id", &self.id())
            .field("status", &self.status)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// An ordered sequence of steps executed as one saga.
///
/// Step order is authoritative: steps execute in list order and completed
/// steps are compensated in reverse list order.
#[derive(Debug, Clone)]
pub struct Saga {
    id: SagaId,
    name: String,
    steps: Vec<StepRecord>,
    status: SagaStatus,
    context: StepContext,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl Saga {
    /// Creates a saga in the `Started` state with a fresh ID.
    ///
    /// Fails if two steps share an ID.
    pub fn new(name: impl Into<String>, steps: Vec<Arc<dyn SagaStep>>) -> Result<Self, SagaError> {
        let mut seen = HashSet::new();
        for step in &steps {
            if !seen.insert(step.id().to_string()) {
                return Err(SagaError::DuplicateStepId(step.id().to_string()));
            }
        }

        Ok(Self {
            id: SagaId::new(),
            name: name.into(),
            steps: steps.into_iter().map(StepRecord::new).collect(),
            status: SagaStatus::Started,
            context: StepContext::new(),
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        })
    }

    pub fn id(&self) -> SagaId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> SagaStatus {
        self.status
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// Results of completed steps, keyed by step ID.
    pub fn context(&self) -> &StepContext {
        &self.context
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Number of steps whose compensating action failed.
    pub fn compensation_failures(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::CompensationFailed)
            .count()
    }

    pub(crate) fn step_mut(&mut self, index: usize) -> Result<&mut StepRecord, SagaError> {
        let saga_id = self.id;
        self.steps
            .get_mut(index)
            .ok_or(SagaError::StepIndexOutOfRange { saga_id, index })
    }

    pub(crate) fn record_result(&mut self, index: usize, result: Value) -> Result<(), SagaError> {
        let step = self.step_mut(index)?;
        let step_id = step.id().to_string();
        step.mark_completed(result.clone());
        self.context.insert(step_id, result);
        Ok(())
    }

    pub(crate) fn set_status(&mut self, status: SagaStatus) {
        self.status = status;
        if status.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
    }

    pub(crate) fn set_error(&mut self, error: String) {
        self.error = Some(error);
    }

    /// Takes a serializable snapshot of the saga and its steps.
    pub fn report(&self) -> SagaStatusReport {
        SagaStatusReport {
            saga_id: self.id,
            name: self.name.clone(),
            status: self.status,
            created_at: self.created_at,
            completed_at: self.completed_at,
            error: self.error.clone(),
            compensation_failures: self.compensation_failures(),
            steps: self.steps.iter().map(StepRecord::report).collect(),
        }
    }

    /// Summarizes the saga with per-status step counts.
    pub fn summary(&self) -> SagaSummary {
        SagaSummary {
            saga_id: self.id,
            name: self.name.clone(),
            status: self.status,
            created_at: self.created_at,
            steps_total: self.steps.len(),
            steps_completed: self
                .steps
                .iter()
                .filter(|s| s.status.forward_completed())
                .count(),
            steps_failed: self
                .steps
                .iter()
                .filter(|s| s.status == StepStatus::Failed)
                .count(),
        }
    }
}

/// Snapshot of one saga returned by status queries.
#[derive(Debug, Clone, Serialize)]
pub struct SagaStatusReport {
    pub saga_id: SagaId,
    pub name: String,
    pub status: SagaStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub compensation_failures: usize,
    pub steps: Vec<StepStatusReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepStatusReport {
    pub id: String,
    pub name: String,
    pub status: StepStatus,
    pub executed_at: Option<DateTime<Utc>>,
    pub compensated_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// One line of the saga listing.
#[derive(Debug, Clone, Serialize)]
pub struct SagaSummary {
    pub saga_id: SagaId,
    pub name: String,
    pub status: SagaStatus,
    pub created_at: DateTime<Utc>,
    pub steps_total: usize,
    /// Steps whose forward action succeeded, compensated or not.
    pub steps_completed: usize,
    pub steps_failed: usize,
}
