//! Generic step-based saga engine.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::SagaId;
use serde::Serialize;
use serde_json::Value;

use crate::context::StepContext;
use crate::error::{Result, SagaError};
use crate::recipes::SagaDefinition;
use crate::repository::SagaRepository;
use crate::saga::{Saga, SagaStatusReport, SagaSummary};
use crate::state::SagaStatus;
use crate::step::SagaStep;

/// Default time a terminal saga is kept before [`SagaOrchestrator::evict_expired`]
/// removes it.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Outcome of one compensating action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompensationOutcome {
    pub step_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What compensation did, one entry per compensated step in the order the
/// compensations ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompensationSummary {
    pub compensated_steps: usize,
    pub results: Vec<CompensationOutcome>,
}

impl CompensationSummary {
    /// Compensations that failed.
    pub fn failed_steps(&self) -> impl Iterator<Item = &CompensationOutcome> {
        self.results.iter().filter(|r| !r.success)
    }

    /// Returns true if every compensation succeeded.
    pub fn is_complete(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }
}

/// Result of [`SagaOrchestrator::execute_saga`].
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub saga_id: SagaId,
    pub status: SagaStatus,
    /// Each step's result in step order. Empty on failure.
    pub results: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compensation: Option<CompensationSummary>,
}

/// Registers sagas and drives them through execution and compensation.
///
/// Steps run one at a time in list order. When a step fails, every step
/// that completed is compensated in reverse list order; steps that never
/// ran are left `Pending`. Status changes are written to the repository
/// as they happen, so [`get_saga_status`](Self::get_saga_status) can
/// observe a saga mid-flight.
pub struct SagaOrchestrator<R: SagaRepository> {
    repository: R,
    retention: Duration,
}

impl<R: SagaRepository> SagaOrchestrator<R> {
    /// Creates an orchestrator with the default retention.
    pub fn new(repository: R) -> Self {
        Self {
            repository,
            retention: DEFAULT_RETENTION,
        }
    }

    /// Sets how long terminal sagas are kept.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Registers a new saga in the `Started` state and returns its ID.
    ///
    /// Nothing is executed. Expired terminal sagas are evicted first.
    #[tracing::instrument(skip(self, steps), fields(step_count = steps.len()))]
    pub async fn create_saga(
        &self,
        name: &str,
        steps: Vec<Arc<dyn SagaStep>>,
    ) -> Result<SagaId> {
        self.evict_expired().await?;

        let saga = Saga::new(name, steps)?;
        let saga_id = saga.id();
        self.repository.insert(saga).await?;

        metrics::counter!("sagas_created_total").increment(1);
        tracing::info!(%saga_id, "saga registered");
        Ok(saga_id)
    }

    /// Registers a saga assembled by one of the [`recipes`](crate::recipes).
    pub async fn create_from(&self, definition: SagaDefinition) -> Result<SagaId> {
        self.create_saga(&definition.name, definition.steps).await
    }

    /// Executes a registered saga.
    ///
    /// Step failures do not produce `Err`: they are compensated and
    /// reported in the returned [`ExecutionResult`]. `Err` is reserved for
    /// unknown IDs, sagas that were already executed, and repository
    /// failures.
    #[tracing::instrument(skip(self))]
    pub async fn execute_saga(&self, saga_id: SagaId) -> Result<ExecutionResult> {
        let saga_start = std::time::Instant::now();

        let (name, steps) = self
            .repository
            .update(saga_id, |saga| {
                if !saga.status().can_execute() {
                    return Err(SagaError::InvalidState {
                        expected: "started",
                        actual: saga.status(),
                    });
                }
                saga.set_status(SagaStatus::InProgress);
                let steps: Vec<_> = saga.steps().iter().map(|s| s.step()).collect();
                Ok((saga.name().to_string(), steps))
            })
            .await??;

        metrics::counter!("saga_executions_total", "saga" => name.clone()).increment(1);

        // Completed step indices are tracked here as well as in the
        // repository, so compensation still runs if the saga record can
        // no longer be updated.
        let mut ctx = StepContext::new();
        let mut completed = Vec::new();
        let mut failure = None;

        for (index, step) in steps.iter().enumerate() {
            tracing::info!(step = step.id(), "saga step started");
            if let Err(e) = self
                .record(saga_id, |saga| saga.step_mut(index).map(|s| s.mark_executing()))
                .await
            {
                failure = Some(format!("Step '{}' was not started: {e}", step.id()));
                break;
            }

            match step.execute(&ctx).await {
                Ok(result) => {
                    ctx.insert(step.id(), result.clone());
                    completed.push(index);
                    if let Err(e) = self
                        .record(saga_id, |saga| saga.record_result(index, result))
                        .await
                    {
                        failure = Some(format!(
                            "Step '{}' completed but could not be recorded: {e}",
                            step.id()
                        ));
                        break;
                    }
                    tracing::info!(step = step.id(), "saga step completed");
                }
                Err(e) => {
                    let message = e.to_string();
                    tracing::warn!(step = step.id(), error = %message, "saga step failed");
                    let _ = self
                        .record(saga_id, |saga| {
                            saga.step_mut(index).map(|s| s.mark_failed(message.clone()))
                        })
                        .await;
                    failure = Some(format!("Step '{}' failed: {}", step.id(), message));
                    break;
                }
            }
        }

        let result = match failure {
            None => {
                let _ = self
                    .record(saga_id, |saga| {
                        saga.set_status(SagaStatus::Completed);
                        Ok(())
                    })
                    .await;

                let duration = saga_start.elapsed().as_secs_f64();
                metrics::counter!("saga_completed", "saga" => name.clone()).increment(1);
                tracing::info!(%saga_id, duration, "saga completed successfully");

                ExecutionResult {
                    success: true,
                    saga_id,
                    status: SagaStatus::Completed,
                    results: steps
                        .iter()
                        .filter_map(|s| ctx.get(s.id()).cloned())
                        .collect(),
                    error: None,
                    compensation: None,
                }
            }
            Some(error) => {
                let _ = self
                    .record(saga_id, |saga| {
                        saga.set_status(SagaStatus::Failed);
                        saga.set_error(error.clone());
                        Ok(())
                    })
                    .await;
                metrics::counter!("saga_failed", "saga" => name.clone()).increment(1);

                let summary = self.compensate(saga_id, &steps, &completed, &ctx).await;

                ExecutionResult {
                    success: false,
                    saga_id,
                    status: SagaStatus::Compensated,
                    results: Vec::new(),
                    error: Some(error),
                    compensation: Some(summary),
                }
            }
        };

        metrics::histogram!("saga_duration_seconds").record(saga_start.elapsed().as_secs_f64());
        Ok(result)
    }

    /// Applies a bookkeeping update to the stored saga. Failures are logged
    /// and returned; the caller decides whether execution can go on.
    async fn record<F>(&self, saga_id: SagaId, f: F) -> Result<()>
    where
        F: FnOnce(&mut Saga) -> Result<()> + Send,
    {
        let outcome = self.repository.update(saga_id, f).await.and_then(|inner| inner);
        if let Err(e) = &outcome {
            tracing::error!(%saga_id, error = %e, "saga bookkeeping update failed");
        }
        outcome
    }

    /// Runs compensating actions for the `completed` steps in reverse order.
    ///
    /// A failing compensation is recorded and the remaining ones still run.
    /// Bookkeeping failures never stop a compensation from running.
    #[tracing::instrument(skip(self, steps, completed, ctx))]
    async fn compensate(
        &self,
        saga_id: SagaId,
        steps: &[Arc<dyn SagaStep>],
        completed: &[usize],
        ctx: &StepContext,
    ) -> CompensationSummary {
        let _ = self
            .record(saga_id, |saga| {
                if !saga.status().can_compensate() {
                    return Err(SagaError::InvalidState {
                        expected: "failed",
                        actual: saga.status(),
                    });
                }
                saga.set_status(SagaStatus::Compensating);
                Ok(())
            })
            .await;

        let mut summary = CompensationSummary::default();

        for &index in completed.iter().rev() {
            let Some(step) = steps.get(index) else {
                continue;
            };
            let _ = self
                .record(saga_id, |saga| saga.step_mut(index).map(|s| s.mark_compensating()))
                .await;

            metrics::counter!("saga_compensations_total").increment(1);
            let outcome = match step.compensate(ctx).await {
                Ok(result) => {
                    let _ = self
                        .record(saga_id, |saga| {
                            saga.step_mut(index).map(|s| s.mark_compensated())
                        })
                        .await;
                    tracing::info!(step = step.id(), "compensation step completed");
                    CompensationOutcome {
                        step_id: step.id().to_string(),
                        success: true,
                        result: Some(result),
                        error: None,
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    let _ = self
                        .record(saga_id, |saga| {
                            saga.step_mut(index)
                                .map(|s| s.mark_compensation_failed(message.clone()))
                        })
                        .await;
                    metrics::counter!("saga_compensation_failures_total").increment(1);
                    tracing::error!(step = step.id(), error = %message, "compensation step failed");
                    CompensationOutcome {
                        step_id: step.id().to_string(),
                        success: false,
                        result: None,
                        error: Some(message),
                    }
                }
            };
            summary.results.push(outcome);
        }

        summary.compensated_steps = summary.results.len();

        let _ = self
            .record(saga_id, |saga| {
                saga.set_status(SagaStatus::Compensated);
                Ok(())
            })
            .await;

        if summary.is_complete() {
            tracing::warn!(%saga_id, steps = summary.compensated_steps, "saga compensated");
        } else {
            tracing::warn!(
                %saga_id,
                failed = summary.failed_steps().count(),
                "saga compensated with failures, manual cleanup required"
            );
        }

        summary
    }

    /// Returns a snapshot of the saga, or `None` if the ID is unknown.
    pub async fn get_saga_status(&self, saga_id: SagaId) -> Result<Option<SagaStatusReport>> {
        Ok(self.repository.get(saga_id).await?.map(|s| s.report()))
    }

    /// Lists every registered saga with step counts.
    pub async fn list_sagas(&self) -> Result<Vec<SagaSummary>> {
        Ok(self
            .repository
            .list()
            .await?
            .iter()
            .map(Saga::summary)
            .collect())
    }

    /// Removes a finished saga.
    ///
    /// Fails with [`SagaError::InvalidState`] while the saga has not reached
    /// a terminal state, so a running saga always finishes its compensation.
    pub async fn remove_saga(&self, saga_id: SagaId) -> Result<bool> {
        Ok(self.repository.remove_terminal(saga_id).await?.is_some())
    }

    /// Removes terminal sagas older than the retention period.
    pub async fn evict_expired(&self) -> Result<usize> {
        let Some(cutoff) = chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
        else {
            return Ok(0);
        };
        let evicted = self.repository.evict_terminal_before(cutoff).await?;
        if evicted > 0 {
            tracing::debug!(evicted, "expired sagas evicted");
        }
        Ok(evicted)
    }
}
