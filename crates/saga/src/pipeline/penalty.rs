//! Penalty pipeline: create the penalty, then notify the sink. The penalty
//! is deleted if the notification fails.

use records::{Money, NewPenalty, Penalty, RecordId, RecordStore, RecordStoreExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::log::{
    ROLLBACK_COMPLETE, ROLLBACK_START, ROLLBACK_STEP, SAGA_START, SAGA_SUCCESS, SagaLog,
    step_failed, step_start, step_success,
};
use super::{SINK_SYNCED, SagaReport};
use crate::error::StepError;
use crate::services::{EventKind, EventSink};

const SAGA_NAME: &str = "penalty";

/// Prefix marking the reason of a cancellation event.
pub const ROLLBACK_REASON_PREFIX: &str = "ROLLBACK:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyRequest {
    pub contract_id: RecordId,
    pub reason: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyReceipt {
    pub penalty_id: RecordId,
    pub sink_status: String,
}

#[derive(Debug, Default)]
struct Progress {
    penalty: Option<Penalty>,
    sink_notified: bool,
}

/// Creates a contractual penalty and notifies the sink.
pub struct PenaltySaga<S, E> {
    store: S,
    sink: E,
}

impl<S, E> PenaltySaga<S, E>
where
    S: RecordStore,
    E: EventSink,
{
    pub fn new(store: S, sink: E) -> Self {
        Self { store, sink }
    }

    #[tracing::instrument(
        skip(self, request),
        fields(saga = SAGA_NAME, contract_id = %request.contract_id)
    )]
    pub async fn create_penalty_with_sync(&self, request: PenaltyRequest) -> SagaReport<PenaltyReceipt> {
        metrics::counter!("pipeline_runs_total", "saga" => SAGA_NAME).increment(1);
        let started = std::time::Instant::now();
        let mut log = SagaLog::new();
        let mut progress = Progress::default();

        log.info(
            SAGA_START,
            format!("Starting penalty saga for contract {}", request.contract_id),
        );

        log.info(step_start(1), "Creating penalty");
        let penalty_id = match self.create_penalty(&request).await {
            Ok(penalty) => {
                log.success(
                    step_success(1),
                    format!("Penalty {} created for {}", penalty.id, penalty.amount),
                );
                let id = penalty.id;
                progress.penalty = Some(penalty);
                id
            }
            Err(e) => {
                log.error(step_failed(1), e.to_string());
                metrics::counter!("pipeline_failures_total", "saga" => SAGA_NAME).increment(1);
                return SagaReport::failed("Penalty saga failed", e.to_string(), log);
            }
        };

        log.info(step_start(2), "Notifying event sink");
        let payload = json!({
            "contract_id": request.contract_id.as_i64(),
            "amount": request.amount.as_f64(),
            "reason": request.reason,
            "status": "created",
        });
        let result = self.sink.publish(EventKind::Penalty, &payload).await;

        metrics::histogram!("pipeline_duration_seconds", "saga" => SAGA_NAME)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                progress.sink_notified = true;
                log.success(step_success(2), "Penalty event accepted by sink");
                log.success(SAGA_SUCCESS, format!("Penalty {penalty_id} created and synced"));
                SagaReport::succeeded(
                    "Penalty created and synced",
                    PenaltyReceipt {
                        penalty_id,
                        sink_status: SINK_SYNCED.to_string(),
                    },
                    log,
                )
            }
            Err(e) => {
                log.error(step_failed(2), e.to_string());
                metrics::counter!("pipeline_failures_total", "saga" => SAGA_NAME).increment(1);
                self.rollback(&request, &progress, &mut log).await;
                SagaReport::failed("Penalty saga failed, changes rolled back", e.to_string(), log)
            }
        }
    }

    async fn create_penalty(&self, request: &PenaltyRequest) -> Result<Penalty, StepError> {
        if !request.amount.is_positive() {
            return Err(StepError::Validation(format!(
                "Amount must be positive, got {}",
                request.amount
            )));
        }
        if !self.store.contract_exists(request.contract_id).await? {
            return Err(StepError::Validation(format!(
                "Contract {} does not exist",
                request.contract_id
            )));
        }

        Ok(self
            .store
            .insert_penalty(NewPenalty {
                contract_id: request.contract_id,
                reason: request.reason.clone(),
                amount: request.amount,
            })
            .await?)
    }

    async fn rollback(&self, request: &PenaltyRequest, progress: &Progress, log: &mut SagaLog) {
        metrics::counter!("pipeline_rollbacks_total", "saga" => SAGA_NAME).increment(1);
        log.info(ROLLBACK_START, "Rolling back penalty saga");

        if let Some(penalty) = &progress.penalty {
            match self.store.delete_penalty(penalty.id).await {
                Ok(()) => log.success(ROLLBACK_STEP, format!("Penalty {} deleted", penalty.id)),
                Err(e) => log.error(
                    ROLLBACK_STEP,
                    format!("Failed to delete penalty {}: {e}", penalty.id),
                ),
            }
        }

        if progress.sink_notified {
            match self
                .sink
                .publish_cancellation(EventKind::Penalty, &cancellation_payload(request))
                .await
            {
                Ok(()) => log.success(ROLLBACK_STEP, "Cancellation event accepted by sink"),
                Err(e) => log.error(
                    ROLLBACK_STEP,
                    format!("Failed to send cancellation event: {e}"),
                ),
            }
        }

        log.info(ROLLBACK_COMPLETE, "Rollback finished");
    }
}

fn cancellation_payload(request: &PenaltyRequest) -> Value {
    json!({
        "contract_id": request.contract_id.as_i64(),
        "amount": request.amount.as_f64(),
        "reason": format!("{ROLLBACK_REASON_PREFIX} {}", request.reason),
        "status": "cancelled",
    })
}
