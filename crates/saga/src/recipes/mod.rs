//! Domain sagas assembled from [`SagaStep`]s for the generic engine.
//!
//! Each recipe creates local records, compensated by deleting them, and
//! ends with a step that publishes the outcome to the event sink.

mod complaint;
mod supplier;
mod visit;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

pub use complaint::{
    APPLY_RATING_PENALTY, CREATE_COMPLAINT, ComplaintRequest, SYNC_COMPLAINT,
    complaint_with_rating_penalty,
};
pub use supplier::{
    CREATE_CONTRACT, CREATE_SUPPLIER, SYNC_SUPPLIER, SupplierContractRequest,
    supplier_with_contract,
};
pub use visit::{CREATE_VISIT, SYNC_VISIT, VALIDATE_WINDOW, VisitRequest, schedule_visit};

use crate::context::StepContext;
use crate::error::StepError;
use crate::services::{EventKind, EventSink};
use crate::step::SagaStep;

/// A named step list ready for [`SagaOrchestrator::create_saga`].
///
/// [`SagaOrchestrator::create_saga`]: crate::SagaOrchestrator::create_saga
pub struct SagaDefinition {
    pub name: String,
    pub steps: Vec<Arc<dyn SagaStep>>,
}

impl SagaDefinition {
    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id()).collect()
    }
}

/// How a [`SinkSyncStep`] undoes a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkCleanup {
    /// Publish a cancellation notice with `status: "cancelled"`.
    Notice,
    /// The sink has no delete for this kind; only log what would be
    /// removed.
    LogOnly,
}

type PayloadFn = Box<dyn Fn(&StepContext) -> Result<Value, StepError> + Send + Sync>;

/// Publishes an event built from earlier step results.
pub struct SinkSyncStep<E> {
    id: &'static str,
    name: &'static str,
    kind: EventKind,
    /// Payload field naming the record the event is about.
    key_field: &'static str,
    cleanup: SinkCleanup,
    sink: Arc<E>,
    payload: PayloadFn,
}

impl<E: EventSink> SinkSyncStep<E> {
    pub fn new<F>(
        id: &'static str,
        name: &'static str,
        kind: EventKind,
        key_field: &'static str,
        cleanup: SinkCleanup,
        sink: Arc<E>,
        payload: F,
    ) -> Self
    where
        F: Fn(&StepContext) -> Result<Value, StepError> + Send + Sync + 'static,
    {
        Self {
            id,
            name,
            kind,
            key_field,
            cleanup,
            sink,
            payload: Box::new(payload),
        }
    }
}

#[async_trait]
impl<E: EventSink + 'static> SagaStep for SinkSyncStep<E> {
    fn id(&self) -> &str {
        self.id
    }

    fn name(&self) -> &str {
        self.name
    }

    async fn execute(&self, ctx: &StepContext) -> Result<Value, StepError> {
        let payload = (self.payload)(ctx)?;
        self.sink.publish(self.kind, &payload).await?;
        Ok(json!({ "kind": self.kind, "synced": true, "payload": payload }))
    }

    async fn compensate(&self, ctx: &StepContext) -> Result<Value, StepError> {
        let mut payload = (self.payload)(ctx)?;
        let key = payload.get(self.key_field).cloned().unwrap_or(Value::Null);

        match self.cleanup {
            SinkCleanup::LogOnly => {
                tracing::info!(
                    kind = %self.kind,
                    %key,
                    "would delete {} {} from microservice",
                    self.kind,
                    key
                );
                Ok(json!({ "noop": true, (self.key_field): key }))
            }
            SinkCleanup::Notice => {
                if let Some(fields) = payload.as_object_mut() {
                    fields.insert("status".to_string(), json!("cancelled"));
                }
                self.sink.publish_cancellation(self.kind, &payload).await?;
                Ok(json!({ "cancelled": true, (self.key_field): key }))
            }
        }
    }
}
