use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use records::{NewVisit, RecordId, RecordStore, RecordStoreExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{SagaDefinition, SinkCleanup, SinkSyncStep};
use crate::context::StepContext;
use crate::error::StepError;
use crate::services::{EventKind, EventSink};
use crate::step::SagaStep;

pub const VALIDATE_WINDOW: &str = "validate_window";
pub const CREATE_VISIT: &str = "create_visit";
pub const SYNC_VISIT: &str = "sync_visit";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRequest {
    pub supplier_id: RecordId,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub purpose: String,
}

/// Rejects an empty or inverted window and any overlap with the
/// supplier's existing visits. Writes nothing.
struct ValidateWindow<S> {
    store: Arc<S>,
    request: VisitRequest,
}

#[async_trait]
impl<S: RecordStore + 'static> SagaStep for ValidateWindow<S> {
    fn id(&self) -> &str {
        VALIDATE_WINDOW
    }

    fn name(&self) -> &str {
        "Validate visit window"
    }

    async fn execute(&self, _ctx: &StepContext) -> Result<Value, StepError> {
        let VisitRequest {
            supplier_id,
            starts_at,
            ends_at,
            ..
        } = self.request;

        if starts_at >= ends_at {
            return Err(StepError::Validation(format!(
                "Visit must end after it starts ({starts_at} >= {ends_at})"
            )));
        }
        if !self.store.supplier_exists(supplier_id).await? {
            return Err(StepError::Validation(format!(
                "Supplier {supplier_id} does not exist"
            )));
        }

        let existing = self.store.visits_for_supplier(supplier_id).await?;
        if let Some(clash) = existing.iter().find(|v| v.overlaps(starts_at, ends_at)) {
            return Err(StepError::Validation(format!(
                "Visit overlaps visit {} ({} to {})",
                clash.id, clash.starts_at, clash.ends_at
            )));
        }

        Ok(json!({
            "supplier_id": supplier_id,
            "existing_visits": existing.len(),
        }))
    }

    async fn compensate(&self, _ctx: &StepContext) -> Result<Value, StepError> {
        Ok(json!({ "noop": true }))
    }
}

struct CreateVisit<S> {
    store: Arc<S>,
    request: VisitRequest,
}

#[async_trait]
impl<S: RecordStore + 'static> SagaStep for CreateVisit<S> {
    fn id(&self) -> &str {
        CREATE_VISIT
    }

    fn name(&self) -> &str {
        "Create visit"
    }

    async fn execute(&self, _ctx: &StepContext) -> Result<Value, StepError> {
        let visit = self
            .store
            .insert_visit(NewVisit {
                supplier_id: self.request.supplier_id,
                starts_at: self.request.starts_at,
                ends_at: self.request.ends_at,
                purpose: self.request.purpose.clone(),
            })
            .await?;
        Ok(json!({
            "visit_id": visit.id,
            "supplier_id": visit.supplier_id,
            "starts_at": visit.starts_at,
            "ends_at": visit.ends_at,
        }))
    }

    async fn compensate(&self, ctx: &StepContext) -> Result<Value, StepError> {
        let id = ctx.record_id(CREATE_VISIT, "visit_id")?;
        self.store.delete_visit(id).await?;
        Ok(json!({ "deleted_visit": id }))
    }
}

/// Schedules a visit after checking the window against the supplier's
/// calendar, then publishes it. The sink cannot delete visits, so undoing
/// the publish only logs.
pub fn schedule_visit<S, E>(store: Arc<S>, sink: Arc<E>, request: VisitRequest) -> SagaDefinition
where
    S: RecordStore + 'static,
    E: EventSink + 'static,
{
    let purpose = request.purpose.clone();
    let sync = SinkSyncStep::new(
        SYNC_VISIT,
        "Sync visit",
        EventKind::Visit,
        "visit_id",
        SinkCleanup::LogOnly,
        sink,
        move |ctx| {
            let visit = ctx.get(CREATE_VISIT).cloned().unwrap_or(Value::Null);
            Ok(json!({
                "visit_id": ctx.record_id(CREATE_VISIT, "visit_id")?,
                "supplier_id": ctx.record_id(CREATE_VISIT, "supplier_id")?,
                "starts_at": visit["starts_at"],
                "ends_at": visit["ends_at"],
                "purpose": purpose,
            }))
        },
    );

    SagaDefinition {
        name: format!("schedule_visit:{}", request.supplier_id),
        steps: vec![
            Arc::new(ValidateWindow {
                store: Arc::clone(&store),
                request: request.clone(),
            }) as Arc<dyn SagaStep>,
            Arc::new(CreateVisit { store, request }) as Arc<dyn SagaStep>,
            Arc::new(sync) as Arc<dyn SagaStep>,
        ],
    }
}
