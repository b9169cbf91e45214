use std::sync::Arc;

use async_trait::async_trait;
use records::{NewComplaint, RecordId, RecordStore, Severity};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{SagaDefinition, SinkCleanup, SinkSyncStep};
use crate::context::StepContext;
use crate::error::StepError;
use crate::services::{EventKind, EventSink};
use crate::step::SagaStep;

pub const CREATE_COMPLAINT: &str = "create_complaint";
pub const APPLY_RATING_PENALTY: &str = "apply_rating_penalty";
pub const SYNC_COMPLAINT: &str = "sync_complaint";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplaintRequest {
    pub supplier_id: RecordId,
    pub description: String,
    pub severity: Severity,
}

struct CreateComplaint<S> {
    store: Arc<S>,
    new: NewComplaint,
}

#[async_trait]
impl<S: RecordStore + 'static> SagaStep for CreateComplaint<S> {
    fn id(&self) -> &str {
        CREATE_COMPLAINT
    }

    fn name(&self) -> &str {
        "Create complaint"
    }

    async fn execute(&self, _ctx: &StepContext) -> Result<Value, StepError> {
        let complaint = self.store.insert_complaint(self.new.clone()).await?;
        Ok(json!({
            "complaint_id": complaint.id,
            "supplier_id": complaint.supplier_id,
            "severity": complaint.severity.as_str(),
        }))
    }

    async fn compensate(&self, ctx: &StepContext) -> Result<Value, StepError> {
        let id = ctx.record_id(CREATE_COMPLAINT, "complaint_id")?;
        self.store.delete_complaint(id).await?;
        Ok(json!({ "deleted_complaint": id }))
    }
}

/// Lowers the supplier's rating by the complaint's severity, never below 0.
struct ApplyRatingPenalty<S> {
    store: Arc<S>,
    supplier_id: RecordId,
    severity: Severity,
}

#[async_trait]
impl<S: RecordStore + 'static> SagaStep for ApplyRatingPenalty<S> {
    fn id(&self) -> &str {
        APPLY_RATING_PENALTY
    }

    fn name(&self) -> &str {
        "Apply rating penalty"
    }

    async fn execute(&self, _ctx: &StepContext) -> Result<Value, StepError> {
        let supplier = self.store.get_supplier(self.supplier_id).await?;
        let new_rating = (supplier.rating - self.severity.rating_penalty()).max(0.0);
        let previous = self
            .store
            .set_supplier_rating(self.supplier_id, new_rating)
            .await?;
        Ok(json!({
            "supplier_id": self.supplier_id,
            "previous_rating": previous,
            "new_rating": new_rating,
        }))
    }

    async fn compensate(&self, ctx: &StepContext) -> Result<Value, StepError> {
        let previous = ctx.f64(APPLY_RATING_PENALTY, "previous_rating")?;
        self.store
            .set_supplier_rating(self.supplier_id, previous)
            .await?;
        Ok(json!({ "restored_rating": previous }))
    }
}

/// Records a complaint against a supplier, lowers the supplier's rating,
/// and publishes the complaint to the sink.
pub fn complaint_with_rating_penalty<S, E>(
    store: Arc<S>,
    sink: Arc<E>,
    request: ComplaintRequest,
) -> SagaDefinition
where
    S: RecordStore + 'static,
    E: EventSink + 'static,
{
    let description = request.description.clone();
    let sync = SinkSyncStep::new(
        SYNC_COMPLAINT,
        "Sync complaint",
        EventKind::Complaint,
        "complaint_id",
        SinkCleanup::Notice,
        sink,
        move |ctx| {
            Ok(json!({
                "complaint_id": ctx.record_id(CREATE_COMPLAINT, "complaint_id")?,
                "supplier_id": ctx.record_id(CREATE_COMPLAINT, "supplier_id")?,
                "severity": ctx.field(CREATE_COMPLAINT, "severity")?,
                "description": description,
                "new_rating": ctx.f64(APPLY_RATING_PENALTY, "new_rating")?,
            }))
        },
    );

    SagaDefinition {
        name: format!("complaint_with_rating_penalty:{}", request.supplier_id),
        steps: vec![
            Arc::new(CreateComplaint {
                store: Arc::clone(&store),
                new: NewComplaint {
                    supplier_id: request.supplier_id,
                    description: request.description,
                    severity: request.severity,
                },
            }) as Arc<dyn SagaStep>,
            Arc::new(ApplyRatingPenalty {
                store,
                supplier_id: request.supplier_id,
                severity: request.severity,
            }) as Arc<dyn SagaStep>,
            Arc::new(sync) as Arc<dyn SagaStep>,
        ],
    }
}
