use std::sync::Arc;

use async_trait::async_trait;
use records::{ContractStatus, Money, NewContract, NewSupplier, RecordStore};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{SagaDefinition, SinkCleanup, SinkSyncStep};
use crate::context::StepContext;
use crate::error::StepError;
use crate::services::{EventKind, EventSink};
use crate::step::SagaStep;

pub const CREATE_SUPPLIER: &str = "create_supplier";
pub const CREATE_CONTRACT: &str = "create_contract";
pub const SYNC_SUPPLIER: &str = "sync_supplier";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierContractRequest {
    pub supplier_name: String,
    pub rating: f64,
    pub contract_title: String,
    pub contract_value: Money,
}

struct CreateSupplier<S> {
    store: Arc<S>,
    new: NewSupplier,
}

#[async_trait]
impl<S: RecordStore + 'static> SagaStep for CreateSupplier<S> {
    fn id(&self) -> &str {
        CREATE_SUPPLIER
    }

    fn name(&self) -> &str {
        "Create supplier"
    }

    async fn execute(&self, _ctx: &StepContext) -> Result<Value, StepError> {
        let supplier = self.store.insert_supplier(self.new.clone()).await?;
        Ok(json!({
            "supplier_id": supplier.id,
            "name": supplier.name,
            "rating": supplier.rating,
        }))
    }

    async fn compensate(&self, ctx: &StepContext) -> Result<Value, StepError> {
        let id = ctx.record_id(CREATE_SUPPLIER, "supplier_id")?;
        self.store.delete_supplier(id).await?;
        Ok(json!({ "deleted_supplier": id }))
    }
}

struct CreateContract<S> {
    store: Arc<S>,
    title: String,
    value: Money,
}

#[async_trait]
impl<S: RecordStore + 'static> SagaStep for CreateContract<S> {
    fn id(&self) -> &str {
        CREATE_CONTRACT
    }

    fn name(&self) -> &str {
        "Create contract"
    }

    async fn execute(&self, ctx: &StepContext) -> Result<Value, StepError> {
        let supplier_id = ctx.record_id(CREATE_SUPPLIER, "supplier_id")?;
        let contract = self
            .store
            .insert_contract(NewContract {
                supplier_id,
                title: self.title.clone(),
                value: self.value,
                status: ContractStatus::Active,
            })
            .await?;
        Ok(json!({
            "contract_id": contract.id,
            "supplier_id": supplier_id,
            "value": contract.value.as_f64(),
        }))
    }

    async fn compensate(&self, ctx: &StepContext) -> Result<Value, StepError> {
        let id = ctx.record_id(CREATE_CONTRACT, "contract_id")?;
        self.store.delete_contract(id).await?;
        Ok(json!({ "deleted_contract": id }))
    }
}

/// Creates a supplier, opens a contract with it, and publishes the new
/// supplier to the sink.
pub fn supplier_with_contract<S, E>(
    store: Arc<S>,
    sink: Arc<E>,
    request: SupplierContractRequest,
) -> SagaDefinition
where
    S: RecordStore + 'static,
    E: EventSink + 'static,
{
    let sync = SinkSyncStep::new(
        SYNC_SUPPLIER,
        "Sync supplier",
        EventKind::Supplier,
        "supplier_id",
        SinkCleanup::Notice,
        sink,
        |ctx| {
            let supplier = ctx.get(CREATE_SUPPLIER).cloned().unwrap_or(Value::Null);
            Ok(json!({
                "supplier_id": ctx.record_id(CREATE_SUPPLIER, "supplier_id")?,
                "name": supplier["name"],
                "rating": supplier["rating"],
                "contract_id": ctx.record_id(CREATE_CONTRACT, "contract_id")?,
                "contract_value": ctx.f64(CREATE_CONTRACT, "value")?,
            }))
        },
    );

    SagaDefinition {
        name: format!("supplier_with_contract:{}", request.supplier_name),
        steps: vec![
            Arc::new(CreateSupplier {
                store: Arc::clone(&store),
                new: NewSupplier {
                    name: request.supplier_name,
                    rating: request.rating,
                },
            }) as Arc<dyn SagaStep>,
            Arc::new(CreateContract {
                store,
                title: request.contract_title,
                value: request.contract_value,
            }) as Arc<dyn SagaStep>,
            Arc::new(sync) as Arc<dyn SagaStep>,
        ],
    }
}
