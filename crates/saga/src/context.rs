//! Results shared between the steps of one saga execution.

use std::collections::HashMap;

use records::RecordId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::StepError;

/// Result bag keyed by step ID.
///
/// The orchestrator stores each completed step's result here before the
/// next step runs, and hands the same bag to compensations. Steps read
/// earlier results through it instead of reaching back into the saga.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StepContext {
    results: HashMap<String, Value>,
}

impl StepContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the result of a completed step.
    pub fn insert(&mut self, step_id: impl Into<String>, result: Value) {
        self.results.insert(step_id.into(), result);
    }

    /// Returns the raw result of a step, if it completed.
    pub fn get(&self, step_id: &str) -> Option<&Value> {
        self.results.get(step_id)
    }

    /// Returns one field of a step's JSON object result.
    pub fn field(&self, step_id: &str, field: &str) -> Result<&Value, StepError> {
        self.get(step_id)
            .and_then(|v| v.get(field))
            .ok_or_else(|| StepError::MissingContext {
                step_id: step_id.to_string(),
                field: field.to_string(),
            })
    }

    /// Deserializes a step's whole result.
    pub fn get_as<T: DeserializeOwned>(&self, step_id: &str) -> Result<T, StepError> {
        let value = self.get(step_id).ok_or_else(|| StepError::MissingContext {
            step_id: step_id.to_string(),
            field: "*".to_string(),
        })?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Reads a record key written by an earlier step.
    pub fn record_id(&self, step_id: &str, field: &str) -> Result<RecordId, StepError> {
        self.field(step_id, field)?
            .as_i64()
            .map(RecordId::new)
            .ok_or_else(|| StepError::MissingContext {
                step_id: step_id.to_string(),
                field: field.to_string(),
            })
    }

    /// Reads a float written by an earlier step.
    pub fn f64(&self, step_id: &str, field: &str) -> Result<f64, StepError> {
        self.field(step_id, field)?
            .as_f64()
            .ok_or_else(|| StepError::MissingContext {
                step_id: step_id.to_string(),
                field: field.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_record_id_lookup() {
        let mut ctx = StepContext::new();
        ctx.insert("create_supplier", json!({ "supplier_id": 3 }));

        assert_eq!(
            ctx.record_id("create_supplier", "supplier_id").unwrap(),
            RecordId::new(3)
        );
        assert!(matches!(
            ctx.record_id("create_supplier", "contract_id"),
            Err(StepError::MissingContext { .. })
        ));
        assert!(ctx.record_id("create_contract", "contract_id").is_err());
    }

    #[test]
    fn test_wrong_type_is_missing() {
        let mut ctx = StepContext::new();
        ctx.insert("rate", json!({ "previous_rating": "high" }));
        assert!(ctx.f64("rate", "previous_rating").is_err());
    }

    #[test]
    fn test_get_as() {
        #[derive(Deserialize)]
        struct Created {
            visit_id: i64,
        }

        let mut ctx = StepContext::new();
        ctx.insert("create_visit", json!({ "visit_id": 9 }));
        let created: Created = ctx.get_as("create_visit").unwrap();
        assert_eq!(created.visit_id, 9);
        assert_eq!(ctx.len(), 1);
    }
}
