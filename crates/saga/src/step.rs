//! The unit of saga work.

use std::future::Future;

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::context::StepContext;
use crate::error::StepError;

/// A forward action paired with the action that undoes it.
///
/// The orchestrator only calls [`SagaStep::compensate`] after
/// [`SagaStep::execute`] returned `Ok` for the same saga execution.
#[async_trait]
pub trait SagaStep: Send + Sync {
    /// Identifier, unique within one saga.
    fn id(&self) -> &str;

    /// Human-readable name for logs and status reports.
    fn name(&self) -> &str;

    /// Runs the forward action. `ctx` holds the results of every step
    /// that completed before this one.
    async fn execute(&self, ctx: &StepContext) -> Result<Value, StepError>;

    /// Undoes the forward action. `ctx` holds the results of every step
    /// that completed, including this one.
    async fn compensate(&self, ctx: &StepContext) -> Result<Value, StepError>;
}

type ActionFn = Box<dyn Fn(StepContext) -> BoxFuture<'static, Result<Value, StepError>> + Send + Sync>;

/// A step built from two async closures.
pub struct FnStep {
    id: String,
    name: String,
    execute: ActionFn,
    compensate: ActionFn,
}

impl FnStep {
    /// Creates a step from a forward and a compensating closure.
    pub fn new<E, EFut, C, CFut>(
        id: impl Into<String>,
        name: impl Into<String>,
        execute: E,
        compensate: C,
    ) -> Self
    where
        E: Fn(StepContext) -> EFut + Send + Sync + 'static,
        EFut: Future<Output = Result<Value, StepError>> + Send + 'static,
        C: Fn(StepContext) -> CFut + Send + Sync + 'static,
        CFut: Future<Output = Result<Value, StepError>> + Send + 'static,
    {
        Self {
            id: id.into(),
            name: name.into(),
            execute: Box::new(move |ctx| execute(ctx).boxed()),
            compensate: Box::new(move |ctx| compensate(ctx).boxed()),
        }
    }

    /// Creates a step whose compensation does nothing, for read-only
    /// checks that write nothing.
    pub fn without_compensation<E, EFut>(
        id: impl Into<String>,
        name: impl Into<String>,
        execute: E,
    ) -> Self
    where
        E: Fn(StepContext) -> EFut + Send + Sync + 'static,
        EFut: Future<Output = Result<Value, StepError>> + Send + 'static,
    {
        Self::new(id, name, execute, |_| async {
            Ok::<_, StepError>(serde_json::json!({ "noop": true }))
        })
    }
}

impl std::fmt::Debug for FnStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SagaStep for FnStep {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StepContext) -> Result<Value, StepError> {
        (self.execute)(ctx.clone()).await
    }

    async fn compensate(&self, ctx: &StepContext) -> Result<Value, StepError> {
        (self.compensate)(ctx.clone()).await
    }
}
