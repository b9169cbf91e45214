//! Event sink trait and in-memory implementation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors reported by the remote event sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink answered with something other than 201 Created.
    #[error("Event sink returned HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The request did not complete within the timeout.
    #[error("Event sink request timed out after {0:?}")]
    Timeout(Duration),

    /// The request could not be delivered.
    #[error("Event sink unreachable: {0}")]
    Transport(String),
}

/// Event categories accepted by the sink, one endpoint each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Transaction,
    Penalty,
    Supplier,
    Complaint,
    Visit,
}

impl EventKind {
    /// Path segment under `/api/events/`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Transaction => "transaction",
            EventKind::Penalty => "penalty",
            EventKind::Supplier => "supplier",
            EventKind::Complaint => "complaint",
            EventKind::Visit => "visit",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trait for delivering domain events to the remote sink.
///
/// Only an accepted (HTTP 201) delivery is `Ok`. There is no retry.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers a forward event with the primary timeout.
    async fn publish(&self, kind: EventKind, payload: &Value) -> Result<(), SinkError>;

    /// Delivers a cancellation event during rollback, with the shorter
    /// rollback timeout.
    async fn publish_cancellation(&self, kind: EventKind, payload: &Value)
    -> Result<(), SinkError>;
}

#[async_trait]
impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    async fn publish(&self, kind: EventKind, payload: &Value) -> Result<(), SinkError> {
        (**self).publish(kind, payload).await
    }

    async fn publish_cancellation(
        &self,
        kind: EventKind,
        payload: &Value,
    ) -> Result<(), SinkError> {
        (**self).publish_cancellation(kind, payload).await
    }
}

/// An event accepted by [`InMemoryEventSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub kind: EventKind,
    pub payload: Value,
    pub cancellation: bool,
}

#[derive(Debug, Default)]
struct InMemorySinkState {
    events: Vec<RecordedEvent>,
    attempts: usize,
    fail_on_publish: bool,
    fail_kinds: HashSet<EventKind>,
    fail_on_cancellation: bool,
}

/// In-memory event sink for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventSink {
    state: Arc<Mutex<InMemorySinkState>>,
}

impl InMemoryEventSink {
    /// Creates a new in-memory event sink.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, InMemorySinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures every forward publish to be rejected with HTTP 500.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.lock().fail_on_publish = fail;
    }

    /// Configures forward publishes of one kind to be rejected.
    pub fn fail_kind(&self, kind: EventKind) {
        self.lock().fail_kinds.insert(kind);
    }

    /// Configures every cancellation to be rejected with HTTP 500.
    pub fn set_fail_on_cancellation(&self, fail: bool) {
        self.lock().fail_on_cancellation = fail;
    }

    /// Returns every accepted event in delivery order.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.lock().events.clone()
    }

    /// Returns the number of accepted forward events.
    pub fn published_count(&self) -> usize {
        self.lock().events.iter().filter(|e| !e.cancellation).count()
    }

    /// Returns the number of accepted cancellation events.
    pub fn cancellation_count(&self) -> usize {
        self.lock().events.iter().filter(|e| e.cancellation).count()
    }

    /// Returns the number of delivery attempts, accepted or not.
    pub fn attempt_count(&self) -> usize {
        self.lock().attempts
    }
}

fn rejected() -> SinkError {
    SinkError::UnexpectedStatus {
        status: 500,
        body: "Internal Server Error".to_string(),
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn publish(&self, kind: EventKind, payload: &Value) -> Result<(), SinkError> {
        let mut state = self.lock();
        state.attempts += 1;

        if state.fail_on_publish || state.fail_kinds.contains(&kind) {
            return Err(rejected());
        }

        state.events.push(RecordedEvent {
            kind,
            payload: payload.clone(),
            cancellation: false,
        });
        Ok(())
    }

    async fn publish_cancellation(
        &self,
        kind: EventKind,
        payload: &Value,
    ) -> Result<(), SinkError> {
        let mut state = self.lock();
        state.attempts += 1;

        if state.fail_on_cancellation {
            return Err(rejected());
        }

        state.events.push(RecordedEvent {
            kind,
            payload: payload.clone(),
            cancellation: true,
        });
        Ok(())
    }
}
