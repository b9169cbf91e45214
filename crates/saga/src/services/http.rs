//! HTTP client for the remote event sink.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use super::event_sink::{EventKind, EventSink, SinkError};

/// Default base URL of the event sink service.
pub const DEFAULT_SINK_BASE_URL: &str = "http://localhost:8001";

/// Connection settings for [`HttpEventSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSinkConfig {
    pub base_url: String,
    /// Timeout for forward events.
    pub timeout: Duration,
    /// Timeout for rollback cancellations.
    pub rollback_timeout: Duration,
}

impl Default for EventSinkConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SINK_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
            rollback_timeout: Duration::from_secs(5),
        }
    }
}

impl EventSinkConfig {
    /// Returns the endpoint for an event kind.
    pub fn endpoint(&self, kind: EventKind) -> String {
        format!(
            "{}/api/events/{}",
            self.base_url.trim_end_matches('/'),
            kind.as_str()
        )
    }
}

/// Event sink that POSTs JSON to `{base_url}/api/events/{kind}`.
#[derive(Debug, Clone)]
pub struct HttpEventSink {
    client: reqwest::Client,
    config: EventSinkConfig,
}

impl HttpEventSink {
    /// Creates a new HTTP event sink.
    pub fn new(config: EventSinkConfig) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &EventSinkConfig {
        &self.config
    }

    #[tracing::instrument(skip(self, payload), fields(url = tracing::field::Empty))]
    async fn post(&self, kind: EventKind, payload: &Value, timeout: Duration) -> Result<(), SinkError> {
        let url = self.config.endpoint(kind);
        tracing::Span::current().record("url", url.as_str());

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                metrics::counter!("sink_requests_total", "kind" => kind.as_str(), "outcome" => "error")
                    .increment(1);
                if e.is_timeout() {
                    SinkError::Timeout(timeout)
                } else {
                    SinkError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::CREATED {
            metrics::counter!("sink_requests_total", "kind" => kind.as_str(), "outcome" => "accepted")
                .increment(1);
            return Ok(());
        }

        metrics::counter!("sink_requests_total", "kind" => kind.as_str(), "outcome" => "rejected")
            .increment(1);
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), %body, "event sink rejected event");
        Err(SinkError::UnexpectedStatus {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn publish(&self, kind: EventKind, payload: &Value) -> Result<(), SinkError> {
        self.post(kind, payload, self.config.timeout).await
    }

    async fn publish_cancellation(
        &self,
        kind: EventKind,
        payload: &Value,
    ) -> Result<(), SinkError> {
        self.post(kind, payload, self.config.rollback_timeout).await
    }
}
