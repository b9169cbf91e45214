//! Harness configuration loaded from environment variables.

use std::time::Duration;

use saga::EventSinkConfig;
use saga::services::http::DEFAULT_SINK_BASE_URL;

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Harness configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `SINK_BASE_URL`: event sink base URL (default: `"http://localhost:8001"`)
/// - `SINK_TIMEOUT_SECS`: forward event timeout (default: `10`)
/// - `SINK_ROLLBACK_TIMEOUT_SECS`: cancellation timeout (default: `5`)
/// - `SAGA_RETENTION_SECS`: how long finished engine sagas are kept (default: `3600`)
/// - `DATABASE_URL`: PostgreSQL record store; in-memory when unset
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for JSON logs, anything else for text
#[derive(Debug, Clone)]
pub struct Config {
    pub sink_base_url: String,
    pub sink_timeout: Duration,
    pub sink_rollback_timeout: Duration,
    pub saga_retention: Duration,
    pub database_url: Option<String>,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            sink_base_url: lookup("SINK_BASE_URL").unwrap_or(defaults.sink_base_url),
            sink_timeout: secs("SINK_TIMEOUT_SECS", defaults.sink_timeout),
            sink_rollback_timeout: secs(
                "SINK_ROLLBACK_TIMEOUT_SECS",
                defaults.sink_rollback_timeout,
            ),
            saga_retention: secs("SAGA_RETENTION_SECS", defaults.saga_retention),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
        }
    }

    /// Returns the event sink client configuration.
    pub fn sink_config(&self) -> EventSinkConfig {
        EventSinkConfig {
            base_url: self.sink_base_url.clone(),
            timeout: self.sink_timeout,
            rollback_timeout: self.sink_rollback_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let sink = EventSinkConfig::default();
        Self {
            sink_base_url: DEFAULT_SINK_BASE_URL.to_string(),
            sink_timeout: sink.timeout,
            sink_rollback_timeout: sink.rollback_timeout,
            saga_retention: saga::orchestrator::DEFAULT_RETENTION,
            database_url: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}
