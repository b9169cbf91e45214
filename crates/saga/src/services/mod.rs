//! Remote event sink client and in-memory double.

pub mod event_sink;
pub mod http;

pub use event_sink::{EventKind, EventSink, InMemoryEventSink, RecordedEvent, SinkError};
pub use http::{EventSinkConfig, HttpEventSink};
