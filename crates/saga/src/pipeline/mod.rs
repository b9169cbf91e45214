//! Fixed pipelines: hard-coded store writes followed by one event sink
//! notification, rolled back by hand when any step fails.

pub mod invoice;
pub mod log;
pub mod penalty;
mod report;

pub use invoice::{InvoicePaymentReceipt, InvoicePaymentRequest, InvoicePaymentSaga};
pub use log::{LogEntry, LogStatus, SagaLog};
pub use penalty::{PenaltyReceipt, PenaltyRequest, PenaltySaga};
pub use report::SagaReport;

/// Sink status reported after a successful notification.
pub const SINK_SYNCED: &str = "synced";
