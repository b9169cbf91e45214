//! Shared identifiers and value objects.

pub mod money;
pub mod types;

pub use money::{Money, MoneyParseError};
pub use types::{RecordId, SagaId};
