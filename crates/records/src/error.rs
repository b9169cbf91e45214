use thiserror::Error;

use crate::{RecordId, Table};

/// Errors that can occur when interacting with the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No row with the given primary key exists.
    #[error("{table} record {id} does not exist")]
    NotFound { table: Table, id: RecordId },

    /// A unique constraint was violated on insert.
    #[error("Unique constraint violated on {table}.{column}: {value}")]
    UniqueViolation {
        table: Table,
        column: &'static str,
        value: String,
    },

    /// A row references a parent that does not exist, or a parent is
    /// still referenced by child rows.
    #[error("Foreign key violation on {table}: {detail}")]
    ForeignKey { table: Table, detail: String },

    /// The row failed validation before it reached the store.
    #[error("Invalid {table} record: {reason}")]
    Invalid { table: Table, reason: String },

    /// A stored column held a value that could not be decoded.
    #[error("Corrupt value in {table}.{column}: {value}")]
    Corrupt {
        table: Table,
        column: &'static str,
        value: String,
    },

    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if this error reports a missing row.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Result type for record store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
