//! Local transactional store for procurement records.
//!
//! Every [`RecordStore`] call runs in its own short atomic scope. Nothing
//! here spans more than one call, which is why the saga crate has to undo
//! committed rows with explicit compensating deletes.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use common::{Money, RecordId};
pub use error::{Result, StoreError};
pub use memory::InMemoryRecordStore;
pub use model::{
    Complaint, Contract, ContractStatus, Invoice, InvoiceStatus, NewComplaint, NewContract,
    NewInvoice, NewPenalty, NewSupplier, NewTransaction, NewVisit, PaymentTransaction, Penalty,
    Severity, Supplier, Table, TransactionStatus, Visit,
};
pub use postgres::PostgresRecordStore;
pub use store::{RecordStore, RecordStoreExt};
