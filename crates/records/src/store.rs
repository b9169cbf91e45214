use async_trait::async_trait;

use crate::{
    Complaint, Contract, Invoice, InvoiceStatus, NewComplaint, NewContract, NewInvoice, NewPenalty,
    NewSupplier, NewTransaction, NewVisit, PaymentTransaction, Penalty, RecordId, Result,
    StoreError, Supplier, Table, Visit,
};

/// Core trait for local transactional store implementations.
///
/// Each method is one atomic scope: it either fully applies or leaves the
/// store untouched. Inserts allocate the primary key as `max(id) + 1`
/// within that scope, so an empty table hands out [`RecordId::FIRST`].
/// Lookups and deletes of a missing key fail with [`StoreError::NotFound`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_supplier(&self, id: RecordId) -> Result<Supplier>;
    async fn insert_supplier(&self, new: NewSupplier) -> Result<Supplier>;
    /// Overwrites a supplier's rating, returning the previous value.
    async fn set_supplier_rating(&self, id: RecordId, rating: f64) -> Result<f64>;
    async fn delete_supplier(&self, id: RecordId) -> Result<()>;

    async fn get_contract(&self, id: RecordId) -> Result<Contract>;
    async fn insert_contract(&self, new: NewContract) -> Result<Contract>;
    async fn delete_contract(&self, id: RecordId) -> Result<()>;

    async fn get_invoice(&self, id: RecordId) -> Result<Invoice>;
    async fn insert_invoice(&self, new: NewInvoice) -> Result<Invoice>;
    async fn update_invoice_status(&self, id: RecordId, status: InvoiceStatus) -> Result<()>;
    async fn delete_invoice(&self, id: RecordId) -> Result<()>;

    async fn get_transaction(&self, id: RecordId) -> Result<PaymentTransaction>;
    /// Fails with [`StoreError::UniqueViolation`] if the confirmation code
    /// is already taken.
    async fn insert_transaction(&self, new: NewTransaction) -> Result<PaymentTransaction>;
    async fn delete_transaction(&self, id: RecordId) -> Result<()>;

    async fn get_penalty(&self, id: RecordId) -> Result<Penalty>;
    async fn insert_penalty(&self, new: NewPenalty) -> Result<Penalty>;
    async fn delete_penalty(&self, id: RecordId) -> Result<()>;

    async fn get_complaint(&self, id: RecordId) -> Result<Complaint>;
    async fn insert_complaint(&self, new: NewComplaint) -> Result<Complaint>;
    async fn delete_complaint(&self, id: RecordId) -> Result<()>;

    async fn get_visit(&self, id: RecordId) -> Result<Visit>;
    async fn insert_visit(&self, new: NewVisit) -> Result<Visit>;
    async fn delete_visit(&self, id: RecordId) -> Result<()>;
    /// Returns the supplier's visits ordered by start time.
    async fn visits_for_supplier(&self, supplier_id: RecordId) -> Result<Vec<Visit>>;
}

/// Extension trait providing convenience methods for record stores.
#[async_trait]
pub trait RecordStoreExt: RecordStore {
    /// Checks if a contract exists.
    async fn contract_exists(&self, id: RecordId) -> Result<bool> {
        match self.get_contract(id).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Checks if a supplier exists.
    async fn supplier_exists(&self, id: RecordId) -> Result<bool> {
        match self.get_supplier(id).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

// Blanket implementation for all RecordStore implementations
impl<T: RecordStore + ?Sized> RecordStoreExt for T {}

/// Counts and logs a committed write. `op` is `insert`, `update` or `delete`.
pub(crate) fn record_write(table: Table, op: &'static str, id: RecordId) {
    metrics::counter!("store_operations_total", "table" => table.as_str(), "op" => op)
        .increment(1);
    tracing::debug!(%table, %id, op, "store write committed");
}

/// Validates a supplier row before insert or rating update.
pub fn validate_rating(table: Table, rating: f64) -> Result<()> {
    if !(0.0..=10.0).contains(&rating) {
        return Err(StoreError::Invalid {
            table,
            reason: format!("rating {rating} outside 0.0..=10.0"),
        });
    }
    Ok(())
}

/// Validates an invoice row before insert.
pub fn validate_invoice(new: &NewInvoice) -> Result<()> {
    if !new.amount.is_positive() {
        return Err(StoreError::Invalid {
            table: Table::Invoices,
            reason: format!("amount must be positive, got {}", new.amount),
        });
    }
    if new.due_date < new.received_date {
        return Err(StoreError::Invalid {
            table: Table::Invoices,
            reason: format!(
                "due date {} precedes received date {}",
                new.due_date, new.received_date
            ),
        });
    }
    Ok(())
}

/// Validates a transaction row before insert.
pub fn validate_transaction(new: &NewTransaction) -> Result<()> {
    if new.confirmation_code.trim().is_empty() {
        return Err(StoreError::Invalid {
            table: Table::Transactions,
            reason: "confirmation code is empty".to_string(),
        });
    }
    Ok(())
}

/// Validates a penalty row before insert.
pub fn validate_penalty(new: &NewPenalty) -> Result<()> {
    if !new.amount.is_positive() {
        return Err(StoreError::Invalid {
            table: Table::Penalties,
            reason: format!("amount must be positive, got {}", new.amount),
        });
    }
    Ok(())
}

/// Validates a visit row before insert.
pub fn validate_visit(new: &NewVisit) -> Result<()> {
    if new.starts_at >= new.ends_at {
        return Err(StoreError::Invalid {
            table: Table::Visits,
            reason: "visit must end after it starts".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Money;
    use chrono::NaiveDate;

    fn invoice(amount: i64, received: (u32, u32), due: (u32, u32)) -> NewInvoice {
        NewInvoice {
            contract_id: RecordId::FIRST,
            amount: Money::from_cents(amount),
            received_date: NaiveDate::from_ymd_opt(2024, received.0, received.1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, due.0, due.1).unwrap(),
            status: InvoiceStatus::Received,
        }
    }

    #[test]
    fn test_validate_invoice() {
        assert!(validate_invoice(&invoice(100, (1, 1), (2, 1))).is_ok());
        assert!(validate_invoice(&invoice(100, (1, 1), (1, 1))).is_ok());
        assert!(validate_invoice(&invoice(0, (1, 1), (2, 1))).is_err());
        assert!(validate_invoice(&invoice(100, (2, 1), (1, 1))).is_err());
    }

    #[test]
    fn test_validate_rating_bounds() {
        assert!(validate_rating(Table::Suppliers, 0.0).is_ok());
        assert!(validate_rating(Table::Suppliers, 10.0).is_ok());
        assert!(validate_rating(Table::Suppliers, -0.1).is_err());
        assert!(validate_rating(Table::Suppliers, 10.5).is_err());
        assert!(validate_rating(Table::Suppliers, f64::NAN).is_err());
    }

    #[test]
    fn test_validate_transaction_requires_code() {
        let new = NewTransaction {
            invoice_id: RecordId::FIRST,
            amount: Money::from_cents(100),
            confirmation_code: "  ".to_string(),
            status: Default::default(),
        };
        assert!(validate_transaction(&new).is_err());
    }
}
