use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::store::{
    RecordStore, record_write, validate_invoice, validate_penalty, validate_rating,
    validate_transaction, validate_visit,
};
use crate::{
    Complaint, Contract, Invoice, InvoiceStatus, NewComplaint, NewContract, NewInvoice, NewPenalty,
    NewSupplier, NewTransaction, NewVisit, PaymentTransaction, Penalty, RecordId, Result,
    StoreError, Supplier, Table, Visit,
};

type Rows<T> = BTreeMap<RecordId, T>;

#[derive(Debug, Default)]
struct Tables {
    suppliers: Rows<Supplier>,
    contracts: Rows<Contract>,
    invoices: Rows<Invoice>,
    transactions: Rows<PaymentTransaction>,
    penalties: Rows<Penalty>,
    complaints: Rows<Complaint>,
    visits: Rows<Visit>,
    fail_next_insert: HashSet<Table>,
    fail_on_delete: HashSet<Table>,
    unavailable: bool,
}

impl Tables {
    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn guard_insert(&mut self, table: Table) -> Result<()> {
        self.check_available()?;
        if self.fail_next_insert.remove(&table) {
            return Err(StoreError::Unavailable(format!("insert into {table} failed")));
        }
        Ok(())
    }

    fn guard_delete(&self, table: Table) -> Result<()> {
        self.check_available()?;
        if self.fail_on_delete.contains(&table) {
            return Err(StoreError::Unavailable(format!("delete from {table} failed")));
        }
        Ok(())
    }

    fn require_parent<T>(rows: &Rows<T>, child: Table, parent: Table, id: RecordId) -> Result<()> {
        if !rows.contains_key(&id) {
            return Err(StoreError::ForeignKey {
                table: child,
                detail: format!("{parent} record {id} does not exist"),
            });
        }
        Ok(())
    }

    fn row_count(&self, table: Table) -> usize {
        match table {
            Table::Suppliers => self.suppliers.len(),
            Table::Contracts => self.contracts.len(),
            Table::Invoices => self.invoices.len(),
            Table::Transactions => self.transactions.len(),
            Table::Penalties => self.penalties.len(),
            Table::Complaints => self.complaints.len(),
            Table::Visits => self.visits.len(),
        }
    }
}

fn next_id<T>(rows: &Rows<T>) -> RecordId {
    rows.keys()
        .next_back()
        .map(RecordId::next)
        .unwrap_or(RecordId::FIRST)
}

fn fetch<T: Clone>(rows: &Rows<T>, table: Table, id: RecordId) -> Result<T> {
    rows.get(&id)
        .cloned()
        .ok_or(StoreError::NotFound { table, id })
}

fn remove<T>(rows: &mut Rows<T>, table: Table, id: RecordId) -> Result<()> {
    rows.remove(&id).ok_or(StoreError::NotFound { table, id })?;
    record_write(table, "delete", id);
    Ok(())
}

fn restrict(table: Table, id: RecordId, child: Table, referenced: bool) -> Result<()> {
    if referenced {
        return Err(StoreError::ForeignKey {
            table,
            detail: format!("record {id} is still referenced by {child}"),
        });
    }
    Ok(())
}

/// In-memory record store implementation for testing.
///
/// Mirrors the PostgreSQL implementation's key allocation, unique and
/// foreign key checks. Failures can be injected per table so tests can
/// drive saga rollback paths.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryRecordStore {
    /// Creates a new empty in-memory record store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next insert into `table` fail with [`StoreError::Unavailable`].
    pub async fn fail_next_insert(&self, table: Table) {
        self.tables.write().await.fail_next_insert.insert(table);
    }

    /// Configures every delete from `table` to fail.
    pub async fn set_fail_on_delete(&self, table: Table, fail: bool) {
        let mut tables = self.tables.write().await;
        if fail {
            tables.fail_on_delete.insert(table);
        } else {
            tables.fail_on_delete.remove(&table);
        }
    }

    /// Makes every operation fail as if the database were unreachable.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.tables.write().await.unavailable = unavailable;
    }

    /// Returns the number of rows in a table.
    pub async fn row_count(&self, table: Table) -> usize {
        self.tables.read().await.row_count(table)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_supplier(&self, id: RecordId) -> Result<Supplier> {
        let tables = self.tables.read().await;
        tables.check_available()?;
        fetch(&tables.suppliers, Table::Suppliers, id)
    }

    async fn insert_supplier(&self, new: NewSupplier) -> Result<Supplier> {
        validate_rating(Table::Suppliers, new.rating)?;
        let mut tables = self.tables.write().await;
        tables.guard_insert(Table::Suppliers)?;

        let supplier = Supplier {
            id: next_id(&tables.suppliers),
            name: new.name,
            rating: new.rating,
        };
        tables.suppliers.insert(supplier.id, supplier.clone());
        record_write(Table::Suppliers, "insert", supplier.id);
        Ok(supplier)
    }

    async fn set_supplier_rating(&self, id: RecordId, rating: f64) -> Result<f64> {
        validate_rating(Table::Suppliers, rating)?;
        let mut tables = self.tables.write().await;
        tables.check_available()?;

        let supplier = tables
            .suppliers
            .get_mut(&id)
            .ok_or(StoreError::NotFound {
                table: Table::Suppliers,
                id,
            })?;
        let previous = std::mem::replace(&mut supplier.rating, rating);
        record_write(Table::Suppliers, "update", id);
        Ok(previous)
    }

    async fn delete_supplier(&self, id: RecordId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.guard_delete(Table::Suppliers)?;

        let referenced = tables.contracts.values().any(|c| c.supplier_id == id)
            || tables.complaints.values().any(|c| c.supplier_id == id)
            || tables.visits.values().any(|v| v.supplier_id == id);
        restrict(Table::Suppliers, id, Table::Contracts, referenced)?;
        remove(&mut tables.suppliers, Table::Suppliers, id)
    }

    async fn get_contract(&self, id: RecordId) -> Result<Contract> {
        let tables = self.tables.read().await;
        tables.check_available()?;
        fetch(&tables.contracts, Table::Contracts, id)
    }

    async fn insert_contract(&self, new: NewContract) -> Result<Contract> {
        let mut tables = self.tables.write().await;
        tables.guard_insert(Table::Contracts)?;
        Tables::require_parent(
            &tables.suppliers,
            Table::Contracts,
            Table::Suppliers,
            new.supplier_id,
        )?;

        let contract = Contract {
            id: next_id(&tables.contracts),
            supplier_id: new.supplier_id,
            title: new.title,
            value: new.value,
            status: new.status,
        };
        tables.contracts.insert(contract.id, contract.clone());
        record_write(Table::Contracts, "insert", contract.id);
        Ok(contract)
    }

    async fn delete_contract(&self, id: RecordId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.guard_delete(Table::Contracts)?;

        let referenced = tables.invoices.values().any(|i| i.contract_id == id)
            || tables.penalties.values().any(|p| p.contract_id == id);
        restrict(Table::Contracts, id, Table::Invoices, referenced)?;
        remove(&mut tables.contracts, Table::Contracts, id)
    }

    async fn get_invoice(&self, id: RecordId) -> Result<Invoice> {
        let tables = self.tables.read().await;
        tables.check_available()?;
        fetch(&tables.invoices, Table::Invoices, id)
    }

    async fn insert_invoice(&self, new: NewInvoice) -> Result<Invoice> {
        validate_invoice(&new)?;
        let mut tables = self.tables.write().await;
        tables.guard_insert(Table::Invoices)?;
        Tables::require_parent(
            &tables.contracts,
            Table::Invoices,
            Table::Contracts,
            new.contract_id,
        )?;

        let invoice = Invoice {
            id: next_id(&tables.invoices),
            contract_id: new.contract_id,
            amount: new.amount,
            received_date: new.received_date,
            due_date: new.due_date,
            status: new.status,
        };
        tables.invoices.insert(invoice.id, invoice.clone());
        record_write(Table::Invoices, "insert", invoice.id);
        Ok(invoice)
    }

    async fn update_invoice_status(&self, id: RecordId, status: InvoiceStatus) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check_available()?;

        let invoice = tables.invoices.get_mut(&id).ok_or(StoreError::NotFound {
            table: Table::Invoices,
            id,
        })?;
        invoice.status = status;
        record_write(Table::Invoices, "update", id);
        Ok(())
    }

    async fn delete_invoice(&self, id: RecordId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.guard_delete(Table::Invoices)?;

        let referenced = tables.transactions.values().any(|t| t.invoice_id == id);
        restrict(Table::Invoices, id, Table::Transactions, referenced)?;
        remove(&mut tables.invoices, Table::Invoices, id)
    }

    async fn get_transaction(&self, id: RecordId) -> Result<PaymentTransaction> {
        let tables = self.tables.read().await;
        tables.check_available()?;
        fetch(&tables.transactions, Table::Transactions, id)
    }

    async fn insert_transaction(&self, new: NewTransaction) -> Result<PaymentTransaction> {
        validate_transaction(&new)?;
        let mut tables = self.tables.write().await;
        tables.guard_insert(Table::Transactions)?;
        Tables::require_parent(
            &tables.invoices,
            Table::Transactions,
            Table::Invoices,
            new.invoice_id,
        )?;

        if tables
            .transactions
            .values()
            .any(|t| t.confirmation_code == new.confirmation_code)
        {
            return Err(StoreError::UniqueViolation {
                table: Table::Transactions,
                column: "confirmation_code",
                value: new.confirmation_code,
            });
        }

        let transaction = PaymentTransaction {
            id: next_id(&tables.transactions),
            invoice_id: new.invoice_id,
            amount: new.amount,
            confirmation_code: new.confirmation_code,
            status: new.status,
        };
        tables
            .transactions
            .insert(transaction.id, transaction.clone());
        record_write(Table::Transactions, "insert", transaction.id);
        Ok(transaction)
    }

    async fn delete_transaction(&self, id: RecordId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.guard_delete(Table::Transactions)?;
        remove(&mut tables.transactions, Table::Transactions, id)
    }

    async fn get_penalty(&self, id: RecordId) -> Result<Penalty> {
        let tables = self.tables.read().await;
        tables.check_available()?;
        fetch(&tables.penalties, Table::Penalties, id)
    }

    async fn insert_penalty(&self, new: NewPenalty) -> Result<Penalty> {
        validate_penalty(&new)?;
        let mut tables = self.tables.write().await;
        tables.guard_insert(Table::Penalties)?;
        Tables::require_parent(
            &tables.contracts,
            Table::Penalties,
            Table::Contracts,
            new.contract_id,
        )?;

        let penalty = Penalty {
            id: next_id(&tables.penalties),
            contract_id: new.contract_id,
            reason: new.reason,
            amount: new.amount,
        };
        tables.penalties.insert(penalty.id, penalty.clone());
        record_write(Table::Penalties, "insert", penalty.id);
        Ok(penalty)
    }

    async fn delete_penalty(&self, id: RecordId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.guard_delete(Table::Penalties)?;
        remove(&mut tables.penalties, Table::Penalties, id)
    }

    async fn get_complaint(&self, id: RecordId) -> Result<Complaint> {
        let tables = self.tables.read().await;
        tables.check_available()?;
        fetch(&tables.complaints, Table::Complaints, id)
    }

    async fn insert_complaint(&self, new: NewComplaint) -> Result<Complaint> {
        let mut tables = self.tables.write().await;
        tables.guard_insert(Table::Complaints)?;
        Tables::require_parent(
            &tables.suppliers,
            Table::Complaints,
            Table::Suppliers,
            new.supplier_id,
        )?;

        let complaint = Complaint {
            id: next_id(&tables.complaints),
            supplier_id: new.supplier_id,
            description: new.description,
            severity: new.severity,
        };
        tables.complaints.insert(complaint.id, complaint.clone());
        record_write(Table::Complaints, "insert", complaint.id);
        Ok(complaint)
    }

    async fn delete_complaint(&self, id: RecordId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.guard_delete(Table::Complaints)?;
        remove(&mut tables.complaints, Table::Complaints, id)
    }

    async fn get_visit(&self, id: RecordId) -> Result<Visit> {
        let tables = self.tables.read().await;
        tables.check_available()?;
        fetch(&tables.visits, Table::Visits, id)
    }

    async fn insert_visit(&self, new: NewVisit) -> Result<Visit> {
        validate_visit(&new)?;
        let mut tables = self.tables.write().await;
        tables.guard_insert(Table::Visits)?;
        Tables::require_parent(
            &tables.suppliers,
            Table::Visits,
            Table::Suppliers,
            new.supplier_id,
        )?;

        let visit = Visit {
            id: next_id(&tables.visits),
            supplier_id: new.supplier_id,
            starts_at: new.starts_at,
            ends_at: new.ends_at,
            purpose: new.purpose,
        };
        tables.visits.insert(visit.id, visit.clone());
        record_write(Table::Visits, "insert", visit.id);
        Ok(visit)
    }

    async fn delete_visit(&self, id: RecordId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.guard_delete(Table::Visits)?;
        remove(&mut tables.visits, Table::Visits, id)
    }

    async fn visits_for_supplier(&self, supplier_id: RecordId) -> Result<Vec<Visit>> {
        let tables = self.tables.read().await;
        tables.check_available()?;

        let mut visits: Vec<_> = tables
            .visits
            .values()
            .filter(|v| v.supplier_id == supplier_id)
            .cloned()
            .collect();
        visits.sort_by_key(|v| v.starts_at);
        Ok(visits)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use metrics_exporter_prometheus::PrometheusBuilder;

    use super::*;
    use crate::{ContractStatus, Money, RecordStoreExt, Severity, TransactionStatus};

    async fn seed_contract(store: &InMemoryRecordStore) -> Contract {
        let supplier = store
            .insert_supplier(NewSupplier {
                name: "Nordic Cold Chain".to_string(),
                rating: 8.0,
            })
            .await
            .unwrap();
        store
            .insert_contract(NewContract {
                supplier_id: supplier.id,
                title: "Refrigerated transport".to_string(),
                value: Money::from_major(500_000),
                status: ContractStatus::Active,
            })
            .await
            .unwrap()
    }

    fn new_invoice(contract_id: RecordId) -> NewInvoice {
        NewInvoice {
            contract_id,
            amount: Money::from_major(1000),
            received_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            status: InvoiceStatus::Received,
        }
    }

    #[tokio::test]
    async fn test_first_id_is_one_and_ids_increase() {
        let store = InMemoryRecordStore::new();
        let contract = seed_contract(&store).await;
        assert_eq!(contract.id, RecordId::FIRST);

        let first = store.insert_invoice(new_invoice(contract.id)).await.unwrap();
        let second = store.insert_invoice(new_invoice(contract.id)).await.unwrap();

        assert_eq!(first.id, RecordId::new(1));
        assert_eq!(second.id, RecordId::new(2));
    }

    #[tokio::test]
    async fn test_ids_follow_max_not_count() {
        let store = InMemoryRecordStore::new();
        let contract = seed_contract(&store).await;

        let a = store.insert_invoice(new_invoice(contract.id)).await.unwrap();
        let b = store.insert_invoice(new_invoice(contract.id)).await.unwrap();
        store.delete_invoice(a.id).await.unwrap();

        let c = store.insert_invoice(new_invoice(contract.id)).await.unwrap();
        assert_eq!(c.id, b.id.next());
    }

    #[tokio::test]
    async fn test_get_missing_row_is_not_found() {
        let store = InMemoryRecordStore::new();
        let err = store.get_invoice(RecordId::new(7)).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!store.contract_exists(RecordId::new(7)).await.unwrap());

        let err = store.delete_penalty(RecordId::new(7)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_confirmation_code_is_rejected() {
        let store = InMemoryRecordStore::new();
        let contract = seed_contract(&store).await;
        let invoice = store.insert_invoice(new_invoice(contract.id)).await.unwrap();

        let tx = NewTransaction {
            invoice_id: invoice.id,
            amount: invoice.amount,
            confirmation_code: "TRX-001".to_string(),
            status: TransactionStatus::Success,
        };
        store.insert_transaction(tx.clone()).await.unwrap();
        let err = store.insert_transaction(tx).await.unwrap_err();

        assert!(matches!(err, StoreError::UniqueViolation { .. }));
        assert_eq!(store.row_count(Table::Transactions).await, 1);
    }

    #[tokio::test]
    async fn test_insert_requires_parent_row() {
        let store = InMemoryRecordStore::new();
        let err = store
            .insert_penalty(NewPenalty {
                contract_id: RecordId::new(99),
                reason: "late delivery".to_string(),
                amount: Money::from_major(10),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ForeignKey { .. }));
    }

    #[tokio::test]
    async fn test_delete_is_restricted_while_referenced() {
        let store = InMemoryRecordStore::new();
        let contract = seed_contract(&store).await;
        let invoice = store.insert_invoice(new_invoice(contract.id)).await.unwrap();
        let tx = store
            .insert_transaction(NewTransaction {
                invoice_id: invoice.id,
                amount: invoice.amount,
                confirmation_code: "TRX-002".to_string(),
                status: TransactionStatus::Success,
            })
            .await
            .unwrap();

        assert!(matches!(
            store.delete_invoice(invoice.id).await,
            Err(StoreError::ForeignKey { .. })
        ));

        store.delete_transaction(tx.id).await.unwrap();
        store.delete_invoice(invoice.id).await.unwrap();
        assert_eq!(store.row_count(Table::Invoices).await, 0);
    }

    #[tokio::test]
    async fn test_update_invoice_status() {
        let store = InMemoryRecordStore::new();
        let contract = seed_contract(&store).await;
        let invoice = store.insert_invoice(new_invoice(contract.id)).await.unwrap();

        store
            .update_invoice_status(invoice.id, InvoiceStatus::Paid)
            .await
            .unwrap();
        assert_eq!(
            store.get_invoice(invoice.id).await.unwrap().status,
            InvoiceStatus::Paid
        );
    }

    #[tokio::test]
    async fn test_set_supplier_rating_returns_previous() {
        let store = InMemoryRecordStore::new();
        let contract = seed_contract(&store).await;

        let previous = store
            .set_supplier_rating(contract.supplier_id, 6.5)
            .await
            .unwrap();
        assert_eq!(previous, 8.0);
        assert_eq!(
            store.get_supplier(contract.supplier_id).await.unwrap().rating,
            6.5
        );
        assert!(
            store
                .set_supplier_rating(contract.supplier_id, 11.0)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = InMemoryRecordStore::new();
        let contract = seed_contract(&store).await;

        store.fail_next_insert(Table::Invoices).await;
        assert!(matches!(
            store.insert_invoice(new_invoice(contract.id)).await,
            Err(StoreError::Unavailable(_))
        ));
        // Only the next insert fails.
        let invoice = store.insert_invoice(new_invoice(contract.id)).await.unwrap();

        store.set_fail_on_delete(Table::Invoices, true).await;
        assert!(store.delete_invoice(invoice.id).await.is_err());
        store.set_fail_on_delete(Table::Invoices, false).await;
        store.delete_invoice(invoice.id).await.unwrap();

        store.set_unavailable(true).await;
        assert!(store.get_contract(contract.id).await.is_err());
    }

    #[tokio::test]
    async fn test_visits_for_supplier_sorted_by_start() {
        let store = InMemoryRecordStore::new();
        let contract = seed_contract(&store).await;
        let at = |h| Utc.with_ymd_and_hms(2024, 6, 3, h, 0, 0).unwrap();

        for (start, end) in [(14, 15), (9, 10)] {
            store
                .insert_visit(NewVisit {
                    supplier_id: contract.supplier_id,
                    starts_at: at(start),
                    ends_at: at(end),
                    purpose: "temperature audit".to_string(),
                })
                .await
                .unwrap();
        }
        store
            .insert_complaint(NewComplaint {
                supplier_id: contract.supplier_id,
                description: "warm pallet".to_string(),
                severity: Severity::High,
            })
            .await
            .unwrap();

        let visits = store
            .visits_for_supplier(contract.supplier_id)
            .await
            .unwrap();
        assert_eq!(visits.len(), 2);
        assert_eq!(visits[0].starts_at, at(9));
        assert!(
            store
                .visits_for_supplier(RecordId::new(42))
                .await
                .unwrap()
                .is_empty()
        );
    }

    fn counter_value(rendered: &str, table: &str, op: &str) -> Option<u64> {
        rendered
            .lines()
            .filter(|line| line.starts_with("store_operations_total{"))
            .find(|line| {
                line.contains(&format!("table=\"{table}\""))
                    && line.contains(&format!("op=\"{op}\""))
            })
            .and_then(|line| line.rsplit(' ').next())
            .and_then(|value| value.parse().ok())
    }

    #[test]
    fn test_committed_writes_are_counted() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        metrics::with_local_recorder(&recorder, || {
            runtime.block_on(async {
                let store = InMemoryRecordStore::new();
                let contract = seed_contract(&store).await;

                store.fail_next_insert(Table::Invoices).await;
                assert!(store.insert_invoice(new_invoice(contract.id)).await.is_err());
                let invoice = store.insert_invoice(new_invoice(contract.id)).await.unwrap();
                store
                    .update_invoice_status(invoice.id, InvoiceStatus::Paid)
                    .await
                    .unwrap();
                store.delete_invoice(invoice.id).await.unwrap();
                assert!(store.delete_invoice(invoice.id).await.is_err());
            })
        });

        let rendered = handle.render();
        assert_eq!(counter_value(&rendered, "suppliers", "insert"), Some(1));
        assert_eq!(counter_value(&rendered, "contracts", "insert"), Some(1));
        assert_eq!(counter_value(&rendered, "invoices", "insert"), Some(1));
        assert_eq!(counter_value(&rendered, "invoices", "update"), Some(1));
        assert_eq!(counter_value(&rendered, "invoices", "delete"), Some(1));
        assert_eq!(counter_value(&rendered, "contracts", "delete"), None);
    }
}
