use std::str::FromStr;

use async_trait::async_trait;
use sqlx::error::ErrorKind;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};

use crate::store::{
    RecordStore, record_write, validate_invoice, validate_penalty, validate_rating,
    validate_transaction, validate_visit,
};
use crate::{
    Complaint, Contract, Invoice, InvoiceStatus, Money, NewComplaint, NewContract, NewInvoice,
    NewPenalty, NewSupplier, NewTransaction, NewVisit, PaymentTransaction, Penalty, RecordId,
    Result, StoreError, Supplier, Table, Visit,
};

const SUPPLIER_COLUMNS: &str = "id, name, rating";
const CONTRACT_COLUMNS: &str = "id, supplier_id, title, value_cents, status";
const INVOICE_COLUMNS: &str = "id, contract_id, amount_cents, received_date, due_date, status";
const TRANSACTION_COLUMNS: &str = "id, invoice_id, amount_cents, confirmation_code, status";
const PENALTY_COLUMNS: &str = "id, contract_id, reason, amount_cents";
const COMPLAINT_COLUMNS: &str = "id, supplier_id, description, severity";
const VISIT_COLUMNS: &str = "id, supplier_id, starts_at, ends_at, purpose";

/// PostgreSQL-backed record store implementation.
///
/// Every insert runs in its own transaction that takes an exclusive table
/// lock before computing `MAX(id) + 1`, so concurrent inserts never hand
/// out the same key.
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    /// Creates a new PostgreSQL record store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn fetch_row(&self, table: Table, columns: &str, id: RecordId) -> Result<PgRow> {
        let sql = format!("SELECT {columns} FROM {table} WHERE id = $1");
        sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { table, id })
    }

    async fn delete_row(&self, table: Table, id: RecordId) -> Result<()> {
        let sql = format!("DELETE FROM {table} WHERE id = $1");
        let result = sqlx::query(&sql)
            .bind(id.as_i64())
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error(e, table))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { table, id });
        }
        record_write(table, "delete", id);
        Ok(())
    }
}

/// Locks `table` for the rest of the transaction and returns `MAX(id) + 1`.
async fn allocate_id(conn: &mut PgConnection, table: Table) -> Result<RecordId> {
    sqlx::query(&format!("LOCK TABLE {table} IN EXCLUSIVE MODE"))
        .execute(&mut *conn)
        .await?;
    let next: i64 = sqlx::query_scalar(&format!("SELECT COALESCE(MAX(id), 0) + 1 FROM {table}"))
        .fetch_one(&mut *conn)
        .await?;
    Ok(RecordId::new(next))
}

fn map_db_error(e: sqlx::Error, table: Table) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        match db_err.kind() {
            ErrorKind::UniqueViolation if db_err.constraint() == Some("unique_confirmation_code") => {
                return StoreError::UniqueViolation {
                    table,
                    column: "confirmation_code",
                    value: db_err.message().to_string(),
                };
            }
            ErrorKind::ForeignKeyViolation => {
                return StoreError::ForeignKey {
                    table,
                    detail: db_err.message().to_string(),
                };
            }
            ErrorKind::CheckViolation => {
                return StoreError::Invalid {
                    table,
                    reason: db_err.message().to_string(),
                };
            }
            _ => {}
        }
    }
    StoreError::Database(e)
}

fn parse_column<T: FromStr>(table: Table, column: &'static str, value: String) -> Result<T> {
    value
        .parse()
        .map_err(|_| StoreError::Corrupt {
            table,
            column,
            value,
        })
}

fn row_to_supplier(row: PgRow) -> Result<Supplier> {
    Ok(Supplier {
        id: RecordId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        rating: row.try_get("rating")?,
    })
}

fn row_to_contract(row: PgRow) -> Result<Contract> {
    Ok(Contract {
        id: RecordId::new(row.try_get("id")?),
        supplier_id: RecordId::new(row.try_get("supplier_id")?),
        title: row.try_get("title")?,
        value: Money::from_cents(row.try_get("value_cents")?),
        status: parse_column(Table::Contracts, "status", row.try_get("status")?)?,
    })
}

fn row_to_invoice(row: PgRow) -> Result<Invoice> {
    Ok(Invoice {
        id: RecordId::new(row.try_get("id")?),
        contract_id: RecordId::new(row.try_get("contract_id")?),
        amount: Money::from_cents(row.try_get("amount_cents")?),
        received_date: row.try_get("received_date")?,
        due_date: row.try_get("due_date")?,
        status: parse_column(Table::Invoices, "status", row.try_get("status")?)?,
    })
}

fn row_to_transaction(row: PgRow) -> Result<PaymentTransaction> {
    let status: String = row.try_get("status")?;
    Ok(PaymentTransaction {
        id: RecordId::new(row.try_get("id")?),
        invoice_id: RecordId::new(row.try_get("invoice_id")?),
        amount: Money::from_cents(row.try_get("amount_cents")?),
        confirmation_code: row.try_get("confirmation_code")?,
        status: status.into(),
    })
}

fn row_to_penalty(row: PgRow) -> Result<Penalty> {
    Ok(Penalty {
        id: RecordId::new(row.try_get("id")?),
        contract_id: RecordId::new(row.try_get("contract_id")?),
        reason: row.try_get("reason")?,
        amount: Money::from_cents(row.try_get("amount_cents")?),
    })
}

fn row_to_complaint(row: PgRow) -> Result<Complaint> {
    Ok(Complaint {
        id: RecordId::new(row.try_get("id")?),
        supplier_id: RecordId::new(row.try_get("supplier_id")?),
        description: row.try_get("description")?,
        severity: parse_column(Table::Complaints, "severity", row.try_get("severity")?)?,
    })
}

fn row_to_visit(row: PgRow) -> Result<Visit> {
    Ok(Visit {
        id: RecordId::new(row.try_get("id")?),
        supplier_id: RecordId::new(row.try_get("supplier_id")?),
        starts_at: row.try_get("starts_at")?,
        ends_at: row.try_get("ends_at")?,
        purpose: row.try_get("purpose")?,
    })
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn get_supplier(&self, id: RecordId) -> Result<Supplier> {
        row_to_supplier(self.fetch_row(Table::Suppliers, SUPPLIER_COLUMNS, id).await?)
    }

    async fn insert_supplier(&self, new: NewSupplier) -> Result<Supplier> {
        validate_rating(Table::Suppliers, new.rating)?;
        let mut tx = self.pool.begin().await?;
        let id = allocate_id(&mut tx, Table::Suppliers).await?;

        sqlx::query("INSERT INTO suppliers (id, name, rating) VALUES ($1, $2, $3)")
            .bind(id.as_i64())
            .bind(&new.name)
            .bind(new.rating)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_db_error(e, Table::Suppliers))?;

        tx.commit().await?;
        record_write(Table::Suppliers, "insert", id);
        Ok(Supplier {
            id,
            name: new.name,
            rating: new.rating,
        })
    }

    async fn set_supplier_rating(&self, id: RecordId, rating: f64) -> Result<f64> {
        validate_rating(Table::Suppliers, rating)?;
        let mut tx = self.pool.begin().await?;

        let previous: Option<f64> =
            sqlx::query_scalar("SELECT rating FROM suppliers WHERE id = $1 FOR UPDATE")
                .bind(id.as_i64())
                .fetch_optional(&mut *tx)
                .await?;
        let previous = previous.ok_or(StoreError::NotFound {
            table: Table::Suppliers,
            id,
        })?;

        sqlx::query("UPDATE suppliers SET rating = $2 WHERE id = $1")
            .bind(id.as_i64())
            .bind(rating)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_db_error(e, Table::Suppliers))?;

        tx.commit().await?;
        record_write(Table::Suppliers, "update", id);
        Ok(previous)
    }

    async fn delete_supplier(&self, id: RecordId) -> Result<()> {
        self.delete_row(Table::Suppliers, id).await
    }

    async fn get_contract(&self, id: RecordId) -> Result<Contract> {
        row_to_contract(self.fetch_row(Table::Contracts, CONTRACT_COLUMNS, id).await?)
    }

    async fn insert_contract(&self, new: NewContract) -> Result<Contract> {
        let mut tx = self.pool.begin().await?;
        let id = allocate_id(&mut tx, Table::Contracts).await?;

        sqlx::query(
            r#"
            INSERT INTO contracts (id, supplier_id, title, value_cents, status)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id.as_i64())
        .bind(new.supplier_id.as_i64())
        .bind(&new.title)
        .bind(new.value.cents())
        .bind(new.status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_db_error(e, Table::Contracts))?;

        tx.commit().await?;
        record_write(Table::Contracts, "insert", id);
        Ok(Contract {
            id,
            supplier_id: new.supplier_id,
            title: new.title,
            value: new.value,
            status: new.status,
        })
    }

    async fn delete_contract(&self, id: RecordId) -> Result<()> {
        self.delete_row(Table::Contracts, id).await
    }

    async fn get_invoice(&self, id: RecordId) -> Result<Invoice> {
        row_to_invoice(self.fetch_row(Table::Invoices, INVOICE_COLUMNS, id).await?)
    }

    async fn insert_invoice(&self, new: NewInvoice) -> Result<Invoice> {
        validate_invoice(&new)?;
        let mut tx = self.pool.begin().await?;
        let id = allocate_id(&mut tx, Table::Invoices).await?;

        sqlx::query(
            r#"
            INSERT INTO invoices (id, contract_id, amount_cents, received_date, due_date, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id.as_i64())
        .bind(new.contract_id.as_i64())
        .bind(new.amount.cents())
        .bind(new.received_date)
        .bind(new.due_date)
        .bind(new.status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_db_error(e, Table::Invoices))?;

        tx.commit().await?;
        record_write(Table::Invoices, "insert", id);
        Ok(Invoice {
            id,
            contract_id: new.contract_id,
            amount: new.amount,
            received_date: new.received_date,
            due_date: new.due_date,
            status: new.status,
        })
    }

    async fn update_invoice_status(&self, id: RecordId, status: InvoiceStatus) -> Result<()> {
        let result = sqlx::query("UPDATE invoices SET status = $2 WHERE id = $1")
            .bind(id.as_i64())
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                table: Table::Invoices,
                id,
            });
        }
        record_write(Table::Invoices, "update", id);
        Ok(())
    }

    async fn delete_invoice(&self, id: RecordId) -> Result<()> {
        self.delete_row(Table::Invoices, id).await
    }

    async fn get_transaction(&self, id: RecordId) -> Result<PaymentTransaction> {
        row_to_transaction(
            self.fetch_row(Table::Transactions, TRANSACTION_COLUMNS, id)
                .await?,
        )
    }

    async fn insert_transaction(&self, new: NewTransaction) -> Result<PaymentTransaction> {
        validate_transaction(&new)?;
        let mut tx = self.pool.begin().await?;
        let id = allocate_id(&mut tx, Table::Transactions).await?;

        sqlx::query(
            r#"
            INSERT INTO transactions (id, invoice_id, amount_cents, confirmation_code, status)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id.as_i64())
        .bind(new.invoice_id.as_i64())
        .bind(new.amount.cents())
        .bind(&new.confirmation_code)
        .bind(new.status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| match map_db_error(e, Table::Transactions) {
            StoreError::UniqueViolation { table, column, .. } => StoreError::UniqueViolation {
                table,
                column,
                value: new.confirmation_code.clone(),
            },
            other => other,
        })?;

        tx.commit().await?;
        record_write(Table::Transactions, "insert", id);
        Ok(PaymentTransaction {
            id,
            invoice_id: new.invoice_id,
            amount: new.amount,
            confirmation_code: new.confirmation_code,
            status: new.status,
        })
    }

    async fn delete_transaction(&self, id: RecordId) -> Result<()> {
        self.delete_row(Table::Transactions, id).await
    }

    async fn get_penalty(&self, id: RecordId) -> Result<Penalty> {
        row_to_penalty(self.fetch_row(Table::Penalties, PENALTY_COLUMNS, id).await?)
    }

    async fn insert_penalty(&self, new: NewPenalty) -> Result<Penalty> {
        validate_penalty(&new)?;
        let mut tx = self.pool.begin().await?;
        let id = allocate_id(&mut tx, Table::Penalties).await?;

        sqlx::query(
            "INSERT INTO penalties (id, contract_id, reason, amount_cents) VALUES ($1, $2, $3, $4)",
        )
        .bind(id.as_i64())
        .bind(new.contract_id.as_i64())
        .bind(&new.reason)
        .bind(new.amount.cents())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_db_error(e, Table::Penalties))?;

        tx.commit().await?;
        record_write(Table::Penalties, "insert", id);
        Ok(Penalty {
            id,
            contract_id: new.contract_id,
            reason: new.reason,
            amount: new.amount,
        })
    }

    async fn delete_penalty(&self, id: RecordId) -> Result<()> {
        self.delete_row(Table::Penalties, id).await
    }

    async fn get_complaint(&self, id: RecordId) -> Result<Complaint> {
        row_to_complaint(self.fetch_row(Table::Complaints, COMPLAINT_COLUMNS, id).await?)
    }

    async fn insert_complaint(&self, new: NewComplaint) -> Result<Complaint> {
        let mut tx = self.pool.begin().await?;
        let id = allocate_id(&mut tx, Table::Complaints).await?;

        sqlx::query(
            "INSERT INTO complaints (id, supplier_id, description, severity) VALUES ($1, $2, $3, $4)",
        )
        .bind(id.as_i64())
        .bind(new.supplier_id.as_i64())
        .bind(&new.description)
        .bind(new.severity.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_db_error(e, Table::Complaints))?;

        tx.commit().await?;
        record_write(Table::Complaints, "insert", id);
        Ok(Complaint {
            id,
            supplier_id: new.supplier_id,
            description: new.description,
            severity: new.severity,
        })
    }

    async fn delete_complaint(&self, id: RecordId) -> Result<()> {
        self.delete_row(Table::Complaints, id).await
    }

    async fn get_visit(&self, id: RecordId) -> Result<Visit> {
        row_to_visit(self.fetch_row(Table::Visits, VISIT_COLUMNS, id).await?)
    }

    async fn insert_visit(&self, new: NewVisit) -> Result<Visit> {
        validate_visit(&new)?;
        let mut tx = self.pool.begin().await?;
        let id = allocate_id(&mut tx, Table::Visits).await?;

        sqlx::query(
            r#"
            INSERT INTO visits (id, supplier_id, starts_at, ends_at, purpose)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id.as_i64())
        .bind(new.supplier_id.as_i64())
        .bind(new.starts_at)
        .bind(new.ends_at)
        .bind(&new.purpose)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_db_error(e, Table::Visits))?;

        tx.commit().await?;
        record_write(Table::Visits, "insert", id);
        Ok(Visit {
            id,
            supplier_id: new.supplier_id,
            starts_at: new.starts_at,
            ends_at: new.ends_at,
            purpose: new.purpose,
        })
    }

    async fn delete_visit(&self, id: RecordId) -> Result<()> {
        self.delete_row(Table::Visits, id).await
    }

    async fn visits_for_supplier(&self, supplier_id: RecordId) -> Result<Vec<Visit>> {
        let sql =
            format!("SELECT {VISIT_COLUMNS} FROM visits WHERE supplier_id = $1 ORDER BY starts_at");
        let rows = sqlx::query(&sql)
            .bind(supplier_id.as_i64())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_to_visit).collect()
    }
}
