//! Row types for the procurement tables.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Money, RecordId};

/// The tables held by a record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Suppliers,
    Contracts,
    Invoices,
    Transactions,
    Penalties,
    Complaints,
    Visits,
}

impl Table {
    /// Returns the SQL table name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Suppliers => "suppliers",
            Table::Contracts => "contracts",
            Table::Invoices => "invoices",
            Table::Transactions => "transactions",
            Table::Penalties => "penalties",
            Table::Complaints => "complaints",
            Table::Visits => "visits",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Implements `as_str`, `Display` and `FromStr` for a lowercase status enum.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Returns the stored string form.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }
    };
}

/// Lifecycle status of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Received,
    Verified,
    Paid,
    Rejected,
}

string_enum!(InvoiceStatus {
    Received => "received",
    Verified => "verified",
    Paid => "paid",
    Rejected => "rejected",
});

/// Status of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    #[default]
    Active,
    Suspended,
    Terminated,
}

string_enum!(ContractStatus {
    Active => "active",
    Suspended => "suspended",
    Terminated => "terminated",
});

/// Severity of a supplier complaint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

string_enum!(Severity {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

impl Severity {
    /// Rating points deducted from a supplier for a complaint of this severity.
    pub fn rating_penalty(&self) -> f64 {
        match self {
            Severity::Low => 0.5,
            Severity::Medium => 1.0,
            Severity::High => 2.0,
            Severity::Critical => 3.0,
        }
    }
}

/// Outcome reported for a payment transaction.
///
/// Free-form: anything other than `success` or `failed` is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransactionStatus {
    Success,
    Failed,
    Other(String),
}

impl TransactionStatus {
    /// Returns the stored string form.
    pub fn as_str(&self) -> &str {
        match self {
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Other(s) => s,
        }
    }

    /// The status an invoice takes once a transaction with this outcome
    /// has been recorded against it.
    pub fn invoice_status(&self) -> InvoiceStatus {
        match self {
            TransactionStatus::Success => InvoiceStatus::Paid,
            TransactionStatus::Failed => InvoiceStatus::Rejected,
            TransactionStatus::Other(_) => InvoiceStatus::Verified,
        }
    }
}

impl Default for TransactionStatus {
    fn default() -> Self {
        TransactionStatus::Success
    }
}

impl From<String> for TransactionStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "success" => TransactionStatus::Success,
            "failed" => TransactionStatus::Failed,
            _ => TransactionStatus::Other(s),
        }
    }
}

impl From<&str> for TransactionStatus {
    fn from(s: &str) -> Self {
        TransactionStatus::from(s.to_string())
    }
}

impl From<TransactionStatus> for String {
    fn from(status: TransactionStatus) -> Self {
        match status {
            TransactionStatus::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: RecordId,
    pub name: String,
    /// Quality rating on a 0.0 to 10.0 scale.
    pub rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSupplier {
    pub name: String,
    pub rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: RecordId,
    pub supplier_id: RecordId,
    pub title: String,
    pub value: Money,
    pub status: ContractStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContract {
    pub supplier_id: RecordId,
    pub title: String,
    pub value: Money,
    pub status: ContractStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: RecordId,
    pub contract_id: RecordId,
    pub amount: Money,
    pub received_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvoice {
    pub contract_id: RecordId,
    pub amount: Money,
    pub received_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
}

/// A payment transaction recorded against an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: RecordId,
    pub invoice_id: RecordId,
    pub amount: Money,
    /// Unique across all transactions.
    pub confirmation_code: String,
    pub status: TransactionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub invoice_id: RecordId,
    pub amount: Money,
    pub confirmation_code: String,
    pub status: TransactionStatus,
}

/// A contractual penalty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Penalty {
    pub id: RecordId,
    pub contract_id: RecordId,
    pub reason: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPenalty {
    pub contract_id: RecordId,
    pub reason: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complaint {
    pub id: RecordId,
    pub supplier_id: RecordId,
    pub description: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewComplaint {
    pub supplier_id: RecordId,
    pub description: String,
    pub severity: Severity,
}

/// A scheduled on-site visit at a supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub id: RecordId,
    pub supplier_id: RecordId,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub purpose: String,
}

impl Visit {
    /// Returns true if `[starts_at, ends_at)` intersects this visit's window.
    pub fn overlaps(&self, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> bool {
        starts_at < self.ends_at && self.starts_at < ends_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVisit {
    pub supplier_id: RecordId,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub purpose: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_transaction_status_maps_to_invoice_status() {
        assert_eq!(
            TransactionStatus::from("success").invoice_status(),
            InvoiceStatus::Paid
        );
        assert_eq!(
            TransactionStatus::from("failed").invoice_status(),
            InvoiceStatus::Rejected
        );
        assert_eq!(
            TransactionStatus::from("pending").invoice_status(),
            InvoiceStatus::Verified
        );
    }

    #[test]
    fn test_transaction_status_keeps_unknown_values() {
        let status = TransactionStatus::from("on_hold");
        assert_eq!(status.as_str(), "on_hold");
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "\"on_hold\"");
        let back: TransactionStatus = serde_json::from_str("\"success\"").unwrap();
        assert_eq!(back, TransactionStatus::Success);
    }

    #[test]
    fn test_status_enums_parse_their_display_form() {
        for status in [
            InvoiceStatus::Received,
            InvoiceStatus::Verified,
            InvoiceStatus::Paid,
            InvoiceStatus::Rejected,
        ] {
            assert_eq!(status.to_string().parse::<InvoiceStatus>(), Ok(status));
        }
        assert_eq!("critical".parse::<Severity>(), Ok(Severity::Critical));
        assert!("bogus".parse::<ContractStatus>().is_err());
    }

    #[test]
    fn test_visit_overlap_is_half_open() {
        let at = |h| Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap();
        let visit = Visit {
            id: RecordId::FIRST,
            supplier_id: RecordId::FIRST,
            starts_at: at(9),
            ends_at: at(11),
            purpose: "audit".to_string(),
        };

        assert!(visit.overlaps(at(10), at(12)));
        assert!(visit.overlaps(at(8), at(10)));
        assert!(visit.overlaps(at(8), at(12)));
        assert!(!visit.overlaps(at(11), at(12)));
        assert!(!visit.overlaps(at(7), at(9)));
    }
}
