//! Transaction model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for a transaction.
///
/// Locally created transactions use UUID v7 (time-sortable); imported ones
/// keep whatever opaque string the remote document carried.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Create a new unique transaction ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TransactionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Whether money came in or went out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            other => Err(format!("unknown transaction kind: {other}")),
        }
    }
}

/// A single ledger entry.
///
/// Wire names are camelCase to stay compatible with the remote document
/// format (`type`, `createdAt`, `updatedAt`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique identifier
    pub id: TransactionId,
    /// Short description
    pub title: String,
    /// Amount in the user's currency
    #[serde(default)]
    pub amount: f64,
    /// Budget category
    #[serde(default)]
    pub category: String,
    /// Income or expense
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Transaction date (Unix ms)
    pub date: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms), absent until first edit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl Transaction {
    /// Create a new transaction dated `date`
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        amount: f64,
        category: impl Into<String>,
        kind: TransactionKind,
        date: i64,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            title: title.into(),
            amount,
            category: category.into(),
            kind,
            date,
            created_at: crate::util::epoch_millis_now(),
            updated_at: None,
        }
    }

    /// Timestamp used for last-write-wins comparison
    #[must_use]
    pub fn effective_timestamp(&self) -> i64 {
        self.updated_at.unwrap_or(self.created_at)
    }

    /// Check the required-field invariant: `id`, `title`, numeric `date`,
    /// valid kind, and `created_at` must all be present and non-empty.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.id.as_str().trim().is_empty() && !self.title.trim().is_empty() && self.created_at > 0
    }

    /// Parse a record-shaped JSON value, rejecting records that fail the
    /// required-field invariant.
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let transaction: Self = serde_json::from_value(value.clone()).ok()?;
        transaction.is_valid().then_some(transaction)
    }
}

/// Sanitize transactions into a remote-document mapping keyed by id.
///
/// Records failing the required-field invariant are silently dropped.
#[must_use]
pub fn sanitize_transactions(transactions: &[Transaction]) -> serde_json::Map<String, serde_json::Value> {
    let mut document = serde_json::Map::new();
    for transaction in transactions {
        if !transaction.is_valid() {
            tracing::debug!(id = %transaction.id, "Dropping invalid transaction during sanitization");
            continue;
        }
        if let Ok(value) = serde_json::to_value(transaction) {
            document.insert(transaction.id.to_string(), value);
        }
    }
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transaction_id_unique() {
        let id1 = TransactionId::new();
        let id2 = TransactionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_transaction_new() {
        let tx = Transaction::new("Groceries", 42.5, "food", TransactionKind::Expense, 1_700_000_000_000);
        assert_eq!(tx.title, "Groceries");
        assert_eq!(tx.kind, TransactionKind::Expense);
        assert!(tx.created_at > 0);
        assert!(tx.updated_at.is_none());
        assert_eq!(tx.effective_timestamp(), tx.created_at);
    }

    #[test]
    fn test_wire_names_are_camel_case() {
        let tx = Transaction::new("Salary", 1000.0, "work", TransactionKind::Income, 100);
        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value["type"], "income");
        assert!(value.get("createdAt").is_some());
        assert!(value.get("updatedAt").is_none());
    }

    #[test]
    fn test_from_value_accepts_complete_record() {
        let value = json!({
            "id": "abc",
            "title": "Rent",
            "amount": 900.0,
            "category": "home",
            "type": "expense",
            "date": 1_700_000_000_000_i64,
            "createdAt": 1_700_000_000_000_i64,
        });
        let tx = Transaction::from_value(&value).unwrap();
        assert_eq!(tx.id.as_str(), "abc");
        assert_eq!(tx.kind, TransactionKind::Expense);
    }

    #[test]
    fn test_from_value_rejects_missing_required_fields() {
        // No createdAt
        let missing_created = json!({
            "id": "abc",
            "title": "Rent",
            "type": "expense",
            "date": 100,
        });
        assert!(Transaction::from_value(&missing_created).is_none());

        // Invalid kind
        let bad_kind = json!({
            "id": "abc",
            "title": "Rent",
            "type": "transfer",
            "date": 100,
            "createdAt": 100,
        });
        assert!(Transaction::from_value(&bad_kind).is_none());

        // Non-numeric date
        let bad_date = json!({
            "id": "abc",
            "title": "Rent",
            "type": "expense",
            "date": "yesterday",
            "createdAt": 100,
        });
        assert!(Transaction::from_value(&bad_date).is_none());
    }

    #[test]
    fn test_from_value_defaults_amount_and_category() {
        let value = json!({
            "id": "abc",
            "title": "Rent",
            "type": "expense",
            "date": 100,
            "createdAt": 100,
        });
        let tx = Transaction::from_value(&value).unwrap();
        assert!((tx.amount - 0.0).abs() < f64::EPSILON);
        assert_eq!(tx.category, "");
    }

    #[test]
    fn test_sanitize_drops_invalid_records() {
        let valid = Transaction::new("Keep", 1.0, "misc", TransactionKind::Income, 100);
        let mut invalid = Transaction::new("", 1.0, "misc", TransactionKind::Income, 100);
        invalid.title = "  ".to_string();

        let document = sanitize_transactions(&[valid.clone(), invalid]);
        assert_eq!(document.len(), 1);
        assert!(document.contains_key(valid.id.as_str()));
    }

    #[test]
    fn test_effective_timestamp_prefers_updated_at() {
        let mut tx = Transaction::new("Edit me", 5.0, "misc", TransactionKind::Expense, 100);
        tx.updated_at = Some(tx.created_at + 10);
        assert_eq!(tx.effective_timestamp(), tx.created_at + 10);
    }
}
