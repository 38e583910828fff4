//! Transaction repository implementation

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::{Transaction, TransactionKind};

/// Trait for local transaction storage operations
pub trait TransactionRepository {
    /// Insert a new transaction; rejects a duplicate id
    fn create(&self, transaction: &Transaction) -> Result<()>;

    /// Get a transaction by ID
    fn get(&self, id: &str) -> Result<Option<Transaction>>;

    /// List all transactions in insertion order
    fn list(&self) -> Result<Vec<Transaction>>;

    /// Upsert a transaction (insert when absent, replace when present)
    fn update(&self, transaction: &Transaction) -> Result<()>;

    /// Delete a transaction by ID; deleting an absent id is not an error
    fn delete(&self, id: &str) -> Result<()>;

    /// Insert many transactions atomically (bulk import)
    fn insert_many(&self, transactions: &[Transaction]) -> Result<()>;

    /// Delete all transactions
    fn clear(&self) -> Result<()>;

    /// Count stored transactions
    fn count(&self) -> Result<u64>;
}

/// `SQLite` implementation of `TransactionRepository`
pub struct SqliteTransactionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteTransactionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a transaction from a database row
    fn parse_transaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transaction> {
        let kind: String = row.get(4)?;
        Ok(Transaction {
            id: row.get::<_, String>(0)?.into(),
            title: row.get(1)?,
            amount: row.get(2)?,
            category: row.get(3)?,
            kind: kind.parse().unwrap_or(TransactionKind::Expense),
            date: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl TransactionRepository for SqliteTransactionRepository<'_> {
    fn create(&self, transaction: &Transaction) -> Result<()> {
        self.conn.execute(
            "INSERT INTO transactions (id, title, amount, category, kind, date, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                transaction.id.as_str(),
                transaction.title,
                transaction.amount,
                transaction.category,
                transaction.kind.as_str(),
                transaction.date,
                transaction.created_at,
                transaction.updated_at,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Transaction>> {
        let result = self.conn.query_row(
            "SELECT id, title, amount, category, kind, date, created_at, updated_at
             FROM transactions WHERE id = ?",
            params![id],
            Self::parse_transaction,
        );

        match result {
            Ok(transaction) => Ok(Some(transaction)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<Transaction>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, amount, category, kind, date, created_at, updated_at
             FROM transactions
             ORDER BY created_at ASC, id ASC",
        )?;

        let transactions = stmt
            .query_map([], Self::parse_transaction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(transactions)
    }

    fn update(&self, transaction: &Transaction) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO transactions (id, title, amount, category, kind, date, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                transaction.id.as_str(),
                transaction.title,
                transaction.amount,
                transaction.category,
                transaction.kind.as_str(),
                transaction.date,
                transaction.created_at,
                transaction.updated_at,
            ],
        )?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM transactions WHERE id = ?", params![id])?;
        Ok(())
    }

    fn insert_many(&self, transactions: &[Transaction]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for transaction in transactions {
            tx.execute(
                "INSERT INTO transactions (id, title, amount, category, kind, date, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    transaction.id.as_str(),
                    transaction.title,
                    transaction.amount,
                    transaction.category,
                    transaction.kind.as_str(),
                    transaction.date,
                    transaction.created_at,
                    transaction.updated_at,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM transactions", [])?;
        Ok(())
    }

    fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, SchemaKind};
    use crate::models::TransactionKind;
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory(SchemaKind::Store).unwrap()
    }

    fn sample(title: &str) -> Transaction {
        Transaction::new(title, 12.5, "food", TransactionKind::Expense, 1_700_000_000_000)
    }

    #[test]
    fn test_create_and_get_round_trip() {
        let db = setup();
        let repo = SqliteTransactionRepository::new(db.connection());

        let tx = sample("Lunch");
        repo.create(&tx).unwrap();

        let fetched = repo.get(tx.id.as_str()).unwrap().unwrap();
        assert_eq!(fetched, tx);
    }

    #[test]
    fn test_create_rejects_duplicate_id() {
        let db = setup();
        let repo = SqliteTransactionRepository::new(db.connection());

        let tx = sample("Lunch");
        repo.create(&tx).unwrap();
        assert!(repo.create(&tx).is_err());
    }

    #[test]
    fn test_update_upserts() {
        let db = setup();
        let repo = SqliteTransactionRepository::new(db.connection());

        // Upsert with no existing row inserts
        let tx = sample("Dinner");
        repo.update(&tx).unwrap();
        assert_eq!(repo.count().unwrap(), 1);

        // Upsert with an existing row replaces
        let mut edited = tx.clone();
        edited.title = "Late dinner".to_string();
        edited.updated_at = Some(edited.created_at + 5);
        repo.update(&edited).unwrap();

        let fetched = repo.get(tx.id.as_str()).unwrap().unwrap();
        assert_eq!(fetched.title, "Late dinner");
        assert_eq!(fetched.updated_at, Some(tx.created_at + 5));
    }

    #[test]
    fn test_delete_absent_is_not_an_error() {
        let db = setup();
        let repo = SqliteTransactionRepository::new(db.connection());
        repo.delete("no-such-id").unwrap();
    }

    #[test]
    fn test_insert_many_is_atomic() {
        let db = setup();
        let repo = SqliteTransactionRepository::new(db.connection());

        let first = sample("One");
        repo.create(&first).unwrap();

        // Batch containing a duplicate must leave no partial rows behind
        let fresh = sample("Two");
        let batch = vec![fresh, first.clone()];
        assert!(repo.insert_many(&batch).is_err());
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_list_insertion_order() {
        let db = setup();
        let repo = SqliteTransactionRepository::new(db.connection());

        let mut a = sample("A");
        a.created_at = 100;
        let mut b = sample("B");
        b.created_at = 200;
        let mut c = sample("C");
        c.created_at = 150;
        for tx in [&a, &b, &c] {
            repo.create(tx).unwrap();
        }

        let titles: Vec<_> = repo.list().unwrap().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["A", "C", "B"]);
    }

    #[test]
    fn test_clear() {
        let db = setup();
        let repo = SqliteTransactionRepository::new(db.connection());

        repo.create(&sample("One")).unwrap();
        repo.create(&sample("Two")).unwrap();
        repo.clear().unwrap();
        assert_eq!(repo.count().unwrap(), 0);
    }
}
