//! Local store service wrapper

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{Database, SchemaKind, SqliteTransactionRepository, TransactionRepository};
use crate::error::Result;
use crate::models::Transaction;

/// Thread-safe service over the local transaction database.
///
/// This is the device-resident source of truth for the UI; sync outcomes
/// never mutate it.
#[derive(Clone)]
pub struct TransactionStore {
    db: Arc<Mutex<Database>>,
}

impl TransactionStore {
    /// Open the store database at the given filesystem path
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db = Database::open(db_path.into(), SchemaKind::Store)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Open an in-memory store (primarily for tests)
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory(SchemaKind::Store)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// List all transactions in insertion order
    pub async fn list(&self) -> Result<Vec<Transaction>> {
        let db = self.db.lock().await;
        let repo = SqliteTransactionRepository::new(db.connection());
        repo.list()
    }

    /// Fetch a transaction by id
    pub async fn get(&self, id: &str) -> Result<Option<Transaction>> {
        let db = self.db.lock().await;
        let repo = SqliteTransactionRepository::new(db.connection());
        repo.get(id)
    }

    /// Insert a new transaction; rejects a duplicate id
    pub async fn create(&self, transaction: &Transaction) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteTransactionRepository::new(db.connection());
        repo.create(transaction)
    }

    /// Upsert a transaction
    pub async fn update(&self, transaction: &Transaction) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteTransactionRepository::new(db.connection());
        repo.update(transaction)
    }

    /// Delete a transaction by id
    pub async fn delete(&self, id: &str) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteTransactionRepository::new(db.connection());
        repo.delete(id)
    }

    /// Insert many transactions atomically
    pub async fn insert_many(&self, transactions: &[Transaction]) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteTransactionRepository::new(db.connection());
        repo.insert_many(transactions)
    }

    /// Delete all transactions
    pub async fn clear(&self) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteTransactionRepository::new(db.connection());
        repo.clear()
    }

    /// Count stored transactions
    pub async fn count(&self) -> Result<u64> {
        let db = self.db.lock().await;
        let repo = SqliteTransactionRepository::new(db.connection());
        repo.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionKind;

    #[tokio::test(flavor = "multi_thread")]
    async fn in_memory_create_and_list_roundtrip() {
        let store = TransactionStore::open_in_memory().unwrap();

        let tx = Transaction::new("Coffee", 3.5, "food", TransactionKind::Expense, 100);
        store.create(&tx).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed, vec![tx]);
    }
}
