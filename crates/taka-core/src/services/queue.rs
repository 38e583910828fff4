//! Operation queue service wrapper

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{Database, QueueRepository, SchemaKind, SqliteQueueRepository};
use crate::error::Result;
use crate::models::{OperationType, QueueEntry};

/// Thread-safe service over the durable operation queue database.
///
/// The queue lives in its own database file, independent of the local
/// store's lifecycle, and is the exclusive owner of its storage: the sync
/// engine reads and updates entries only through this service.
#[derive(Clone)]
pub struct SyncQueue {
    db: Arc<Mutex<Database>>,
}

impl SyncQueue {
    /// Open the queue database at the given filesystem path
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db = Database::open(db_path.into(), SchemaKind::Queue)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Open an in-memory queue (primarily for tests)
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory(SchemaKind::Queue)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Durably append a pending operation; returns its queue id
    pub async fn append(
        &self,
        operation_type: OperationType,
        payload: &serde_json::Value,
        owner_id: &str,
    ) -> Result<i64> {
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        repo.append(operation_type, payload, owner_id)
    }

    /// Get an entry by queue id
    pub async fn get(&self, queue_id: i64) -> Result<Option<QueueEntry>> {
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        repo.get(queue_id)
    }

    /// List all entries in enqueue order
    pub async fn list_all(&self) -> Result<Vec<QueueEntry>> {
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        repo.list_all()
    }

    /// List entries eligible for a sync attempt at `now`
    pub async fn list_retryable(&self, now: i64) -> Result<Vec<QueueEntry>> {
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        repo.list_retryable(now)
    }

    /// Remove an entry; removing an absent id is not an error
    pub async fn remove(&self, queue_id: i64) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        repo.remove(queue_id)
    }

    /// Merge retry bookkeeping into an existing entry
    pub async fn update_retry(
        &self,
        queue_id: i64,
        retry_count: u32,
        last_attempt_at: i64,
        last_error: &str,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        repo.update_retry(queue_id, retry_count, last_attempt_at, last_error)
    }

    /// Count pending entries
    pub async fn count(&self) -> Result<u64> {
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        repo.count()
    }

    /// Delete all entries
    pub async fn clear(&self) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        repo.clear()
    }

    /// Drop the queue table entirely.
    ///
    /// Test-only hook for simulating a queue whose storage has failed after
    /// the service opened successfully.
    #[cfg(test)]
    pub(crate) async fn break_storage_for_tests(&self) {
        let db = self.db.lock().await;
        db.connection()
            .execute("DROP TABLE pending_operations", [])
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(flavor = "multi_thread")]
    async fn in_memory_append_and_count() {
        let queue = SyncQueue::open_in_memory().unwrap();

        queue
            .append(OperationType::Create, &json!({"id": "a"}), "user-1")
            .await
            .unwrap();
        assert_eq!(queue.count().await.unwrap(), 1);

        queue.clear().await.unwrap();
        assert_eq!(queue.count().await.unwrap(), 0);
    }
}
