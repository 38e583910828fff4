//! Operation queue repository implementation

use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{OperationType, QueueEntry};

/// Trait for durable pending-operation storage
pub trait QueueRepository {
    /// Durably append a new entry; returns its auto-assigned queue id
    fn append(
        &self,
        operation_type: OperationType,
        payload: &serde_json::Value,
        owner_id: &str,
    ) -> Result<i64>;

    /// Get an entry by queue id
    fn get(&self, queue_id: i64) -> Result<Option<QueueEntry>>;

    /// List all entries in enqueue order
    fn list_all(&self) -> Result<Vec<QueueEntry>>;

    /// List entries eligible for a sync attempt at `now`, in enqueue order.
    ///
    /// Excludes entries still inside their backoff window and entries that
    /// have exhausted the retry budget.
    fn list_retryable(&self, now: i64) -> Result<Vec<QueueEntry>>;

    /// Remove an entry; removing an absent id is not an error
    fn remove(&self, queue_id: i64) -> Result<()>;

    /// Merge retry bookkeeping into an existing entry.
    ///
    /// Fails with [`Error::NotFound`] when the entry vanished (e.g. raced
    /// with a concurrent remove).
    fn update_retry(
        &self,
        queue_id: i64,
        retry_count: u32,
        last_attempt_at: i64,
        last_error: &str,
    ) -> Result<()>;

    /// Count pending entries
    fn count(&self) -> Result<u64>;

    /// Delete all entries
    fn clear(&self) -> Result<()>;
}

/// `SQLite` implementation of `QueueRepository`
pub struct SqliteQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a queue entry from a database row
    fn parse_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueEntry> {
        let operation_type: String = row.get(1)?;
        let payload: String = row.get(2)?;
        Ok(QueueEntry {
            queue_id: row.get(0)?,
            operation_type: operation_type.parse().unwrap_or(OperationType::Update),
            payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
            owner_id: row.get(3)?,
            enqueued_at: row.get(4)?,
            retry_count: row.get(5)?,
            last_attempt_at: row.get(6)?,
            last_error: row.get(7)?,
        })
    }
}

impl QueueRepository for SqliteQueueRepository<'_> {
    fn append(
        &self,
        operation_type: OperationType,
        payload: &serde_json::Value,
        owner_id: &str,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO pending_operations
                 (operation_type, payload, owner_id, enqueued_at, retry_count, last_attempt_at, last_error)
             VALUES (?, ?, ?, ?, 0, NULL, NULL)",
            params![
                operation_type.as_str(),
                serde_json::to_string(payload)?,
                owner_id,
                crate::util::epoch_millis_now(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get(&self, queue_id: i64) -> Result<Option<QueueEntry>> {
        let result = self.conn.query_row(
            "SELECT queue_id, operation_type, payload, owner_id, enqueued_at, retry_count, last_attempt_at, last_error
             FROM pending_operations WHERE queue_id = ?",
            params![queue_id],
            Self::parse_entry,
        );

        match result {
            Ok(entry) => Ok(Some(entry)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_all(&self) -> Result<Vec<QueueEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT queue_id, operation_type, payload, owner_id, enqueued_at, retry_count, last_attempt_at, last_error
             FROM pending_operations
             ORDER BY queue_id ASC",
        )?;

        let entries = stmt
            .query_map([], Self::parse_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entries)
    }

    fn list_retryable(&self, now: i64) -> Result<Vec<QueueEntry>> {
        // Backoff is per-entry exponential, so the filter runs in Rust over
        // the ordered scan rather than in SQL.
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|entry| entry.is_retryable(now))
            .collect())
    }

    fn remove(&self, queue_id: i64) -> Result<()> {
        self.conn.execute(
            "DELETE FROM pending_operations WHERE queue_id = ?",
            params![queue_id],
        )?;
        Ok(())
    }

    fn update_retry(
        &self,
        queue_id: i64,
        retry_count: u32,
        last_attempt_at: i64,
        last_error: &str,
    ) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE pending_operations
             SET retry_count = ?, last_attempt_at = ?, last_error = ?
             WHERE queue_id = ?",
            params![retry_count, last_attempt_at, last_error, queue_id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("queue entry {queue_id}")));
        }

        Ok(())
    }

    fn count(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pending_operations",
            [],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM pending_operations", [])?;
        Ok(())
    }
}
