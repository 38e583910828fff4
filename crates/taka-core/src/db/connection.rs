//! Database connection management
//!
//! The local store and the operation queue are independent durable stores:
//! each opens its own SQLite file with its own schema, so a crash between a
//! store write and a queue append can never corrupt either.

use std::path::Path;

use rusqlite::Connection;

use crate::error::{Error, Result};

use super::migrations;

/// Which schema a database file carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// Local store of transactions (source of truth for the UI)
    Store,
    /// Durable queue of pending sync operations
    Queue,
}

impl SchemaKind {
    /// Table that must exist once the database is open and migrated
    #[must_use]
    pub const fn expected_table(self) -> &'static str {
        match self {
            Self::Store => "transactions",
            Self::Queue => "pending_operations",
        }
    }
}

/// Wrapper around a SQLite connection with a verified schema
pub struct Database {
    conn: Connection,
    kind: SchemaKind,
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist.
    ///
    /// Runs migrations, then verifies the expected table is present; a
    /// missing table after open surfaces as [`Error::StoreNotFound`].
    pub fn open(path: impl AsRef<Path>, kind: SchemaKind) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref())
            .map_err(|error| Error::StorageUnavailable(error.to_string()))?;

        Self::prepare(conn, kind)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory(kind: SchemaKind) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|error| Error::StorageUnavailable(error.to_string()))?;

        Self::prepare(conn, kind)
    }

    fn prepare(conn: Connection, kind: SchemaKind) -> Result<Self> {
        let database = Self { conn, kind };
        database.configure()?;
        database.migrate()?;
        database.verify_schema()?;
        Ok(database)
    }

    /// Configure SQLite for durability and concurrency
    fn configure(&self) -> Result<()> {
        // WAL is unsupported for in-memory databases; ignore that failure
        self.conn.pragma_update(None, "journal_mode", "WAL").ok();
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    /// Run database migrations for this schema kind
    fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn, self.kind)
    }

    fn verify_schema(&self) -> Result<()> {
        let table = self.kind.expected_table();
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
            [table],
            |row| row.get(0),
        )?;

        if exists {
            Ok(())
        } else {
            Err(Error::StoreNotFound(table.to_string()))
        }
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Schema kind this database was opened with
    pub const fn kind(&self) -> SchemaKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_in_memory_both_kinds() {
        let store = Database::open_in_memory(SchemaKind::Store).unwrap();
        assert_eq!(store.kind(), SchemaKind::Store);

        let queue = Database::open_in_memory(SchemaKind::Queue).unwrap();
        assert_eq!(queue.kind(), SchemaKind::Queue);
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested/dir/taka.db");

        let db = Database::open(&path, SchemaKind::Store).unwrap();
        drop(db);
        assert!(path.exists());
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("taka.db");

        drop(Database::open(&path, SchemaKind::Queue).unwrap());
        Database::open(&path, SchemaKind::Queue).unwrap();
    }
}
