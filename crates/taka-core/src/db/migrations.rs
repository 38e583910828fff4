//! Database migrations
//!
//! Each schema kind versions independently through its own `schema_version`
//! table, since the store and the queue live in separate database files.

use rusqlite::Connection;

use crate::error::Result;

use super::connection::SchemaKind;

/// Current store schema version
const STORE_VERSION: i32 = 2;
/// Current queue schema version
const QUEUE_VERSION: i32 = 1;

/// Run all pending migrations for the given schema kind
pub fn run(conn: &Connection, kind: SchemaKind) -> Result<()> {
    let version = get_version(conn)?;

    match kind {
        SchemaKind::Store => {
            if version < 1 {
                migrate_store_v1(conn)?;
            }
            if version < 2 {
                migrate_store_v2(conn)?;
            }
        }
        SchemaKind::Queue => {
            if version < 1 {
                migrate_queue_v1(conn)?;
            }
        }
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Store migration to version 1: transactions table
fn migrate_store_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
         CREATE TABLE IF NOT EXISTS schema_version (
             version INTEGER PRIMARY KEY
         );
         CREATE TABLE IF NOT EXISTS transactions (
             id TEXT PRIMARY KEY,
             title TEXT NOT NULL,
             amount REAL NOT NULL DEFAULT 0,
             category TEXT NOT NULL DEFAULT '',
             kind TEXT NOT NULL,
             date INTEGER NOT NULL,
             created_at INTEGER NOT NULL,
             updated_at INTEGER
         );
         CREATE INDEX IF NOT EXISTS idx_transactions_created ON transactions(created_at);
         CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date DESC);
         INSERT INTO schema_version (version) VALUES (1);
         COMMIT;",
    )?;

    tracing::info!("Migrated store database to version 1");
    Ok(())
}

/// Store migration to version 2: fold the misnamed legacy table in.
///
/// Early builds persisted records into a table called `transections`. The
/// one-shot upgrade copies any surviving rows into `transactions` and drops
/// the legacy table. Safe to re-run: the copy is conditional on the legacy
/// table existing.
fn migrate_store_v2(conn: &Connection) -> Result<()> {
    let legacy_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='transections')",
        [],
        |row| row.get(0),
    )?;

    if legacy_exists {
        conn.execute_batch(
            "BEGIN;
             INSERT OR IGNORE INTO transactions
                 (id, title, amount, category, kind, date, created_at, updated_at)
             SELECT id, title, amount, category, kind, date, created_at, updated_at
             FROM transections;
             DROP TABLE transections;
             INSERT INTO schema_version (version) VALUES (2);
             COMMIT;",
        )?;
        tracing::info!("Migrated legacy 'transections' rows into 'transactions'");
    } else {
        conn.execute("INSERT INTO schema_version (version) VALUES (2)", [])?;
    }

    tracing::info!("Migrated store database to version {STORE_VERSION}");
    Ok(())
}

/// Queue migration to version 1: pending operations log
fn migrate_queue_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
         CREATE TABLE IF NOT EXISTS schema_version (
             version INTEGER PRIMARY KEY
         );
         CREATE TABLE IF NOT EXISTS pending_operations (
             queue_id INTEGER PRIMARY KEY AUTOINCREMENT,
             operation_type TEXT NOT NULL,
             payload TEXT NOT NULL,
             owner_id TEXT NOT NULL,
             enqueued_at INTEGER NOT NULL,
             retry_count INTEGER NOT NULL DEFAULT 0,
             last_attempt_at INTEGER,
             last_error TEXT
         );
         CREATE INDEX IF NOT EXISTS idx_pending_enqueued ON pending_operations(enqueued_at);
         CREATE INDEX IF NOT EXISTS idx_pending_type ON pending_operations(operation_type);
         CREATE INDEX IF NOT EXISTS idx_pending_retry ON pending_operations(retry_count);
         INSERT INTO schema_version (version) VALUES (1);
         COMMIT;",
    )?;

    tracing::info!("Migrated queue database to version {QUEUE_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_store_migrations() {
        let conn = setup();
        run(&conn, SchemaKind::Store).unwrap();
        assert_eq!(get_version(&conn).unwrap(), STORE_VERSION);
    }

    #[test]
    fn test_queue_migrations() {
        let conn = setup();
        run(&conn, SchemaKind::Queue).unwrap();
        assert_eq!(get_version(&conn).unwrap(), QUEUE_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = setup();
        run(&conn, SchemaKind::Store).unwrap();
        run(&conn, SchemaKind::Store).unwrap(); // Should not fail
        assert_eq!(get_version(&conn).unwrap(), STORE_VERSION);
    }

    #[test]
    fn test_legacy_table_rows_are_folded_in() {
        let conn = setup();

        // Simulate a database left behind by an early build
        conn.execute_batch(
            "CREATE TABLE transections (
                 id TEXT PRIMARY KEY,
                 title TEXT NOT NULL,
                 amount REAL NOT NULL DEFAULT 0,
                 category TEXT NOT NULL DEFAULT '',
                 kind TEXT NOT NULL,
                 date INTEGER NOT NULL,
                 created_at INTEGER NOT NULL,
                 updated_at INTEGER
             );
             INSERT INTO transections (id, title, amount, category, kind, date, created_at)
             VALUES ('legacy-1', 'Old row', 10.0, 'misc', 'expense', 100, 100);",
        )
        .unwrap();

        run(&conn, SchemaKind::Store).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM transactions WHERE id = 'legacy-1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);

        let legacy_exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE name='transections')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(!legacy_exists);
    }
}
