//! Database layer for Taka

mod connection;
mod migrations;
mod queue_repository;
mod transaction_repository;

pub use connection::{Database, SchemaKind};
pub use queue_repository::{QueueRepository, SqliteQueueRepository};
pub use transaction_repository::{SqliteTransactionRepository, TransactionRepository};
