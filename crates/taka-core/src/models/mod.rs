//! Data models for Taka

mod queue_entry;
mod transaction;

pub use queue_entry::{backoff_millis, OperationType, QueueEntry, MAX_RETRIES};
pub use transaction::{sanitize_transactions, Transaction, TransactionId, TransactionKind};
