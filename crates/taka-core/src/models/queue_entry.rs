//! Pending operation queue entry model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum automatic retry attempts before an entry is poisoned
pub const MAX_RETRIES: u32 = 5;

/// Kind of pending mutation awaiting remote reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(format!("unknown operation type: {other}")),
        }
    }
}

/// Exponential backoff before the next retry: 1s, 2s, 4s, 8s, 16s.
///
/// The doubling saturates at 2^20 seconds so arbitrary retry counts stay
/// well inside `i64` range.
#[must_use]
pub fn backoff_millis(retry_count: u32) -> i64 {
    1000 * (1i64 << retry_count.min(20))
}

/// A durable pending mutation, owned by the operation queue.
///
/// `payload` is record-shaped JSON; a `Delete` carries only `{ "id": ... }`.
/// Retry bookkeeping fields are mutated only by the sync engine, through the
/// queue's storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Auto-assigned monotonic queue id (primary key)
    pub queue_id: i64,
    pub operation_type: OperationType,
    pub payload: serde_json::Value,
    /// Opaque user identifier the operation is scoped to
    pub owner_id: String,
    /// Enqueue timestamp (Unix ms)
    pub enqueued_at: i64,
    pub retry_count: u32,
    /// Last attempt timestamp (Unix ms), `None` until first attempt
    pub last_attempt_at: Option<i64>,
    pub last_error: Option<String>,
}

impl QueueEntry {
    /// Whether an entry has exhausted its retry budget
    #[must_use]
    pub const fn is_poisoned(&self) -> bool {
        self.retry_count >= MAX_RETRIES
    }

    /// Whether this entry is eligible for a sync attempt at `now`.
    ///
    /// Poisoned entries are excluded unconditionally; otherwise the entry
    /// must never have been attempted, or its backoff window must have
    /// elapsed.
    #[must_use]
    pub fn is_retryable(&self, now: i64) -> bool {
        if self.is_poisoned() {
            return false;
        }
        match self.last_attempt_at {
            None => true,
            Some(last_attempt) => now - last_attempt > backoff_millis(self.retry_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(retry_count: u32, last_attempt_at: Option<i64>) -> QueueEntry {
        QueueEntry {
            queue_id: 1,
            operation_type: OperationType::Create,
            payload: json!({"id": "x"}),
            owner_id: "user-1".to_string(),
            enqueued_at: 0,
            retry_count,
            last_attempt_at,
            last_error: None,
        }
    }

    #[test]
    fn test_backoff_doubles_per_retry() {
        assert_eq!(backoff_millis(0), 1000);
        assert_eq!(backoff_millis(1), 2000);
        assert_eq!(backoff_millis(2), 4000);
        assert_eq!(backoff_millis(3), 8000);
        assert_eq!(backoff_millis(4), 16000);
    }

    #[test]
    fn test_backoff_saturates_for_huge_retry_counts() {
        assert_eq!(backoff_millis(20), backoff_millis(21));
        assert_eq!(backoff_millis(u32::MAX), 1000 * (1i64 << 20));
    }

    #[test]
    fn test_never_attempted_is_retryable() {
        assert!(entry(0, None).is_retryable(0));
    }

    #[test]
    fn test_backoff_window_excludes_until_elapsed() {
        let e = entry(2, Some(10_000));
        // 4s backoff at retry_count 2
        assert!(!e.is_retryable(10_000 + 4000));
        assert!(e.is_retryable(10_000 + 4001));
    }

    #[test]
    fn test_poisoned_excluded_unconditionally() {
        let e = entry(MAX_RETRIES, Some(0));
        assert!(e.is_poisoned());
        assert!(!e.is_retryable(i64::MAX));
    }

    #[test]
    fn test_operation_type_round_trip() {
        for op in [OperationType::Create, OperationType::Update, OperationType::Delete] {
            assert_eq!(op.as_str().parse::<OperationType>().unwrap(), op);
        }
        assert!("MERGE".parse::<OperationType>().is_err());
    }
}
