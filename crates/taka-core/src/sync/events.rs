//! Sync status event bus

use std::fmt;

/// Terminal status of a completed sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// Every processed entry succeeded (or there were none)
    Success,
    /// Some entries succeeded, some failed and await retry
    Partial,
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Partial => f.write_str("partial"),
        }
    }
}

/// Events broadcast by the sync engine to any number of subscribers.
///
/// Subscribers receive a `tokio::sync::broadcast` receiver from
/// [`crate::sync::SyncEngine::subscribe`]; dropping it unsubscribes.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A sync cycle began
    Started { timestamp: i64 },
    /// One entry finished processing (`current` of `total`)
    Progress { total: usize, current: usize },
    /// The cycle finished; counts cover this cycle only
    Completed {
        status: CompletionStatus,
        synced: usize,
        failed: usize,
        timestamp: i64,
    },
    /// The cycle aborted before processing entries (e.g. queue unreadable)
    Failed { error: String },
    /// The cycle was skipped without touching the queue
    Skipped { reason: String },
    /// All pending operations were cleared
    QueueCleared { timestamp: i64 },
}
