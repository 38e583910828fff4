//! Offline-first synchronization: queue draining, conflict resolution,
//! and lifecycle orchestration.

pub mod controller;
pub mod engine;
pub mod events;
pub mod reconcile;

pub use controller::{ControllerHandle, StatusSnapshot, SyncController, SyncStatus};
pub use engine::{
    FailedEntry, OperationCounts, RetryStats, SyncEngine, SyncOutcome, SyncReport, SyncStats,
};
pub use events::{CompletionStatus, SyncEvent};
