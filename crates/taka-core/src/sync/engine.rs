//! Sync engine: drains the operation queue against the remote store

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;

use crate::error::Error;
use crate::models::{OperationType, QueueEntry};
use crate::remote::DocumentStore;
use crate::services::SyncQueue;
use crate::sync::events::{CompletionStatus, SyncEvent};
use crate::sync::reconcile;
use crate::util::epoch_millis_now;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Result of one `sync()` invocation
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Another cycle is running; nothing was touched
    AlreadySyncing,
    /// Connectivity is absent; nothing was touched
    Offline,
    /// No entries were eligible for retry
    NoOperations,
    /// A cycle ran to completion (possibly with per-entry failures)
    Completed(SyncReport),
    /// The cycle aborted before processing entries
    Error(String),
}

/// Per-cycle accounting of processed entries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Queue ids confirmed applied remotely and removed
    pub succeeded: Vec<i64>,
    /// Entries left in the queue for a later retry
    pub failed: Vec<FailedEntry>,
}

/// A queue entry that failed during one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct FailedEntry {
    pub queue_id: i64,
    pub error: String,
}

/// Read-only diagnostic snapshot of the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub pending: u64,
    pub by_type: OperationCounts,
    pub retries: RetryStats,
}

/// Pending entries broken down by operation type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationCounts {
    pub create: u64,
    pub update: u64,
    pub delete: u64,
}

/// Aggregate over entries that have failed at least once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryStats {
    /// Entries with `retry_count > 0`
    pub total: u64,
    /// Highest `retry_count` observed
    pub max_retries: u32,
}

/// Clears the in-progress flag when the cycle ends, on every path out
struct InProgressGuard {
    flag: Arc<AtomicBool>,
}

impl InProgressGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
            .then(|| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Orchestrates queue draining: mutual exclusion, retry bookkeeping,
/// conflict resolution, and status broadcasting.
///
/// Construct one per process (or one per test); clones share all state.
#[derive(Clone)]
pub struct SyncEngine {
    queue: SyncQueue,
    remote: Arc<dyn DocumentStore>,
    collection: String,
    online: watch::Receiver<bool>,
    events: broadcast::Sender<SyncEvent>,
    syncing: Arc<AtomicBool>,
    auto_sync: Arc<StdMutex<Option<watch::Sender<bool>>>>,
}

impl SyncEngine {
    pub fn new(
        queue: SyncQueue,
        remote: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
        online: watch::Receiver<bool>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            queue,
            remote,
            collection: collection.into(),
            online,
            events,
            syncing: Arc::new(AtomicBool::new(false)),
            auto_sync: Arc::new(StdMutex::new(None)),
        }
    }

    /// Subscribe to sync status events; dropping the receiver unsubscribes
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Whether a cycle is currently running
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    /// Run one sync cycle.
    ///
    /// At most one cycle runs at a time: the in-progress flag is taken with
    /// a compare-exchange before the first suspension point and released by
    /// a drop guard, so an erroring cycle can never wedge the engine. A
    /// failed entry gets retry bookkeeping and never aborts the cycle.
    pub async fn sync(&self) -> SyncOutcome {
        let Some(_guard) = InProgressGuard::acquire(&self.syncing) else {
            tracing::debug!("Sync already in progress");
            return SyncOutcome::AlreadySyncing;
        };

        if !*self.online.borrow() {
            tracing::debug!("Offline, skipping sync");
            self.emit(SyncEvent::Skipped {
                reason: "offline".to_string(),
            });
            return SyncOutcome::Offline;
        }

        self.emit(SyncEvent::Started {
            timestamp: epoch_millis_now(),
        });

        let entries = match self.queue.list_retryable(epoch_millis_now()).await {
            Ok(entries) => entries,
            Err(error) => {
                tracing::error!(%error, "Failed to read operation queue");
                self.emit(SyncEvent::Failed {
                    error: error.to_string(),
                });
                return SyncOutcome::Error(error.to_string());
            }
        };

        if entries.is_empty() {
            self.emit(SyncEvent::Completed {
                status: CompletionStatus::Success,
                synced: 0,
                failed: 0,
                timestamp: epoch_millis_now(),
            });
            return SyncOutcome::NoOperations;
        }

        tracing::info!(count = entries.len(), "Syncing pending operations");
        let total = entries.len();
        self.emit(SyncEvent::Progress { total, current: 0 });

        let mut report = SyncReport::default();

        // Strictly sequential: entries may target overlapping record ids,
        // and out-of-order application would corrupt the LWW comparison.
        for (index, entry) in entries.iter().enumerate() {
            match self.process_entry(entry).await {
                Ok(()) => {
                    if let Err(error) = self.queue.remove(entry.queue_id).await {
                        tracing::warn!(
                            queue_id = entry.queue_id,
                            %error,
                            "Failed to remove synced entry from queue"
                        );
                    }
                    report.succeeded.push(entry.queue_id);
                }
                Err(error) => {
                    tracing::error!(queue_id = entry.queue_id, %error, "Sync operation failed");
                    report.failed.push(FailedEntry {
                        queue_id: entry.queue_id,
                        error: error.to_string(),
                    });
                    self.record_failure(entry, &error).await;
                }
            }

            self.emit(SyncEvent::Progress {
                total,
                current: index + 1,
            });
        }

        let status = if report.failed.is_empty() {
            CompletionStatus::Success
        } else {
            CompletionStatus::Partial
        };
        self.emit(SyncEvent::Completed {
            status,
            synced: report.succeeded.len(),
            failed: report.failed.len(),
            timestamp: epoch_millis_now(),
        });

        SyncOutcome::Completed(report)
    }

    /// Apply one entry to the owner's remote document (read-modify-write)
    async fn process_entry(&self, entry: &QueueEntry) -> crate::error::Result<()> {
        if entry.owner_id.trim().is_empty() {
            return Err(Error::Unauthorized);
        }

        let mut document = self
            .remote
            .get_document(&self.collection, &entry.owner_id)
            .await?
            .unwrap_or_default();

        let outcome = reconcile::apply_operation(&mut document, entry, epoch_millis_now())?;
        tracing::debug!(queue_id = entry.queue_id, ?outcome, "Reconciled operation");

        self.remote
            .put_document(&self.collection, &entry.owner_id, &document)
            .await
    }

    /// Increment retry bookkeeping for a failed entry.
    ///
    /// The entry vanishing underneath us (raced with a remove) is benign.
    async fn record_failure(&self, entry: &QueueEntry, error: &Error) {
        let result = self
            .queue
            .update_retry(
                entry.queue_id,
                entry.retry_count + 1,
                epoch_millis_now(),
                &error.to_string(),
            )
            .await;

        match result {
            Ok(()) => {}
            Err(Error::NotFound(_)) => {
                tracing::debug!(queue_id = entry.queue_id, "Entry vanished before retry update");
            }
            Err(update_error) => {
                tracing::warn!(
                    queue_id = entry.queue_id,
                    %update_error,
                    "Failed to record retry bookkeeping"
                );
            }
        }
    }

    /// Trigger an immediate cycle, then one every `interval`.
    ///
    /// Re-arming replaces any previously scheduled timer; a cycle the
    /// replaced timer already started still runs to completion.
    pub fn start_auto_sync(&self, interval: Duration) {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop_rx.changed() => break,
                }
                // A started cycle is never cancelled mid-entry; the stop
                // signal is only honored between cycles
                engine.sync().await;
                if *stop_rx.borrow() {
                    break;
                }
            }
        });

        let mut slot = self
            .auto_sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(stop_tx) {
            let _ = previous.send(true);
        }
    }

    /// Disarm the auto-sync timer; safe to call when none is armed.
    ///
    /// Only future cycles are prevented; a cycle already running finishes.
    pub fn stop_auto_sync(&self) {
        let mut slot = self
            .auto_sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(stop) = slot.take() {
            let _ = stop.send(true);
        }
    }

    /// Diagnostic snapshot: pending count, breakdown by type, retry aggregate
    pub async fn stats(&self) -> crate::error::Result<SyncStats> {
        let pending = self.queue.count().await?;
        let entries = self.queue.list_all().await?;

        let mut by_type = OperationCounts::default();
        let mut retries = RetryStats::default();
        for entry in &entries {
            match entry.operation_type {
                OperationType::Create => by_type.create += 1,
                OperationType::Update => by_type.update += 1,
                OperationType::Delete => by_type.delete += 1,
            }
            if entry.retry_count > 0 {
                retries.total += 1;
                retries.max_retries = retries.max_retries.max(entry.retry_count);
            }
        }

        Ok(SyncStats {
            pending,
            by_type,
            retries,
        })
    }

    /// Drop all pending operations and broadcast the clearance
    pub async fn clear_queue(&self) -> crate::error::Result<()> {
        self.queue.clear().await?;
        self.emit(SyncEvent::QueueCleared {
            timestamp: epoch_millis_now(),
        });
        Ok(())
    }

    fn emit(&self, event: SyncEvent) {
        // Send only fails with zero subscribers, which is fine
        let _ = self.events.send(event);
    }
}
