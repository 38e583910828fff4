//! Binds the sync engine's lifecycle to auth and connectivity signals

use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::error::Result;
use crate::sync::engine::{SyncEngine, SyncOutcome};
use crate::sync::events::{CompletionStatus, SyncEvent};

/// Coarse lifecycle state shown to the UI/CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Success,
    Error,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Success => "success",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Point-in-time view of the sync subsystem, published on a watch channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: SyncStatus,
    /// Operations still waiting in the queue
    pub pending: u64,
    /// Completion time of the last finished cycle (Unix ms)
    pub last_sync_time: Option<i64>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            status: SyncStatus::Idle,
            pending: 0,
            last_sync_time: None,
        }
    }
}

/// Reacts to auth and connectivity changes:
///
/// - a user signing in arms periodic auto-sync; signing out disarms it
/// - an offline-to-online edge triggers an opportunistic cycle
/// - engine events are folded into a [`StatusSnapshot`] watch channel
///
/// Construct with [`SyncController::new`], then call [`run`](Self::run) to
/// move it onto a background task.
pub struct SyncController {
    engine: SyncEngine,
    user: watch::Receiver<Option<String>>,
    online: watch::Receiver<bool>,
    status: watch::Sender<StatusSnapshot>,
    auto_sync_interval: Duration,
}

/// Owns the controller's background task; dropping it stops the task.
///
/// The stop is cooperative: a sync cycle already running finishes before
/// the task exits.
pub struct ControllerHandle {
    engine: SyncEngine,
    status: watch::Receiver<StatusSnapshot>,
    shutdown: watch::Sender<bool>,
}

impl ControllerHandle {
    /// Watch channel carrying the latest [`StatusSnapshot`]
    #[must_use]
    pub fn status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    /// Run one cycle now, regardless of the auto-sync timer
    pub async fn trigger_sync(&self) -> SyncOutcome {
        self.engine.sync().await
    }

    /// Drop all pending operations
    pub async fn clear_queue(&self) -> Result<()> {
        self.engine.clear_queue().await
    }

    /// Stop the background task and the auto-sync timer.
    ///
    /// Only future cycles are prevented; an in-flight cycle finishes.
    pub fn shutdown(&self) {
        self.engine.stop_auto_sync();
        let _ = self.shutdown.send(true);
    }
}

impl Drop for ControllerHandle {
    fn drop(&mut self) {
        self.engine.stop_auto_sync();
        let _ = self.shutdown.send(true);
    }
}

impl SyncController {
    pub const DEFAULT_AUTO_SYNC_INTERVAL: Duration = Duration::from_secs(30);

    pub fn new(
        engine: SyncEngine,
        user: watch::Receiver<Option<String>>,
        online: watch::Receiver<bool>,
    ) -> Self {
        let (status, _) = watch::channel(StatusSnapshot::default());
        Self {
            engine,
            user,
            online,
            status,
            auto_sync_interval: Self::DEFAULT_AUTO_SYNC_INTERVAL,
        }
    }

    /// Override the auto-sync period (mostly for tests)
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.auto_sync_interval = interval;
        self
    }

    /// Consume the controller into a background task
    #[must_use]
    pub fn run(self) -> ControllerHandle {
        let engine = self.engine.clone();
        let status = self.status.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(self.event_loop(shutdown_rx));
        ControllerHandle {
            engine,
            status,
            shutdown: shutdown_tx,
        }
    }

    async fn event_loop(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut events = self.engine.subscribe();

        if self.user.borrow().is_some() {
            tracing::info!("User already signed in, starting auto-sync");
            self.engine.start_auto_sync(self.auto_sync_interval);
        }

        loop {
            tokio::select! {
                // Fires on signal or on the handle being dropped; any await
                // already in progress in another arm has completed by then
                _ = shutdown.changed() => break,
                changed = self.user.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let authenticated = self.user.borrow_and_update().is_some();
                    if authenticated {
                        tracing::info!("User signed in, starting auto-sync");
                        self.engine.start_auto_sync(self.auto_sync_interval);
                    } else {
                        tracing::info!("User signed out, stopping auto-sync");
                        self.engine.stop_auto_sync();
                    }
                }
                changed = self.online.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *self.online.borrow_and_update();
                    if online && self.user.borrow().is_some() {
                        tracing::info!("Connection restored, triggering sync");
                        self.engine.sync().await;
                    }
                }
                event = events.recv() => {
                    match event {
                        Ok(event) => self.apply_event(&event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Missed sync events, refreshing status");
                            let pending = self.pending_count().await;
                            self.status.send_modify(|snapshot| snapshot.pending = pending);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }

        self.engine.stop_auto_sync();
    }

    async fn apply_event(&self, event: &SyncEvent) {
        match event {
            SyncEvent::Started { .. } => {
                self.status
                    .send_modify(|snapshot| snapshot.status = SyncStatus::Syncing);
            }
            SyncEvent::Progress { .. } => {}
            SyncEvent::Completed {
                status, timestamp, ..
            } => {
                let pending = self.pending_count().await;
                let status = match status {
                    CompletionStatus::Success => SyncStatus::Success,
                    CompletionStatus::Partial => SyncStatus::Error,
                };
                self.status.send_replace(StatusSnapshot {
                    status,
                    pending,
                    last_sync_time: Some(*timestamp),
                });
            }
            SyncEvent::Failed { .. } => {
                let pending = self.pending_count().await;
                self.status.send_modify(|snapshot| {
                    snapshot.status = SyncStatus::Error;
                    snapshot.pending = pending;
                });
            }
            SyncEvent::Skipped { .. } => {
                self.status
                    .send_modify(|snapshot| snapshot.status = SyncStatus::Idle);
            }
            SyncEvent::QueueCleared { .. } => {
                self.status.send_modify(|snapshot| snapshot.pending = 0);
            }
        }
    }

    async fn pending_count(&self) -> u64 {
        match self.engine.stats().await {
            Ok(stats) => stats.pending,
            Err(error) => {
                tracing::warn!(%error, "Failed to refresh pending count");
                self.status.borrow().pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OperationType;
    use crate::remote::MemoryDocumentStore;
    use crate::services::SyncQueue;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::time::timeout;

    fn fixture(
        online: bool,
    ) -> (
        SyncQueue,
        SyncEngine,
        watch::Sender<Option<String>>,
        watch::Sender<bool>,
    ) {
        let queue = SyncQueue::open_in_memory().unwrap();
        let (online_tx, online_rx) = watch::channel(online);
        let engine = SyncEngine::new(
            queue.clone(),
            Arc::new(MemoryDocumentStore::new()),
            "ledgers",
            online_rx,
        );
        let (user_tx, _) = watch::channel(None);
        (queue, engine, user_tx, online_tx)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn manual_sync_updates_status_snapshot() {
        let (queue, engine, user_tx, online_tx) = fixture(true);
        queue
            .append(OperationType::Create, &json!({"id": "a"}), "u")
            .await
            .unwrap();

        let controller =
            SyncController::new(engine, user_tx.subscribe(), online_tx.subscribe());
        let handle = controller.run();
        let mut status = handle.status();

        handle.trigger_sync().await;

        let snapshot = timeout(
            Duration::from_secs(2),
            status.wait_for(|snapshot| snapshot.status == SyncStatus::Success),
        )
        .await
        .expect("status never reached success")
        .expect("status channel closed")
        .clone();
        assert_eq!(snapshot.pending, 0);
        assert!(snapshot.last_sync_time.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn coming_online_triggers_sync_for_signed_in_user() {
        let (queue, engine, user_tx, online_tx) = fixture(false);
        queue
            .append(OperationType::Create, &json!({"id": "a"}), "u")
            .await
            .unwrap();

        let controller =
            SyncController::new(engine, user_tx.subscribe(), online_tx.subscribe())
                .with_interval(Duration::from_secs(3600));
        let handle = controller.run();
        let mut status = handle.status();

        user_tx.send(Some("u".to_string())).unwrap();
        online_tx.send(true).unwrap();

        timeout(
            Duration::from_secs(2),
            status.wait_for(|snapshot| snapshot.pending == 0 && snapshot.status == SyncStatus::Success),
        )
        .await
        .expect("sync never drained the queue")
        .expect("status channel closed");
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clearing_queue_resets_pending_count() {
        let (queue, engine, user_tx, online_tx) = fixture(true);
        queue
            .append(OperationType::Create, &json!({"id": "a"}), "u")
            .await
            .unwrap();

        let controller =
            SyncController::new(engine, user_tx.subscribe(), online_tx.subscribe());
        let handle = controller.run();
        let mut status = handle.status();

        handle.clear_queue().await.unwrap();

        timeout(
            Duration::from_secs(2),
            status.wait_for(|snapshot| snapshot.pending == 0),
        )
        .await
        .expect("clearance never reflected in status")
        .expect("status channel closed");
        assert_eq!(queue.count().await.unwrap(), 0);
    }
}
