//! Ledger coordination service
//!
//! Ties the local store and the operation queue together: every local
//! mutation commits to the store first, then best-effort appends a pending
//! operation scoped to the current user. The two writes are sequential and
//! non-atomic; a crash between them leaves a committed local change that was
//! never queued, which the user resolves by retriggering the action.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::models::{sanitize_transactions, OperationType, Transaction};
use crate::remote::DocumentStore;
use crate::services::{SyncQueue, TransactionStore};
use crate::util::epoch_millis_now;

/// Local-first facade over transaction mutations.
///
/// Queue-append failures are logged and swallowed: the committed local
/// mutation is never rolled back for a queueing failure. With no user
/// identity present, mutations stay local and nothing is enqueued.
#[derive(Clone)]
pub struct LedgerService {
    store: TransactionStore,
    queue: SyncQueue,
    remote: Arc<dyn DocumentStore>,
    collection: String,
    user: watch::Receiver<Option<String>>,
}

impl LedgerService {
    pub fn new(
        store: TransactionStore,
        queue: SyncQueue,
        remote: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
        user: watch::Receiver<Option<String>>,
    ) -> Self {
        Self {
            store,
            queue,
            remote,
            collection: collection.into(),
            user,
        }
    }

    /// Opaque identifier of the currently authenticated user, if any
    #[must_use]
    pub fn current_user(&self) -> Option<String> {
        self.user.borrow().clone()
    }

    /// List all local transactions
    pub async fn list(&self) -> Result<Vec<Transaction>> {
        self.store.list().await
    }

    /// Fetch one local transaction
    pub async fn get(&self, id: &str) -> Result<Option<Transaction>> {
        self.store.get(id).await
    }

    /// Create a transaction locally, then enqueue a CREATE for sync
    pub async fn create(&self, transaction: &Transaction) -> Result<()> {
        self.store.create(transaction).await?;
        self.enqueue(OperationType::Create, serde_json::to_value(transaction)?)
            .await;
        Ok(())
    }

    /// Update a transaction locally (stamping `updated_at`), then enqueue
    /// an UPDATE for sync. Returns the stored record.
    pub async fn update(&self, transaction: &Transaction) -> Result<Transaction> {
        let mut transaction = transaction.clone();
        transaction.updated_at = Some(epoch_millis_now());

        self.store.update(&transaction).await?;
        self.enqueue(OperationType::Update, serde_json::to_value(&transaction)?)
            .await;
        Ok(transaction)
    }

    /// Delete a transaction locally, then enqueue a DELETE for sync
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(id).await?;
        self.enqueue(OperationType::Delete, serde_json::json!({ "id": id }))
            .await;
        Ok(())
    }

    /// Delete several transactions, enqueueing one DELETE per id
    pub async fn delete_many(&self, ids: &[String]) -> Result<()> {
        for id in ids {
            self.delete(id).await?;
        }
        Ok(())
    }

    /// Import the user's remote document into the local store.
    ///
    /// Records already present locally and records failing required-field
    /// validation are dropped. Imported rows are considered already
    /// reconciled with the remote source, so nothing is enqueued.
    pub async fn import(&self) -> Result<usize> {
        let user = self.current_user().ok_or(Error::Unauthorized)?;

        let Some(document) = self.remote.get_document(&self.collection, &user).await? else {
            return Ok(0);
        };

        let existing: HashSet<String> = self
            .store
            .list()
            .await?
            .into_iter()
            .map(|t| t.id.to_string())
            .collect();

        let imported: Vec<Transaction> = document
            .values()
            .filter_map(Transaction::from_value)
            .filter(|t| !existing.contains(t.id.as_str()))
            .collect();

        if imported.is_empty() {
            return Ok(0);
        }

        self.store.insert_many(&imported).await?;
        tracing::info!(count = imported.len(), "Imported transactions from remote");
        Ok(imported.len())
    }

    /// Export the sanitized local table as the user's remote document.
    ///
    /// Returns the number of records exported.
    pub async fn export(&self) -> Result<usize> {
        let user = self.current_user().ok_or(Error::Unauthorized)?;

        let transactions = self.store.list().await?;
        let document = sanitize_transactions(&transactions);
        let count = document.len();

        self.remote
            .put_document(&self.collection, &user, &document)
            .await?;
        tracing::info!(count, "Exported transactions to remote");
        Ok(count)
    }

    /// Delete all local transactions (no sync operations are enqueued)
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }

    /// Best-effort queue append; the local mutation already committed, so
    /// failures are logged and never propagated.
    async fn enqueue(&self, operation_type: OperationType, payload: serde_json::Value) {
        let Some(user) = self.current_user() else {
            return;
        };

        if let Err(error) = self.queue.append(operation_type, &payload, &user).await {
            tracing::warn!(%operation_type, %error, "Failed to enqueue sync operation");
        }
    }
}
