//! Remote reconciliation: applying one queued operation to a document
//!
//! Conflict policy is last-write-wins at whole-record granularity, keyed by
//! client wall-clock timestamps (`updatedAt`, falling back to `createdAt`).
//! This matches the single-remote-replica model exactly; no vector clocks or
//! server-assigned sequence numbers are involved, so skewed device clocks
//! can resolve opposite to real-time order.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{OperationType, QueueEntry};
use crate::remote::Document;

/// How an operation landed in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The payload was written into the document
    Applied,
    /// The existing record was newer; the document is unchanged
    RemoteWins,
    /// The record was removed (or was already absent)
    Removed,
}

/// Apply one queue entry to the (possibly empty) remote document.
///
/// Mutates `document` in place; the caller writes the whole document back.
pub fn apply_operation(
    document: &mut Document,
    entry: &QueueEntry,
    now: i64,
) -> Result<MergeOutcome> {
    match entry.operation_type {
        OperationType::Create => merge_create(document, &entry.payload),
        OperationType::Update => merge_update(document, &entry.payload, now),
        OperationType::Delete => merge_delete(document, &entry.payload),
    }
}

/// CREATE: unconditionally set the record, overwriting any existing key
fn merge_create(document: &mut Document, payload: &Value) -> Result<MergeOutcome> {
    let id = payload_id(payload)?;
    document.insert(id, payload.clone());
    Ok(MergeOutcome::Applied)
}

/// UPDATE: create when absent; otherwise last-write-wins by timestamp.
///
/// A local win rewrites the record with `updatedAt = now`; a remote win
/// leaves the document untouched and the losing local edit is dropped
/// without requeueing.
fn merge_update(document: &mut Document, payload: &Value, now: i64) -> Result<MergeOutcome> {
    let id = payload_id(payload)?;

    let Some(existing) = document.get(&id) else {
        return merge_create(document, payload);
    };

    let local_timestamp = record_timestamp(payload);
    let remote_timestamp = record_timestamp(existing);

    // A record missing both timestamps forfeits the comparison
    let local_wins = matches!(
        (local_timestamp, remote_timestamp),
        (Some(local), Some(remote)) if local >= remote
    );

    if local_wins {
        let mut record = payload.clone();
        if let Some(fields) = record.as_object_mut() {
            fields.insert("updatedAt".to_string(), Value::from(now));
        }
        document.insert(id, record);
        Ok(MergeOutcome::Applied)
    } else {
        tracing::warn!(
            record_id = %id,
            ?local_timestamp,
            ?remote_timestamp,
            "Update conflict: remote record is newer, keeping remote version"
        );
        Ok(MergeOutcome::RemoteWins)
    }
}

/// DELETE: remove the key; an absent key is a no-op, not an error
fn merge_delete(document: &mut Document, payload: &Value) -> Result<MergeOutcome> {
    let id = payload_id(payload)?;
    document.remove(&id);
    Ok(MergeOutcome::Removed)
}

fn payload_id(payload: &Value) -> Result<String> {
    payload
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| Error::ValidationRejected("operation payload is missing an id".to_string()))
}

/// LWW timestamp of a record: `updatedAt`, else `createdAt`; `None` when
/// the record carries neither
fn record_timestamp(record: &Value) -> Option<i64> {
    record
        .get("updatedAt")
        .and_then(Value::as_i64)
        .or_else(|| record.get("createdAt").and_then(Value::as_i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(operation_type: OperationType, payload: Value) -> QueueEntry {
        QueueEntry {
            queue_id: 1,
            operation_type,
            payload,
            owner_id: "user-1".to_string(),
            enqueued_at: 0,
            retry_count: 0,
            last_attempt_at: None,
            last_error: None,
        }
    }

    #[test]
    fn create_overwrites_existing_key() {
        let mut document = Document::new();
        document.insert("x".to_string(), json!({"id": "x", "title": "old"}));

        let outcome = apply_operation(
            &mut document,
            &entry(OperationType::Create, json!({"id": "x", "title": "new", "createdAt": 5})),
            1000,
        )
        .unwrap();

        assert_eq!(outcome, MergeOutcome::Applied);
        assert_eq!(document["x"]["title"], "new");
    }

    #[test]
    fn update_of_absent_record_behaves_as_create() {
        let mut document = Document::new();

        let outcome = apply_operation(
            &mut document,
            &entry(OperationType::Update, json!({"id": "x", "title": "fresh", "createdAt": 5})),
            1000,
        )
        .unwrap();

        assert_eq!(outcome, MergeOutcome::Applied);
        assert_eq!(document["x"]["title"], "fresh");
        // Straight create path does not stamp updatedAt
        assert!(document["x"].get("updatedAt").is_none());
    }

    #[test]
    fn newer_local_update_wins_and_stamps_updated_at() {
        let mut document = Document::new();
        document.insert("x".to_string(), json!({"id": "x", "title": "remote", "updatedAt": 100}));

        let outcome = apply_operation(
            &mut document,
            &entry(OperationType::Update, json!({"id": "x", "title": "local", "updatedAt": 200})),
            5000,
        )
        .unwrap();

        assert_eq!(outcome, MergeOutcome::Applied);
        assert_eq!(document["x"]["title"], "local");
        assert_eq!(document["x"]["updatedAt"], 5000);
    }

    #[test]
    fn equal_timestamps_resolve_local() {
        let mut document = Document::new();
        document.insert("x".to_string(), json!({"id": "x", "title": "remote", "updatedAt": 100}));

        let outcome = apply_operation(
            &mut document,
            &entry(OperationType::Update, json!({"id": "x", "title": "local", "updatedAt": 100})),
            5000,
        )
        .unwrap();

        assert_eq!(outcome, MergeOutcome::Applied);
        assert_eq!(document["x"]["title"], "local");
    }

    #[test]
    fn older_local_update_leaves_document_unchanged() {
        let mut document = Document::new();
        let remote = json!({"id": "x", "title": "remote", "updatedAt": 100});
        document.insert("x".to_string(), remote.clone());

        let outcome = apply_operation(
            &mut document,
            &entry(OperationType::Update, json!({"id": "x", "title": "stale", "updatedAt": 50})),
            5000,
        )
        .unwrap();

        assert_eq!(outcome, MergeOutcome::RemoteWins);
        assert_eq!(document["x"], remote);
    }

    #[test]
    fn update_falls_back_to_created_at() {
        let mut document = Document::new();
        document.insert("x".to_string(), json!({"id": "x", "title": "remote", "createdAt": 100}));

        let outcome = apply_operation(
            &mut document,
            &entry(OperationType::Update, json!({"id": "x", "title": "local", "createdAt": 150})),
            5000,
        )
        .unwrap();

        assert_eq!(outcome, MergeOutcome::Applied);
    }

    #[test]
    fn update_without_any_timestamps_keeps_remote() {
        let mut document = Document::new();
        let remote = json!({"id": "x", "title": "remote"});
        document.insert("x".to_string(), remote.clone());

        let outcome = apply_operation(
            &mut document,
            &entry(OperationType::Update, json!({"id": "x", "title": "local"})),
            5000,
        )
        .unwrap();

        assert_eq!(outcome, MergeOutcome::RemoteWins);
        assert_eq!(document["x"], remote);
    }

    #[test]
    fn delete_of_absent_key_is_a_noop() {
        let mut document = Document::new();

        let outcome =
            apply_operation(&mut document, &entry(OperationType::Delete, json!({"id": "x"})), 0)
                .unwrap();

        assert_eq!(outcome, MergeOutcome::Removed);
        assert!(document.is_empty());
    }

    #[test]
    fn delete_removes_only_its_key() {
        let mut document = Document::new();
        document.insert("x".to_string(), json!({"id": "x"}));
        document.insert("y".to_string(), json!({"id": "y"}));

        apply_operation(&mut document, &entry(OperationType::Delete, json!({"id": "x"})), 0)
            .unwrap();

        assert!(!document.contains_key("x"));
        assert!(document.contains_key("y"));
    }

    #[test]
    fn missing_payload_id_is_rejected() {
        let mut document = Document::new();
        let error =
            apply_operation(&mut document, &entry(OperationType::Create, json!({"title": "no id"})), 0)
                .unwrap_err();
        assert!(matches!(error, Error::ValidationRejected(_)));
    }
}
