//! Remote document store client
//!
//! The remote side of sync is a plain document store exposing exactly two
//! primitives: read one document by key, replace one document by key. One
//! document exists per user identity, mapping record ids to records.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::RemoteConfig;
use crate::error::{Error, Result};

/// Longest response-body excerpt carried into an error message
const BODY_PREVIEW_CHARS: usize = 180;

fn body_preview(body: &str) -> String {
    body.trim().chars().take(BODY_PREVIEW_CHARS).collect()
}

/// A remote document: record id mapped to record-shaped JSON
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Capability set of the remote document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one document; `None` when absent
    async fn get_document(&self, collection: &str, key: &str) -> Result<Option<Document>>;

    /// Replace one document in full (no partial update primitive exists)
    async fn put_document(&self, collection: &str, key: &str, document: &Document) -> Result<()>;
}

/// HTTP-backed document store.
///
/// Documents live at `{base_url}/{collection}/{key}`; a GET returning 404
/// means the document is absent.
#[derive(Clone)]
pub struct HttpDocumentStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDocumentStore {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url().to_string(),
            client: reqwest::Client::builder().build()?,
        })
    }

    fn document_url(&self, collection: &str, key: &str) -> String {
        format!("{}/{collection}/{key}", self.base_url)
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn get_document(&self, collection: &str, key: &str) -> Result<Option<Document>> {
        let response = self
            .client
            .get(self.document_url(collection, key))
            .header("Accept", "application/json")
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RemoteUnreachable(format!(
                "GET returned HTTP {status}: {}",
                body_preview(&body)
            )));
        }

        let document = response.json::<Document>().await?;
        Ok(Some(document))
    }

    async fn put_document(&self, collection: &str, key: &str, document: &Document) -> Result<()> {
        let response = self
            .client
            .put(self.document_url(collection, key))
            .json(document)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RemoteUnreachable(format!(
                "PUT returned HTTP {status}: {}",
                body_preview(&body)
            )));
        }

        Ok(())
    }
}

/// In-memory document store for tests and offline demos
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<HashMap<(String, String), Document>>,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_document(&self, collection: &str, key: &str) -> Result<Option<Document>> {
        let documents = self.documents.lock().await;
        Ok(documents
            .get(&(collection.to_string(), key.to_string()))
            .cloned())
    }

    async fn put_document(&self, collection: &str, key: &str, document: &Document) -> Result<()> {
        let mut documents = self.documents.lock().await;
        documents.insert((collection.to_string(), key.to_string()), document.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(flavor = "multi_thread")]
    async fn memory_store_round_trip() {
        let store = MemoryDocumentStore::new();
        assert!(store.get_document("ledgers", "u1").await.unwrap().is_none());

        let mut document = Document::new();
        document.insert("a".to_string(), json!({"id": "a"}));
        store.put_document("ledgers", "u1", &document).await.unwrap();

        let fetched = store.get_document("ledgers", "u1").await.unwrap().unwrap();
        assert_eq!(fetched, document);
    }

    #[test]
    fn http_store_builds_document_urls() {
        let config = RemoteConfig::new("https://api.example.com/", "ledgers").unwrap();
        let store = HttpDocumentStore::new(&config).unwrap();
        assert_eq!(
            store.document_url("ledgers", "user-1"),
            "https://api.example.com/ledgers/user-1"
        );
    }
}
