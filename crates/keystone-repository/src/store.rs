//! Document store contract and the in-memory implementation.
//!
//! The repository only needs four operations from a store: point lookup,
//! equality query (optionally scoped to one partition), upsert and delete.
//! Documents are opaque JSON values at this layer; the codec interprets
//! them.
//!
//! Stores report failures as [`StoreError`], which wraps whatever the
//! backend produced and is propagated to callers unchanged.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::RwLock;

/// Opaque failure from a document store backend.
#[derive(Debug, thiserror::Error)]
#[error("document store failure: {source}")]
pub struct StoreError {
    source: Box<dyn StdError + Send + Sync + 'static>,
}

impl StoreError {
    /// Wrap a backend error.
    pub fn new(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// The backend error.
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.source.as_ref()
    }
}

/// A schemaless key/partition document store.
///
/// `query` returns documents whose top-level fields equal every entry of
/// `predicate` (an empty predicate matches everything), in the store's
/// natural order. With `partition = None` the query spans all partitions.
pub trait DocumentStore: Send + Sync {
    /// Fetch one document.
    fn get(
        &self,
        id: &str,
        partition: &str,
    ) -> impl Future<Output = Result<Option<Value>, StoreError>> + Send;

    /// Fetch every document matching `predicate`.
    fn query(
        &self,
        predicate: &Map<String, Value>,
        partition: Option<&str>,
    ) -> impl Future<Output = Result<Vec<Value>, StoreError>> + Send;

    /// Insert or replace one document.
    fn upsert(
        &self,
        id: &str,
        partition: &str,
        document: &Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove one document. Removing a missing document is not an error.
    fn delete(&self, id: &str, partition: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl<S: DocumentStore> DocumentStore for Arc<S> {
    fn get(
        &self,
        id: &str,
        partition: &str,
    ) -> impl Future<Output = Result<Option<Value>, StoreError>> + Send {
        (**self).get(id, partition)
    }

    fn query(
        &self,
        predicate: &Map<String, Value>,
        partition: Option<&str>,
    ) -> impl Future<Output = Result<Vec<Value>, StoreError>> + Send {
        (**self).query(predicate, partition)
    }

    fn upsert(
        &self,
        id: &str,
        partition: &str,
        document: &Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).upsert(id, partition, document)
    }

    fn delete(&self, id: &str, partition: &str) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).delete(id, partition)
    }
}

/// Whether every predicate entry equals the document's top-level field.
pub fn matches_predicate(document: &Value, predicate: &Map<String, Value>) -> bool {
    predicate
        .iter()
        .all(|(key, expected)| document.get(key) == Some(expected))
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

type Partition = Vec<(String, Value)>;

/// Process-local store keeping documents in insertion order per partition.
///
/// Cloning shares the underlying data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    partitions: Arc<RwLock<BTreeMap<String, Partition>>>,
}

impl InMemoryDocumentStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents across all partitions.
    pub async fn len(&self) -> usize {
        self.partitions.read().await.values().map(Vec::len).sum()
    }

    /// Whether the store holds no documents.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, id: &str, partition: &str) -> Result<Option<Value>, StoreError> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(partition)
            .and_then(|docs| docs.iter().find(|(doc_id, _)| doc_id == id))
            .map(|(_, document)| document.clone()))
    }

    async fn query(
        &self,
        predicate: &Map<String, Value>,
        partition: Option<&str>,
    ) -> Result<Vec<Value>, StoreError> {
        let partitions = self.partitions.read().await;
        let scoped: Vec<&Partition> = match partition {
            Some(key) => partitions.get(key).into_iter().collect(),
            None => partitions.values().collect(),
        };
        Ok(scoped
            .into_iter()
            .flatten()
            .filter(|(_, document)| matches_predicate(document, predicate))
            .map(|(_, document)| document.clone())
            .collect())
    }

    async fn upsert(&self, id: &str, partition: &str, document: &Value) -> Result<(), StoreError> {
        let mut partitions = self.partitions.write().await;
        let docs = partitions.entry(partition.to_owned()).or_default();
        match docs.iter_mut().find(|(doc_id, _)| doc_id == id) {
            Some((_, existing)) => existing.clone_from(document),
            None => docs.push((id.to_owned(), document.clone())),
        }
        Ok(())
    }

    async fn delete(&self, id: &str, partition: &str) -> Result<(), StoreError> {
        let mut partitions = self.partitions.write().await;
        if let Some(docs) = partitions.get_mut(partition) {
            docs.retain(|(doc_id, _)| doc_id != id);
            if docs.is_empty() {
                partitions.remove(partition);
            }
        }
        Ok(())
    }
}
