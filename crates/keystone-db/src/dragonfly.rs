//! `Dragonfly` (Redis-compatible) document store.
//!
//! Each aggregate type gets its own key namespace. Documents are stored as
//! JSON strings; per-partition lists keep first-insertion order so partition
//! scans return documents the way they were written.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `doc:{aggregate}:{partition}:{id}` | JSON | One document |
//! | `docs:{aggregate}:{partition}` | List | Document ids in insertion order |
//! | `docs:{aggregate}:{partition}:ids` | Set | Membership guard for the list |
//! | `partitions:{aggregate}` | Set | Partitions holding at least one document |
//!
//! Each `{component}` is escaped (`:` becomes `\:`, `\` becomes `\\`), so
//! the patterns stay unambiguous for any string.
//!
//! Predicate queries load the partition (or every partition) and filter in
//! process. Multi-key updates are not transactional.

use std::borrow::Cow;
use std::fmt;

use fred::prelude::*;
use keystone_repository::store::matches_predicate;
use keystone_repository::{DocumentStore, StoreError};
use serde_json::{Map, Value};

use crate::error::DbError;

/// Connection handle to a `Dragonfly` (Redis-compatible) instance.
///
/// One pool serves every aggregate; [`DragonflyPool::document_store`] hands
/// out namespaced stores sharing the connection.
#[derive(Clone)]
pub struct DragonflyPool {
    client: Client,
}

impl DragonflyPool {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    /// A document store for `aggregate`, sharing this connection.
    pub fn document_store(&self, aggregate: &str) -> DragonflyDocumentStore {
        DragonflyDocumentStore {
            client: self.client.clone(),
            aggregate: aggregate.to_owned(),
        }
    }

    /// Flush all keys from the `Dragonfly` instance.
    ///
    /// **WARNING:** This deletes all data. Only use for testing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the flush fails.
    pub async fn flush_all(&self) -> Result<(), DbError> {
        let _: () = self.client.flushall(false).await?;
        Ok(())
    }
}

impl fmt::Debug for DragonflyPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DragonflyPool").finish_non_exhaustive()
    }
}

// =========================================================================
// Keys
// =========================================================================

/// Escape `\` and `:` in one key component, so arbitrary aggregate names,
/// partitions and ids cannot run into each other or into the `:ids` suffix.
fn key_part(raw: &str) -> Cow<'_, str> {
    if !raw.contains([':', '\\']) {
        return Cow::Borrowed(raw);
    }
    let mut escaped = String::with_capacity(raw.len().saturating_add(4));
    for c in raw.chars() {
        if matches!(c, ':' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    Cow::Owned(escaped)
}

fn document_key(aggregate: &str, partition: &str, id: &str) -> String {
    format!("doc:{}:{}:{}", key_part(aggregate), key_part(partition), key_part(id))
}

fn order_key(aggregate: &str, partition: &str) -> String {
    format!("docs:{}:{}", key_part(aggregate), key_part(partition))
}

fn members_key(aggregate: &str, partition: &str) -> String {
    format!("docs:{}:{}:ids", key_part(aggregate), key_part(partition))
}

fn partitions_key(aggregate: &str) -> String {
    format!("partitions:{}", key_part(aggregate))
}

// =========================================================================
// Document store
// =========================================================================

/// Documents of one aggregate type stored in `Dragonfly`.
#[derive(Clone)]
pub struct DragonflyDocumentStore {
    client: Client,
    aggregate: String,
}

impl fmt::Debug for DragonflyDocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DragonflyDocumentStore")
            .field("aggregate", &self.aggregate)
            .finish_non_exhaustive()
    }
}

impl DragonflyDocumentStore {
    /// The aggregate namespace.
    pub fn aggregate(&self) -> &str {
        &self.aggregate
    }

    async fn fetch(&self, id: &str, partition: &str) -> Result<Option<Value>, DbError> {
        let key = document_key(&self.aggregate, partition, id);
        let raw: Option<String> = self.client.get(&key).await?;
        raw.map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(DbError::from)
    }

    /// Every document of `partition` in insertion order.
    async fn scan_partition(&self, partition: &str) -> Result<Vec<Value>, DbError> {
        let ids: Vec<String> = self
            .client
            .lrange(order_key(&self.aggregate, partition), 0, -1)
            .await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids
            .iter()
            .map(|id| document_key(&self.aggregate, partition, id))
            .collect();
        let raw: Vec<Option<String>> = self.client.mget(keys).await?;

        let mut documents = Vec::with_capacity(raw.len());
        for json in raw.iter().flatten() {
            documents.push(serde_json::from_str(json)?);
        }
        Ok(documents)
    }

    /// Partitions of this aggregate, sorted.
    async fn partitions(&self) -> Result<Vec<String>, DbError> {
        let mut partitions: Vec<String> = self.client.smembers(partitions_key(&self.aggregate)).await?;
        partitions.sort_unstable();
        Ok(partitions)
    }

    async fn select(
        &self,
        predicate: &Map<String, Value>,
        partition: Option<&str>,
    ) -> Result<Vec<Value>, DbError> {
        let partitions = match partition {
            Some(p) => vec![p.to_owned()],
            None => self.partitions().await?,
        };

        let mut matched = Vec::new();
        for partition in &partitions {
            let documents = self.scan_partition(partition).await?;
            matched.extend(
                documents
                    .into_iter()
                    .filter(|document| matches_predicate(document, predicate)),
            );
        }
        tracing::debug!(
            aggregate = %self.aggregate,
            partitions = partitions.len(),
            matched = matched.len(),
            "Dragonfly query"
        );
        Ok(matched)
    }

    async fn store(&self, id: &str, partition: &str, document: &Value) -> Result<(), DbError> {
        let json = serde_json::to_string(document)?;
        let _: () = self
            .client
            .set(document_key(&self.aggregate, partition, id), json.as_str(), None, None, false)
            .await?;

        let added: u32 = self
            .client
            .sadd(members_key(&self.aggregate, partition), id)
            .await?;
        if added > 0 {
            let _: u64 = self
                .client
                .rpush(order_key(&self.aggregate, partition), id)
                .await?;
        }
        let _: u32 = self
            .client
            .sadd(partitions_key(&self.aggregate), partition)
            .await?;
        Ok(())
    }

    async fn remove(&self, id: &str, partition: &str) -> Result<(), DbError> {
        let _: u32 = self
            .client
            .del(document_key(&self.aggregate, partition, id))
            .await?;

        let removed: u32 = self
            .client
            .srem(members_key(&self.aggregate, partition), id)
            .await?;
        if removed > 0 {
            let order = order_key(&self.aggregate, partition);
            let _: u64 = self.client.lrem(&order, 0, id).await?;
            let remaining: u64 = self.client.llen(&order).await?;
            if remaining == 0 {
                let _: u32 = self
                    .client
                    .srem(partitions_key(&self.aggregate), partition)
                    .await?;
            }
        }
        Ok(())
    }
}

impl DocumentStore for DragonflyDocumentStore {
    async fn get(&self, id: &str, partition: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.fetch(id, partition).await?)
    }

    async fn query(
        &self,
        predicate: &Map<String, Value>,
        partition: Option<&str>,
    ) -> Result<Vec<Value>, StoreError> {
        Ok(self.select(predicate, partition).await?)
    }

    async fn upsert(&self, id: &str, partition: &str, document: &Value) -> Result<(), StoreError> {
        Ok(self.store(id, partition, document).await?)
    }

    async fn delete(&self, id: &str, partition: &str) -> Result<(), StoreError> {
        Ok(self.remove(id, partition).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(document_key("project", "p-1", "budget"), "doc:project:p-1:budget");
        assert_eq!(order_key("project", "p-1"), "docs:project:p-1");
        assert_eq!(members_key("project", "p-1"), "docs:project:p-1:ids");
        assert_eq!(partitions_key("project"), "partitions:project");
    }

    #[test]
    fn separators_in_components_are_escaped() {
        assert_eq!(key_part("plain"), "plain");
        assert_eq!(key_part("a:b"), "a\\:b");
        assert_eq!(key_part("a\\b"), "a\\\\b");

        // A partition named `p:ids` must not reuse the membership set of `p`.
        assert_ne!(order_key("agg", "p:ids"), members_key("agg", "p"));
        // Partition `a` with id `b:c` is not partition `a:b` with id `c`.
        assert_ne!(document_key("agg", "a", "b:c"), document_key("agg", "a:b", "c"));
        // Escapes themselves cannot be forged.
        assert_ne!(document_key("agg", "a\\", "b"), document_key("agg", "a", "\\b"));
        assert_ne!(document_key("a:b", "c", "d"), document_key("a", "b:c", "d"));
    }
}
