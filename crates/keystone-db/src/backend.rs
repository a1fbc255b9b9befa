//! Runtime selection between store implementations.
//!
//! The engine picks a backend from configuration, so the concrete store
//! type is only known at runtime. [`StoreBackend`] wraps the three
//! implementations in an enum and forwards every [`DocumentStore`] call,
//! keeping the repository generic and free of trait objects.

use std::time::Duration;

use keystone_repository::{DocumentStore, InMemoryDocumentStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dragonfly::{DragonflyDocumentStore, DragonflyPool};
use crate::error::DbError;
use crate::postgres::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_CONNECTIONS,
    PostgresConfig, PostgresDocumentStore, PostgresPool,
};

/// Which store implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local, not persisted.
    #[default]
    Memory,
    /// `Dragonfly` / Redis.
    Dragonfly,
    /// `PostgreSQL`.
    Postgres,
}

/// Connection pool tuning for `PostgreSQL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// How long to wait for a connection before failing.
    pub connect_timeout: Duration,
    /// How long an unused connection stays open.
    pub idle_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

impl PoolOptions {
    fn postgres_config(self, url: &str) -> PostgresConfig {
        PostgresConfig::new(url)
            .with_max_connections(self.max_connections)
            .with_connect_timeout(self.connect_timeout)
            .with_idle_timeout(self.idle_timeout)
    }
}

/// An open connection to one backend, from which per-aggregate stores are made.
#[derive(Debug, Clone)]
pub enum StoreConnection {
    /// No connection; every aggregate gets a fresh in-memory store.
    Memory,
    /// Shared `Dragonfly` client.
    Dragonfly(DragonflyPool),
    /// Shared `PostgreSQL` pool.
    Postgres(PostgresPool),
}

impl StoreConnection {
    /// Connect to the backend described by `kind` and `url`.
    ///
    /// `PostgreSQL` connections are tuned by `options` and run pending
    /// migrations before returning.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] when a networked backend has no URL,
    /// otherwise the backend's connection error.
    pub async fn open(
        kind: BackendKind,
        url: Option<&str>,
        options: PoolOptions,
    ) -> Result<Self, DbError> {
        let require_url = || {
            url.ok_or_else(|| DbError::Config(format!("store backend `{kind:?}` requires a url")))
        };
        match kind {
            BackendKind::Memory => Ok(Self::Memory),
            BackendKind::Dragonfly => Ok(Self::Dragonfly(DragonflyPool::connect(require_url()?).await?)),
            BackendKind::Postgres => {
                let pool = PostgresPool::connect(&options.postgres_config(require_url()?)).await?;
                pool.run_migrations().await?;
                Ok(Self::Postgres(pool))
            }
        }
    }

    /// Which backend this connection talks to.
    pub const fn kind(&self) -> BackendKind {
        match self {
            Self::Memory => BackendKind::Memory,
            Self::Dragonfly(_) => BackendKind::Dragonfly,
            Self::Postgres(_) => BackendKind::Postgres,
        }
    }

    /// A store for documents of `aggregate`.
    pub fn store_for(&self, aggregate: &str) -> StoreBackend {
        match self {
            Self::Memory => StoreBackend::Memory(InMemoryDocumentStore::new()),
            Self::Dragonfly(pool) => StoreBackend::Dragonfly(pool.document_store(aggregate)),
            Self::Postgres(pool) => StoreBackend::Postgres(pool.document_store(aggregate)),
        }
    }
}

/// A document store chosen at runtime.
#[derive(Debug, Clone)]
pub enum StoreBackend {
    /// In-memory store.
    Memory(InMemoryDocumentStore),
    /// `Dragonfly` store.
    Dragonfly(DragonflyDocumentStore),
    /// `PostgreSQL` store.
    Postgres(PostgresDocumentStore),
}

impl StoreBackend {
    /// Which implementation this is.
    pub const fn kind(&self) -> BackendKind {
        match self {
            Self::Memory(_) => BackendKind::Memory,
            Self::Dragonfly(_) => BackendKind::Dragonfly,
            Self::Postgres(_) => BackendKind::Postgres,
        }
    }
}

impl DocumentStore for StoreBackend {
    async fn get(&self, id: &str, partition: &str) -> Result<Option<Value>, StoreError> {
        match self {
            Self::Memory(store) => store.get(id, partition).await,
            Self::Dragonfly(store) => store.get(id, partition).await,
            Self::Postgres(store) => store.get(id, partition).await,
        }
    }

    async fn query(
        &self,
        predicate: &Map<String, Value>,
        partition: Option<&str>,
    ) -> Result<Vec<Value>, StoreError> {
        match self {
            Self::Memory(store) => store.query(predicate, partition).await,
            Self::Dragonfly(store) => store.query(predicate, partition).await,
            Self::Postgres(store) => store.query(predicate, partition).await,
        }
    }

    async fn upsert(&self, id: &str, partition: &str, document: &Value) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.upsert(id, partition, document).await,
            Self::Dragonfly(store) => store.upsert(id, partition, document).await,
            Self::Postgres(store) => store.upsert(id, partition, document).await,
        }
    }

    async fn delete(&self, id: &str, partition: &str) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.delete(id, partition).await,
            Self::Dragonfly(store) => store.delete(id, partition).await,
            Self::Postgres(store) => store.delete(id, partition).await,
        }
    }
}
