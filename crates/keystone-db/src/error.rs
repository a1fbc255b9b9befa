//! Error types for the store backends.
//!
//! Backend failures are reported as [`DbError`], which wraps the underlying
//! [`sqlx`] and [`fred`] errors. At the repository boundary they become the
//! opaque [`StoreError`].

use keystone_repository::StoreError;

/// Errors that can occur in the store backends.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A stored document is not valid JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<DbError> for StoreError {
    fn from(error: DbError) -> Self {
        Self::new(error)
    }
}
