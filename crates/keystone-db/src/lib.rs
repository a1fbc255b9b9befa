//! Document stores for the Keystone repository engine.
//!
//! The repository core only knows the [`DocumentStore`] contract. This crate
//! provides networked implementations of it:
//!
//! ```text
//! Repository<StoreBackend, _>
//!     |
//!     +-- Memory    --> InMemoryDocumentStore (keystone-repository)
//!     +-- Dragonfly --> DragonflyDocumentStore (fred, JSON strings + ordered id lists)
//!     +-- Postgres  --> PostgresDocumentStore  (sqlx, JSONB `documents` table)
//! ```
//!
//! # Modules
//!
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) connection and store
//! - [`postgres`] -- `PostgreSQL` connection pool, configuration and store
//! - [`backend`] -- runtime backend selection by enum dispatch
//! - [`error`] -- Shared error types
//!
//! [`DocumentStore`]: keystone_repository::DocumentStore

pub mod backend;
pub mod dragonfly;
pub mod error;
pub mod postgres;

// Re-export primary types for convenience.
pub use backend::{BackendKind, PoolOptions, StoreBackend, StoreConnection};
pub use dragonfly::{DragonflyDocumentStore, DragonflyPool};
pub use error::DbError;
pub use postgres::{PostgresConfig, PostgresDocumentStore, PostgresPool};
