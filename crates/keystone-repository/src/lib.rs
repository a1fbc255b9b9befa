//! Schema-driven aggregate repository.
//!
//! An aggregate is a root object with nested single-valued and
//! collection-valued sub-entities. This crate stores aggregates in a
//! schemaless key/partition document store by splitting them into one flat
//! document per entity value, all partitioned by the aggregate id, and
//! rebuilds them on read.
//!
//! # Building blocks
//!
//! - [`RepositoryConfig`]: aggregate name, partition key field, root and
//!   sub-entities with explicit [`ObjectSchema`]s. Built and validated once.
//! - [`codec`]: [`split`](codec::split) and
//!   [`merge_partition`](codec::merge_partition) /
//!   [`merge_all`](codec::merge_all).
//! - [`DocumentStore`]: the store contract. [`InMemoryDocumentStore`] ships
//!   here; networked stores live in `keystone-db`.
//! - [`SecurityPredicate`]: supplies the access-control condition that is
//!   intersected with every search.
//! - [`Repository`]: CRUD, entity-scoped operations and policy-filtered
//!   search.
//!
//! ```
//! use std::sync::Arc;
//!
//! use keystone_repository::{
//!     Aggregate, EntityConfig, FieldDescriptor, FieldType, InMemoryDocumentStore,
//!     ObjectSchema, Repository, RepositoryConfig, Unrestricted,
//! };
//! use serde_json::json;
//!
//! # tokio::runtime::Builder::new_current_thread().build().map_err(|e| e.to_string())?.block_on(async {
//! let config = RepositoryConfig::builder("project", "project_id")
//!     .root(EntityConfig::root(
//!         "project",
//!         ObjectSchema::new(vec![FieldDescriptor::required("name", FieldType::String)]),
//!     ))
//!     .build()
//!     .map_err(|e| e.to_string())?;
//!
//! let repository = Repository::new(Arc::new(config), InMemoryDocumentStore::new(), Unrestricted);
//! let apollo = Aggregate::try_from(json!({ "id": "p-1", "name": "Apollo" })).map_err(|e| e.to_string())?;
//! repository.upsert(&apollo).await.map_err(|e| e.to_string())?;
//!
//! let found = repository.search(r#"{"name": "Apollo"}"#).await.map_err(|e| e.to_string())?;
//! assert_eq!(found, vec![apollo]);
//! # Ok::<(), String>(())
//! # })?;
//! # Ok::<(), String>(())
//! ```

pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod repository;
pub mod schema;
pub mod security;
pub mod settings;
pub mod store;

pub use config::{
    AggregateConfig, ConfigError, EntityConfig, EntityDefinition, EntityKind, RepositoryConfig,
    RepositoryConfigBuilder, RepositoryDefinition,
};
pub use document::{Aggregate, Document};
pub use error::RepositoryError;
pub use repository::Repository;
pub use schema::{FieldDescriptor, FieldType, IdSchema, ObjectSchema, SchemaViolation};
pub use security::{SecurityError, SecurityPredicate, StaticPredicate, Unrestricted};
pub use settings::{MalformedFilterPolicy, RepositorySettings};
pub use store::{DocumentStore, InMemoryDocumentStore, StoreError};

pub use keystone_condition as condition;
