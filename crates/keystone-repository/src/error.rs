//! Error types for repository operations.

use keystone_condition::ConditionError;

use crate::config::EntityKind;
use crate::schema::SchemaViolation;
use crate::security::SecurityError;
use crate::store::StoreError;

/// Errors returned by the codec and [`Repository`](crate::Repository).
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// An aggregate or entity value did not match its schema on the way in.
    #[error("cannot encode {entity}: {violation}")]
    Encode {
        /// Entity whose schema was violated.
        entity: String,
        /// What was wrong.
        #[source]
        violation: SchemaViolation,
    },

    /// A stored document did not match its schema on the way out.
    #[error("cannot decode {entity} document: {violation}")]
    Decode {
        /// Entity (or aggregate, for malformed documents) being decoded.
        entity: String,
        /// What was wrong.
        #[source]
        violation: SchemaViolation,
    },

    /// A partition holds documents but no root document.
    #[error("{aggregate} partition `{partition}` has no root document")]
    RootNotFound {
        /// Aggregate name.
        aggregate: String,
        /// Partition key value.
        partition: String,
    },

    /// No documents exist for the requested aggregate id.
    #[error("{aggregate} `{id}` not found")]
    NotFound {
        /// Aggregate name.
        aggregate: String,
        /// Requested id.
        id: String,
    },

    /// The named entity is not part of the aggregate.
    #[error("{aggregate} has no entity named `{entity}`")]
    UnknownEntity {
        /// Aggregate name.
        aggregate: String,
        /// Requested entity.
        entity: String,
    },

    /// The named entity exists but has a different kind than the operation needs.
    #[error("entity `{entity}` is {actual}, operation requires {expected}")]
    EntityKind {
        /// Entity name.
        entity: String,
        /// Kind the operation works on.
        expected: EntityKind,
        /// Kind configured.
        actual: EntityKind,
    },

    /// The document store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The security predicate could not be obtained.
    #[error(transparent)]
    Security(#[from] SecurityError),

    /// The search query is not valid JSON.
    #[error("malformed search filter: {0}")]
    MalformedFilter(#[source] serde_json::Error),

    /// The search query is JSON but not a valid filter.
    #[error("invalid search filter: {0}")]
    InvalidFilter(#[from] ConditionError),
}
