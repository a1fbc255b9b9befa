//! Boolean condition model for Keystone repositories.
//!
//! Search filters supplied by callers and access-control predicates supplied
//! by the authorization service share one small tagged-union AST. This crate
//! owns that AST and everything that operates on it without touching storage.
//!
//! # Modules
//!
//! - [`model`] -- [`Condition`], [`FieldCondition`], [`CompoundCondition`] and their operators
//! - [`interpret`] -- Structural evaluation of a condition against a JSON value
//! - [`mongo`] -- Mongo-style filter objects to [`Condition`]
//! - [`prefix`] -- Namespacing of filter keys with [`prefix_fields`]
//! - [`policy`] -- Partial-evaluation nodes from the authorization service
//! - [`error`] -- [`ConditionError`]
//!
//! # Usage
//!
//! ```
//! use keystone_condition::{interpret, parse_filter};
//! use serde_json::json;
//!
//! let filter = parse_filter(&json!({ "budget.amount": { "$gte": 50000 } })).ok();
//! let project = json!({ "id": "p-1", "budget": { "amount": 75000 } });
//!
//! assert_eq!(filter.map(|c| interpret(&c, &project)), Some(true));
//! ```

pub mod error;
pub mod interpret;
pub mod model;
pub mod mongo;
pub mod policy;
pub mod prefix;

// Re-export primary types at crate root.
pub use error::ConditionError;
pub use interpret::interpret;
pub use model::{CompoundCondition, CompoundOperator, Condition, FieldCondition, FieldOperator};
pub use mongo::parse_filter;
pub use policy::PolicyNode;
pub use prefix::prefix_fields;
