//! Access-control collaborator.
//!
//! Before a search is evaluated the repository asks its
//! [`SecurityPredicate`] for the condition the caller is allowed to see. In
//! production that condition comes from the authorization service's partial
//! evaluation; [`StaticPredicate`] and [`Unrestricted`] cover fixed policies
//! and tests.

use std::error::Error as StdError;
use std::future::Future;

use keystone_condition::{Condition, ConditionError, PolicyNode, parse_filter};
use serde_json::Value;

/// Failure to obtain the caller's security condition.
#[derive(Debug, thiserror::Error)]
#[error("security predicate unavailable: {source}")]
pub struct SecurityError {
    source: Box<dyn StdError + Send + Sync + 'static>,
}

impl SecurityError {
    /// Wrap the underlying failure.
    pub fn new(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// Source of the access-control condition intersected with every search.
pub trait SecurityPredicate: Send + Sync {
    /// The condition an aggregate must satisfy to be visible.
    fn security_filter(&self) -> impl Future<Output = Result<Condition, SecurityError>> + Send;
}

/// Everything is visible.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unrestricted;

impl SecurityPredicate for Unrestricted {
    async fn security_filter(&self) -> Result<Condition, SecurityError> {
        Ok(Condition::always())
    }
}

/// A fixed condition, configured up front.
#[derive(Debug, Clone, Default)]
pub struct StaticPredicate {
    condition: Condition,
}

impl StaticPredicate {
    /// Use `condition` as the security filter.
    pub const fn new(condition: Condition) -> Self {
        Self { condition }
    }

    /// Build from a Mongo-style filter object.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError`] if the filter does not parse.
    pub fn from_filter(filter: &Value) -> Result<Self, ConditionError> {
        parse_filter(filter).map(Self::new)
    }

    /// Build from a residual policy tree, removing `reference_prefix` from
    /// its field references.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError`] if the tree uses unknown operators.
    pub fn from_policy(policy: PolicyNode, reference_prefix: &str) -> Result<Self, ConditionError> {
        policy.into_condition_stripping(reference_prefix).map(Self::new)
    }

    /// The configured condition.
    pub const fn condition(&self) -> &Condition {
        &self.condition
    }
}

impl SecurityPredicate for StaticPredicate {
    async fn security_filter(&self) -> Result<Condition, SecurityError> {
        Ok(self.condition.clone())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn unrestricted_is_always() {
        let condition = Unrestricted.security_filter().await.expect("infallible");
        assert!(condition.is_always());
    }

    #[tokio::test]
    async fn static_from_filter_and_policy() {
        let from_filter = StaticPredicate::from_filter(&json!({ "owner": "jane" })).expect("parses");
        let policy: PolicyNode = serde_json::from_value(json!({
            "type": "field", "operator": "eq", "field": "input.project.owner", "value": "jane"
        }))
        .expect("policy node");
        let from_policy = StaticPredicate::from_policy(policy, "input.project.").expect("converts");

        assert_eq!(
            from_filter.security_filter().await.expect("infallible"),
            from_policy.security_filter().await.expect("infallible")
        );
        assert!(StaticPredicate::from_filter(&json!({ "owner": { "$like": "j%" } })).is_err());
    }
}
