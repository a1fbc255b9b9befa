//! Error types for condition parsing and conversion.

/// Errors raised while building a [`Condition`](crate::Condition) from an
/// external representation (Mongo-style filters or policy nodes).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionError {
    /// The filter root (or a nested logical operand) was not a JSON object.
    #[error("filter must be a JSON object, found {found}")]
    NotAnObject {
        /// JSON type name of the offending value.
        found: &'static str,
    },

    /// An operator name is not part of the supported vocabulary.
    #[error("unknown operator `{0}`")]
    UnknownOperator(String),

    /// An operator received an operand of the wrong shape.
    #[error("operator `{operator}` expects {expected}")]
    InvalidOperand {
        /// The operator as written in the input.
        operator: String,
        /// Description of the accepted operand shape.
        expected: &'static str,
    },

    /// A field's value object mixes `$` operators with plain keys.
    #[error("field `{field}` mixes operators and plain keys")]
    MixedOperatorObject {
        /// The field whose value object is ambiguous.
        field: String,
    },
}

/// Name of a JSON value's type, for error messages.
pub(crate) const fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
