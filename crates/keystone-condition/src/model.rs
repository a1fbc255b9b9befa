//! The condition AST.
//!
//! A [`Condition`] is either a [`FieldCondition`] comparing the value at a
//! dotted path with a literal, or a [`CompoundCondition`] combining child
//! conditions with `and`, `or`, or `not`. The empty `and` is the
//! "no restriction" sentinel returned by [`Condition::always`].
//!
//! Conditions serialize as internally tagged JSON:
//!
//! ```text
//! {"type":"field","field":"owner","operator":"eq","value":"jane"}
//! {"type":"compound","operator":"and","children":[...]}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::interpret::interpret;

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Comparison applied by a [`FieldCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldOperator {
    /// Equal to the operand.
    Eq,
    /// Not equal to the operand.
    Ne,
    /// Strictly less than the operand.
    Lt,
    /// Less than or equal to the operand.
    Lte,
    /// Strictly greater than the operand.
    Gt,
    /// Greater than or equal to the operand.
    Gte,
    /// Equal to one of the operand's elements.
    In,
    /// Equal to none of the operand's elements.
    Nin,
    /// String containing the operand as a substring.
    Contains,
    /// String starting with the operand.
    #[serde(rename = "startswith")]
    StartsWith,
    /// String ending with the operand.
    #[serde(rename = "endswith")]
    EndsWith,
}

impl FieldOperator {
    /// Canonical lowercase name, matching the serialized form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::In => "in",
            Self::Nin => "nin",
            Self::Contains => "contains",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
        }
    }

    /// Look up an operator by name, case-insensitively.
    ///
    /// Accepts the canonical names plus the aliases used by policy engines
    /// (`le`, `ge`, `neq`, `equal`).
    pub fn from_name(name: &str) -> Option<Self> {
        let op = match name.to_ascii_lowercase().as_str() {
            "eq" | "equal" => Self::Eq,
            "ne" | "neq" => Self::Ne,
            "lt" => Self::Lt,
            "lte" | "le" => Self::Lte,
            "gt" => Self::Gt,
            "gte" | "ge" => Self::Gte,
            "in" => Self::In,
            "nin" => Self::Nin,
            "contains" => Self::Contains,
            "startswith" => Self::StartsWith,
            "endswith" => Self::EndsWith,
            _ => return None,
        };
        Some(op)
    }

    /// Whether the operand must be a JSON array.
    pub const fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::Nin)
    }
}

impl core::fmt::Display for FieldOperator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combinator applied by a [`CompoundCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompoundOperator {
    /// All children hold.
    And,
    /// At least one child holds.
    Or,
    /// The child does not hold.
    Not,
}

impl CompoundOperator {
    /// Canonical lowercase name, matching the serialized form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
        }
    }

    /// Look up a combinator by name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "and" => Some(Self::And),
            "or" => Some(Self::Or),
            "not" => Some(Self::Not),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// A comparison between the value at `field` and a literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCondition {
    /// Dotted path into the evaluated value (e.g. `budget.amount`).
    pub field: String,
    /// Comparison to apply.
    pub operator: FieldOperator,
    /// Literal operand. An array for [`FieldOperator::In`] and [`FieldOperator::Nin`].
    pub value: Value,
}

/// A boolean combination of child conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundCondition {
    /// How the children are combined.
    pub operator: CompoundOperator,
    /// Child conditions, evaluated in order.
    #[serde(default)]
    pub children: Vec<Condition>,
}

/// A node of the condition tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Condition {
    /// Leaf comparison.
    Field(FieldCondition),
    /// `and` / `or` / `not` over children.
    Compound(CompoundCondition),
}

impl Condition {
    /// Build a field comparison.
    pub fn field(field: impl Into<String>, operator: FieldOperator, value: Value) -> Self {
        Self::Field(FieldCondition {
            field: field.into(),
            operator,
            value,
        })
    }

    /// Shorthand for an equality comparison.
    pub fn equals(field: impl Into<String>, value: Value) -> Self {
        Self::field(field, FieldOperator::Eq, value)
    }

    /// Conjunction of `children`.
    pub const fn and(children: Vec<Self>) -> Self {
        Self::Compound(CompoundCondition {
            operator: CompoundOperator::And,
            children,
        })
    }

    /// Disjunction of `children`.
    pub const fn or(children: Vec<Self>) -> Self {
        Self::Compound(CompoundCondition {
            operator: CompoundOperator::Or,
            children,
        })
    }

    /// Negation of `child`.
    pub fn not(child: Self) -> Self {
        Self::Compound(CompoundCondition {
            operator: CompoundOperator::Not,
            children: vec![child],
        })
    }

    /// The always-true condition: an `and` with no children.
    pub const fn always() -> Self {
        Self::and(Vec::new())
    }

    /// Whether this is the always-true sentinel returned by [`Condition::always`].
    pub fn is_always(&self) -> bool {
        matches!(
            self,
            Self::Compound(CompoundCondition {
                operator: CompoundOperator::And,
                children,
            }) if children.is_empty()
        )
    }

    /// Evaluate this condition against `value`. See [`interpret`].
    pub fn matches(&self, value: &Value) -> bool {
        interpret(self, value)
    }

    /// Intersect two conditions, skipping whichever side is always-true.
    #[must_use]
    pub fn intersect(self, other: Self) -> Self {
        if other.is_always() {
            self
        } else if self.is_always() {
            other
        } else {
            Self::and(vec![self, other])
        }
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::always()
    }
}
