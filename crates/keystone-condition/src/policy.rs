//! Partial-evaluation nodes from the authorization service.
//!
//! The policy service answers "which projects may this caller see?" with a
//! residual condition tree rather than a yes/no. Each node is either a field
//! comparison or a compound over child nodes:
//!
//! ```text
//! {"type":"compound","operator":"or","value":[
//!     {"type":"field","operator":"eq","field":"input.project.owner","value":"jane"},
//!     {"type":"field","operator":"in","field":"input.project.team","value":["ops","qa"]}
//! ]}
//! ```
//!
//! [`PolicyNode::into_condition`] maps that tree onto [`Condition`] so it can
//! be intersected with the caller's own search filter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConditionError;
use crate::model::{CompoundCondition, CompoundOperator, Condition, FieldCondition, FieldOperator};

/// One node of a residual policy tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PolicyNode {
    /// A comparison against a document reference.
    Field {
        /// Operator name (`eq`, `ne`, `lt`, `le`, `gt`, `ge`, `in`, `nin`, ...).
        operator: String,
        /// Reference path, possibly carrying the policy's input prefix.
        field: String,
        /// Literal operand.
        value: Value,
    },
    /// `and` / `or` / `not` over child nodes.
    Compound {
        /// Combinator name.
        operator: String,
        /// Child nodes.
        #[serde(default)]
        value: Vec<Self>,
    },
}

impl PolicyNode {
    /// Convert this tree into a [`Condition`], keeping references as written.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError::UnknownOperator`] for operator names outside
    /// the condition vocabulary, and [`ConditionError::InvalidOperand`] when
    /// `in`/`nin` receive a non-array operand.
    pub fn into_condition(self) -> Result<Condition, ConditionError> {
        self.into_condition_stripping("")
    }

    /// Convert this tree into a [`Condition`], removing `reference_prefix`
    /// from every field reference that carries it (e.g. `input.project.`).
    ///
    /// # Errors
    ///
    /// Same as [`PolicyNode::into_condition`].
    pub fn into_condition_stripping(self, reference_prefix: &str) -> Result<Condition, ConditionError> {
        match self {
            Self::Field {
                operator,
                field,
                value,
            } => {
                let op = FieldOperator::from_name(&operator)
                    .ok_or(ConditionError::UnknownOperator(operator))?;
                if op.takes_list() && !value.is_array() {
                    return Err(ConditionError::InvalidOperand {
                        operator: op.as_str().to_owned(),
                        expected: "an array",
                    });
                }
                let field = field
                    .strip_prefix(reference_prefix)
                    .map_or_else(|| field.clone(), str::to_owned);
                Ok(Condition::Field(FieldCondition {
                    field,
                    operator: op,
                    value,
                }))
            }
            Self::Compound { operator, value } => {
                let op = CompoundOperator::from_name(&operator)
                    .ok_or(ConditionError::UnknownOperator(operator))?;
                let children = value
                    .into_iter()
                    .map(|child| child.into_condition_stripping(reference_prefix))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Condition::Compound(CompoundCondition {
                    operator: op,
                    children,
                }))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::interpret::interpret;

    fn sample_tree() -> PolicyNode {
        serde_json::from_value(json!({
            "type": "compound",
            "operator": "or",
            "value": [
                { "type": "field", "operator": "eq", "field": "input.project.owner", "value": "jane" },
                {
                    "type": "compound",
                    "operator": "and",
                    "value": [
                        { "type": "field", "operator": "in", "field": "input.project.team", "value": ["ops", "qa"] },
                        { "type": "field", "operator": "ge", "field": "input.project.budget.amount", "value": 1000 },
                        {
                            "type": "compound",
                            "operator": "not",
                            "value": [
                                { "type": "field", "operator": "eq", "field": "input.project.status", "value": "archived" }
                            ]
                        }
                    ]
                }
            ]
        }))
        .expect("policy tree deserializes")
    }

    #[test]
    fn conversion_agrees_with_direct_evaluation() {
        let condition = sample_tree()
            .into_condition_stripping("input.project.")
            .expect("policy tree converts");

        let owners = ["jane", "li"];
        let teams = ["ops", "qa", "dev"];
        let amounts = [500, 1000, 5000];
        let statuses = ["active", "archived"];

        for owner in owners {
            for team in teams {
                for amount in amounts {
                    for status in statuses {
                        let project = json!({
                            "owner": owner,
                            "team": team,
                            "budget": { "amount": amount },
                            "status": status
                        });
                        let expected = owner == "jane"
                            || ((team == "ops" || team == "qa")
                                && amount >= 1000
                                && status != "archived");
                        assert_eq!(interpret(&condition, &project), expected, "{project}");
                    }
                }
            }
        }
    }

    #[test]
    fn references_without_prefix_are_kept() {
        let node = PolicyNode::Field {
            operator: String::from("eq"),
            field: String::from("owner"),
            value: json!("jane"),
        };
        assert_eq!(
            node.into_condition_stripping("input.project."),
            Ok(Condition::equals("owner", json!("jane")))
        );
    }

    #[test]
    fn unknown_operators_are_rejected() {
        let node = PolicyNode::Compound {
            operator: String::from("xor"),
            value: Vec::new(),
        };
        assert_eq!(
            node.into_condition(),
            Err(ConditionError::UnknownOperator(String::from("xor")))
        );

        let node = PolicyNode::Field {
            operator: String::from("in"),
            field: String::from("team"),
            value: json!("ops"),
        };
        assert!(matches!(
            node.into_condition(),
            Err(ConditionError::InvalidOperand { .. })
        ));
    }
}
