//! Mongo-style filter objects to [`Condition`].
//!
//! The search endpoint receives filters in the shape callers already know
//! from document databases:
//!
//! ```text
//! {"budget.amount": {"$gte": 50000}, "$or": [{"owner": "jane"}, {"owner": "li"}]}
//! ```
//!
//! Supported vocabulary:
//!
//! | Position | Operators |
//! |----------|-----------|
//! | top level | `$and`, `$or`, `$nor` (arrays of filters), `$not` (filter) |
//! | field value | `$eq`, `$ne`, `$lt`, `$lte`, `$gt`, `$gte`, `$in`, `$nin`, `$contains`, `$startsWith`, `$endsWith`, `$exists`, `$not` |
//!
//! A plain field value is an implicit `$eq`. Several keys at one level are
//! conjoined; a level with one condition is not wrapped; `{}` parses to
//! [`Condition::always`].

use serde_json::{Map, Value};

use crate::error::{ConditionError, json_type_name};
use crate::model::{Condition, FieldOperator};

/// Parse a Mongo-style filter object into a [`Condition`].
///
/// # Errors
///
/// Returns [`ConditionError`] if the filter is not an object, names an
/// unsupported operator, or gives an operator an operand of the wrong shape.
pub fn parse_filter(filter: &Value) -> Result<Condition, ConditionError> {
    let Value::Object(map) = filter else {
        return Err(ConditionError::NotAnObject {
            found: json_type_name(filter),
        });
    };
    parse_document(map)
}

fn parse_document(map: &Map<String, Value>) -> Result<Condition, ConditionError> {
    let mut conditions = Vec::with_capacity(map.len());
    for (key, value) in map {
        let condition = match key.strip_prefix('$') {
            Some(operator) => parse_logical(operator, value)?,
            None => parse_field(key, value)?,
        };
        conditions.push(condition);
    }
    Ok(conjoin(conditions))
}

fn conjoin(mut conditions: Vec<Condition>) -> Condition {
    if conditions.len() == 1 {
        if let Some(only) = conditions.pop() {
            return only;
        }
    }
    Condition::and(conditions)
}

fn parse_logical(operator: &str, value: &Value) -> Result<Condition, ConditionError> {
    match operator {
        "and" => Ok(Condition::and(parse_branches(operator, value)?)),
        "or" => Ok(Condition::or(parse_branches(operator, value)?)),
        "nor" => Ok(Condition::not(Condition::or(parse_branches(operator, value)?))),
        "not" => Ok(Condition::not(parse_filter(value)?)),
        other => Err(ConditionError::UnknownOperator(format!("${other}"))),
    }
}

fn parse_branches(operator: &str, value: &Value) -> Result<Vec<Condition>, ConditionError> {
    let Value::Array(branches) = value else {
        return Err(ConditionError::InvalidOperand {
            operator: format!("${operator}"),
            expected: "an array of filter objects",
        });
    };
    branches.iter().map(parse_filter).collect()
}

fn parse_field(field: &str, value: &Value) -> Result<Condition, ConditionError> {
    match value {
        Value::Object(map) if is_operator_object(map) => parse_operators(field, map),
        _ => Ok(Condition::equals(field, value.clone())),
    }
}

/// An object is an operator expression when any key starts with `$`; a
/// mix of operators and plain keys is then rejected by [`parse_operators`].
fn is_operator_object(map: &Map<String, Value>) -> bool {
    map.keys().any(|k| k.starts_with('$'))
}

fn parse_operators(field: &str, map: &Map<String, Value>) -> Result<Condition, ConditionError> {
    let mut conditions = Vec::with_capacity(map.len());
    for (key, operand) in map {
        let Some(operator) = key.strip_prefix('$') else {
            return Err(ConditionError::MixedOperatorObject {
                field: field.to_owned(),
            });
        };
        conditions.push(parse_operator(field, operator, operand)?);
    }
    Ok(conjoin(conditions))
}

fn parse_operator(field: &str, operator: &str, operand: &Value) -> Result<Condition, ConditionError> {
    match operator {
        "not" => {
            let Value::Object(inner) = operand else {
                return Err(ConditionError::InvalidOperand {
                    operator: String::from("$not"),
                    expected: "an operator object",
                });
            };
            Ok(Condition::not(parse_operators(field, inner)?))
        }
        "exists" => {
            let Some(exists) = operand.as_bool() else {
                return Err(ConditionError::InvalidOperand {
                    operator: String::from("$exists"),
                    expected: "a boolean",
                });
            };
            let op = if exists { FieldOperator::Ne } else { FieldOperator::Eq };
            Ok(Condition::field(field, op, Value::Null))
        }
        name => {
            let op = FieldOperator::from_name(name)
                .ok_or_else(|| ConditionError::UnknownOperator(format!("${name}")))?;
            if op.takes_list() && !operand.is_array() {
                return Err(ConditionError::InvalidOperand {
                    operator: format!("${name}"),
                    expected: "an array",
                });
            }
            Ok(Condition::field(field, op, operand.clone()))
        }
    }
}
