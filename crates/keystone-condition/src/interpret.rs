//! Structural evaluation of a [`Condition`] against semi-structured data.
//!
//! The interpreter has no knowledge of schemas. A field condition resolves
//! its dotted path on the evaluated value and applies its operator to every
//! value found there:
//!
//! - objects are descended by key;
//! - arrays met along the path fan out over their elements (a numeric
//!   segment indexes the array instead);
//! - a terminal array is matched both as a whole and element by element,
//!   so `{"tags": "urgent"}` matches `{"tags": ["urgent", "q3"]}`.
//!
//! A path that resolves to nothing only satisfies `eq null`, `in [.., null]`
//! and the negative operators.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use crate::model::{CompoundOperator, Condition, FieldCondition, FieldOperator};

/// Evaluate `condition` against `value`.
///
/// `and` holds when every child holds (so the empty `and` is always true),
/// `or` when any child holds (so the empty `or` is always false), and `not`
/// negates the conjunction of its children (in practice a single child).
pub fn interpret(condition: &Condition, value: &Value) -> bool {
    match condition {
        Condition::Field(field) => interpret_field(field, value),
        Condition::Compound(compound) => match compound.operator {
            CompoundOperator::And => compound.children.iter().all(|c| interpret(c, value)),
            CompoundOperator::Or => compound.children.iter().any(|c| interpret(c, value)),
            CompoundOperator::Not => !compound.children.iter().all(|c| interpret(c, value)),
        },
    }
}

fn interpret_field(condition: &FieldCondition, value: &Value) -> bool {
    let candidates = candidates(resolve(value, &condition.field));
    let operand = &condition.value;

    match condition.operator {
        FieldOperator::Eq => matches_equal(&candidates, operand),
        FieldOperator::Ne => !matches_equal(&candidates, operand),
        FieldOperator::In => matches_any(&candidates, operand),
        FieldOperator::Nin => !matches_any(&candidates, operand),
        FieldOperator::Lt => matches_ordering(&candidates, operand, |o| o == Ordering::Less),
        FieldOperator::Lte => matches_ordering(&candidates, operand, |o| o != Ordering::Greater),
        FieldOperator::Gt => matches_ordering(&candidates, operand, |o| o == Ordering::Greater),
        FieldOperator::Gte => matches_ordering(&candidates, operand, |o| o != Ordering::Less),
        FieldOperator::Contains => matches_text(&candidates, operand, |h, n| h.contains(n)),
        FieldOperator::StartsWith => matches_text(&candidates, operand, |h, n| h.starts_with(n)),
        FieldOperator::EndsWith => matches_text(&candidates, operand, |h, n| h.ends_with(n)),
    }
}

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// Every value reachable through the dotted `path`.
fn resolve<'a>(value: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![value];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for v in current {
            descend(v, segment, &mut next);
        }
        if next.is_empty() {
            return next;
        }
        current = next;
    }
    current
}

fn descend<'a>(value: &'a Value, segment: &str, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            if let Some(child) = map.get(segment) {
                out.push(child);
            }
        }
        Value::Array(items) => {
            if let Some(item) = segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                out.push(item);
                return;
            }
            for item in items {
                if let Some(child) = item.as_object().and_then(|map| map.get(segment)) {
                    out.push(child);
                }
            }
        }
        _ => {}
    }
}

/// Resolved values plus the elements of any resolved arrays.
fn candidates(resolved: Vec<&Value>) -> Vec<&Value> {
    let mut out = Vec::with_capacity(resolved.len());
    for value in resolved {
        out.push(value);
        if let Value::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

fn matches_equal(candidates: &[&Value], operand: &Value) -> bool {
    if candidates.is_empty() {
        return operand.is_null();
    }
    candidates.iter().any(|c| values_equal(c, operand))
}

fn matches_any(candidates: &[&Value], operand: &Value) -> bool {
    let Value::Array(options) = operand else {
        return false;
    };
    options.iter().any(|option| matches_equal(candidates, option))
}

fn matches_ordering(
    candidates: &[&Value],
    operand: &Value,
    accept: impl Fn(Ordering) -> bool,
) -> bool {
    candidates
        .iter()
        .any(|c| compare_values(c, operand).is_some_and(&accept))
}

fn matches_text(candidates: &[&Value], operand: &Value, test: fn(&str, &str) -> bool) -> bool {
    let Some(needle) = operand.as_str() else {
        return false;
    };
    candidates
        .iter()
        .any(|c| c.as_str().is_some_and(|haystack| test(haystack, needle)))
}

/// Equality with numeric normalisation (`5 == 5.0`).
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => compare_numbers(a, b) == Some(Ordering::Equal),
        _ => left == right,
    }
}

/// Ordering between two scalars of the same kind; `None` across kinds.
fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => compare_numbers(a, b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn compare_numbers(left: &Number, right: &Number) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        return Some(a.cmp(&b));
    }
    if let (Some(a), Some(b)) = (left.as_u64(), right.as_u64()) {
        return Some(a.cmp(&b));
    }
    left.as_f64()?.partial_cmp(&right.as_f64()?)
}
