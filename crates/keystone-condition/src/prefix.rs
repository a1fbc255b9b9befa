//! Namespacing of filter keys.
//!
//! A caller writes filters against the fields it sees (`{"name": "X"}`); the
//! evaluated value may nest those fields under a namespace
//! (`{"project": {"name": "X"}}`). [`prefix_fields`] rewrites the filter keys
//! so both line up.

use serde_json::Value;

/// Prefix every field key of a Mongo-style filter with `prefix`.
///
/// - Keys starting with `$` (`$and`, `$or`, `$nor`, `$not`, field operators)
///   are kept and their operands are rewritten recursively.
/// - Other keys are prefixed unless they already start with `prefix`. Their
///   values are copied untouched: nested objects there are literal values or
///   operator expressions, not filter keys.
///
/// Applying the function twice with the same prefix yields the same result
/// as applying it once.
///
/// ```
/// use keystone_condition::prefix_fields;
/// use serde_json::json;
///
/// let filter = json!({ "$and": [{ "name": "A" }, { "$or": [{ "owner": "J" }] }] });
/// assert_eq!(
///     prefix_fields(&filter, "project."),
///     json!({ "$and": [{ "project.name": "A" }, { "$or": [{ "project.owner": "J" }] }] })
/// );
/// ```
pub fn prefix_fields(query: &Value, prefix: &str) -> Value {
    match query {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    if key.starts_with('$') {
                        (key.clone(), prefix_fields(value, prefix))
                    } else if key.starts_with(prefix) {
                        (key.clone(), value.clone())
                    } else {
                        (format!("{prefix}{key}"), value.clone())
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|i| prefix_fields(i, prefix)).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn prefixes_plain_keys() {
        assert_eq!(
            prefix_fields(&json!({ "name": "X" }), "project."),
            json!({ "project.name": "X" })
        );
    }

    #[test]
    fn does_not_double_prefix() {
        let once = prefix_fields(&json!({ "name": "X", "project.owner": "J" }), "project.");
        assert_eq!(once, json!({ "project.name": "X", "project.owner": "J" }));
        assert_eq!(prefix_fields(&once, "project."), once);
    }

    #[test]
    fn keeps_operators_and_recurses() {
        let filter = json!({
            "$and": [
                { "name": "A" },
                { "$or": [{ "owner": "J" }] }
            ],
            "$not": { "status": "closed" }
        });
        assert_eq!(
            prefix_fields(&filter, "project."),
            json!({
                "$and": [
                    { "project.name": "A" },
                    { "$or": [{ "project.owner": "J" }] }
                ],
                "$not": { "project.status": "closed" }
            })
        );
    }

    #[test]
    fn field_values_are_not_descended() {
        let filter = json!({
            "budget": { "amount": 5, "currency": "EUR" },
            "name": { "$startsWith": "Apollo" }
        });
        assert_eq!(
            prefix_fields(&filter, "project."),
            json!({
                "project.budget": { "amount": 5, "currency": "EUR" },
                "project.name": { "$startsWith": "Apollo" }
            })
        );
    }

    #[test]
    fn scalars_pass_through() {
        assert_eq!(prefix_fields(&json!("name"), "p."), json!("name"));
        assert_eq!(prefix_fields(&json!(null), "p."), json!(null));
    }
}
