//! Explicit field schemas for entities and derived aggregate views.
//!
//! Each entity declares its domain fields as an ordered list of
//! [`FieldDescriptor`]s, built once when the configuration is constructed.
//! Derived schemas (root row, full aggregate, search view) are assembled
//! from those lists by [`RepositoryConfig`](crate::RepositoryConfig).
//!
//! Schemas are serde-friendly so aggregates can be declared in YAML:
//!
//! ```text
//! fields:
//!   - { name: name, type: string }
//!   - { name: owner, type: string, optional: true }
//!   - { name: tags, type: array, items: { type: string } }
//! ```

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Ways a JSON value can fail to satisfy a schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaViolation {
    /// The value being checked is not a JSON object.
    #[error("expected a JSON object, found {found}")]
    NotAnObject {
        /// JSON type of the value.
        found: &'static str,
    },

    /// A required field is absent or `null`.
    #[error("missing required field `{path}`")]
    MissingField {
        /// Dotted path of the field.
        path: String,
    },

    /// A field is not declared by the schema.
    #[error("unknown field `{path}`")]
    UnknownField {
        /// Dotted path of the field.
        path: String,
    },

    /// A field holds a value of the wrong JSON type.
    #[error("field `{path}` expected {expected}, found {found}")]
    TypeMismatch {
        /// Dotted path of the field.
        path: String,
        /// Declared type.
        expected: &'static str,
        /// JSON type actually present.
        found: &'static str,
    },

    /// Two documents of one aggregate would share a document id.
    #[error("document id `{id}` is already used in this aggregate")]
    DuplicateId {
        /// The repeated id.
        id: String,
    },

    /// A string field does not parse as its declared format.
    #[error("field `{path}` is not a valid {expected}: {reason}")]
    InvalidFormat {
        /// Dotted path of the field.
        path: String,
        /// Declared format.
        expected: &'static str,
        /// Parser message.
        reason: String,
    },
}

/// Name of a JSON value's type, for violation messages.
pub(crate) const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_owned()
    } else {
        format!("{parent}.{name}")
    }
}

// ---------------------------------------------------------------------------
// Field types
// ---------------------------------------------------------------------------

/// The declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    /// Any JSON string.
    String,
    /// Any JSON number.
    Number,
    /// A JSON number without a fractional part.
    Integer,
    /// `true` or `false`.
    Boolean,
    /// An RFC 3339 timestamp string.
    Timestamp,
    /// A hyphenated UUID string.
    Uuid,
    /// A nested object with its own fields.
    Object(ObjectSchema),
    /// A JSON array whose elements all have type `items`.
    Array {
        /// Element type.
        items: Box<FieldType>,
    },
    /// Any JSON value, unchecked.
    Json,
}

impl FieldType {
    /// Human-readable type name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Uuid => "uuid",
            Self::Object(_) => "object",
            Self::Array { .. } => "array",
            Self::Json => "json",
        }
    }

    /// Array of `items`.
    pub fn array_of(items: Self) -> Self {
        Self::Array {
            items: Box::new(items),
        }
    }

    /// Check `value` against this type. `path` names the value in errors.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaViolation`] found, depth first.
    pub fn validate(&self, path: &str, value: &Value) -> Result<(), SchemaViolation> {
        let mismatch = || SchemaViolation::TypeMismatch {
            path: path.to_owned(),
            expected: self.name(),
            found: json_type_name(value),
        };

        match self {
            Self::Json => Ok(()),
            Self::String => value.is_string().then_some(()).ok_or_else(mismatch),
            Self::Number => value.is_number().then_some(()).ok_or_else(mismatch),
            Self::Integer => (value.is_i64() || value.is_u64())
                .then_some(())
                .ok_or_else(mismatch),
            Self::Boolean => value.is_boolean().then_some(()).ok_or_else(mismatch),
            Self::Timestamp => {
                let text = value.as_str().ok_or_else(mismatch)?;
                DateTime::parse_from_rfc3339(text)
                    .map(|_| ())
                    .map_err(|e| SchemaViolation::InvalidFormat {
                        path: path.to_owned(),
                        expected: "timestamp",
                        reason: e.to_string(),
                    })
            }
            Self::Uuid => {
                let text = value.as_str().ok_or_else(mismatch)?;
                Uuid::parse_str(text)
                    .map(|_| ())
                    .map_err(|e| SchemaViolation::InvalidFormat {
                        path: path.to_owned(),
                        expected: "uuid",
                        reason: e.to_string(),
                    })
            }
            Self::Object(schema) => {
                let object = value.as_object().ok_or_else(mismatch)?;
                schema.validate_at(path, object)
            }
            Self::Array { items } => {
                let elements = value.as_array().ok_or_else(mismatch)?;
                for (index, element) in elements.iter().enumerate() {
                    items.validate(&format!("{path}[{index}]"), element)?;
                }
                Ok(())
            }
        }
    }
}

/// One declared field of an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field name as it appears in JSON.
    pub name: String,
    /// Declared type.
    #[serde(flatten)]
    pub field_type: FieldType,
    /// Whether the field may be absent or `null`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

impl FieldDescriptor {
    /// A required field.
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            optional: false,
        }
    }

    /// A field that may be absent or `null`.
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            optional: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Object schemas
// ---------------------------------------------------------------------------

/// An ordered list of field descriptors describing a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSchema {
    /// Declared fields in declaration order.
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl ObjectSchema {
    /// Build a schema from descriptors.
    pub const fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self { fields }
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether a field with this name is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Append a field, builder style.
    #[must_use]
    pub fn with(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// The same schema with every top-level field optional.
    #[must_use]
    pub fn partial(&self) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .map(|f| FieldDescriptor {
                    optional: true,
                    ..f.clone()
                })
                .collect(),
        }
    }

    /// Check a JSON object against this schema.
    ///
    /// Required fields must be present and non-null, present fields must
    /// have their declared type, and undeclared fields are rejected.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaViolation`] found.
    pub fn validate(&self, object: &Map<String, Value>) -> Result<(), SchemaViolation> {
        self.validate_at("", object)
    }

    /// Check an arbitrary JSON value, which must be an object.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaViolation::NotAnObject`] for non-objects, otherwise as
    /// [`ObjectSchema::validate`].
    pub fn validate_value(&self, value: &Value) -> Result<(), SchemaViolation> {
        let object = value.as_object().ok_or(SchemaViolation::NotAnObject {
            found: json_type_name(value),
        })?;
        self.validate(object)
    }

    fn validate_at(&self, path: &str, object: &Map<String, Value>) -> Result<(), SchemaViolation> {
        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) => {
                    if !field.optional {
                        return Err(SchemaViolation::MissingField {
                            path: join_path(path, &field.name),
                        });
                    }
                }
                Some(value) => field
                    .field_type
                    .validate(&join_path(path, &field.name), value)?,
            }
        }

        if let Some(unknown) = object.keys().find(|key| !self.contains(key)) {
            return Err(SchemaViolation::UnknownField {
                path: join_path(path, unknown),
            });
        }
        Ok(())
    }
}

/// Type of an entity's `id` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdSchema {
    /// Any non-empty string.
    #[default]
    String,
    /// A UUID string.
    Uuid,
}

impl IdSchema {
    /// The equivalent field type.
    pub const fn field_type(self) -> FieldType {
        match self {
            Self::String => FieldType::String,
            Self::Uuid => FieldType::Uuid,
        }
    }

    /// Check an identifier value.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaViolation::InvalidFormat`] for empty strings or
    /// malformed UUIDs.
    pub fn validate(self, path: &str, id: &str) -> Result<(), SchemaViolation> {
        if id.is_empty() {
            return Err(SchemaViolation::InvalidFormat {
                path: path.to_owned(),
                expected: "identifier",
                reason: String::from("empty string"),
            });
        }
        match self {
            Self::String => Ok(()),
            Self::Uuid => self.field_type().validate(path, &Value::String(id.to_owned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn budget_schema() -> ObjectSchema {
        ObjectSchema::new(vec![
            FieldDescriptor::required("amount", FieldType::Number),
            FieldDescriptor::required("currency", FieldType::String),
            FieldDescriptor::optional("approved_at", FieldType::Timestamp),
        ])
    }

    #[test]
    fn accepts_valid_object() {
        let schema = budget_schema();
        assert_eq!(schema.validate_value(&json!({ "amount": 10, "currency": "EUR" })), Ok(()));
        assert_eq!(
            schema.validate_value(&json!({
                "amount": 10.5,
                "currency": "EUR",
                "approved_at": "2026-03-01T09:30:00Z"
            })),
            Ok(())
        );
        assert_eq!(
            schema.validate_value(&json!({ "amount": 1, "currency": "EUR", "approved_at": null })),
            Ok(())
        );
    }

    #[test]
    fn reports_violations() {
        let schema = budget_schema();
        assert_eq!(
            schema.validate_value(&json!({ "currency": "EUR" })),
            Err(SchemaViolation::MissingField {
                path: String::from("amount")
            })
        );
        assert_eq!(
            schema.validate_value(&json!({ "amount": "10", "currency": "EUR" })),
            Err(SchemaViolation::TypeMismatch {
                path: String::from("amount"),
                expected: "number",
                found: "string"
            })
        );
        assert_eq!(
            schema.validate_value(&json!({ "amount": 1, "currency": "EUR", "extra": true })),
            Err(SchemaViolation::UnknownField {
                path: String::from("extra")
            })
        );
        assert!(matches!(
            schema.validate_value(&json!({ "amount": 1, "currency": "EUR", "approved_at": "yesterday" })),
            Err(SchemaViolation::InvalidFormat { .. })
        ));
        assert_eq!(
            schema.validate_value(&json!([])),
            Err(SchemaViolation::NotAnObject { found: "array" })
        );
    }

    #[test]
    fn nested_paths_in_violations() {
        let schema = ObjectSchema::new(vec![FieldDescriptor::required(
            "milestones",
            FieldType::array_of(FieldType::Object(ObjectSchema::new(vec![
                FieldDescriptor::required("week", FieldType::Integer),
            ]))),
        )]);
        assert_eq!(
            schema.validate_value(&json!({ "milestones": [{ "week": 1 }, { "week": 1.5 }] })),
            Err(SchemaViolation::TypeMismatch {
                path: String::from("milestones[1].week"),
                expected: "integer",
                found: "number"
            })
        );
    }

    #[test]
    fn partial_makes_fields_optional() {
        let partial = budget_schema().partial();
        assert_eq!(partial.validate_value(&json!({})), Ok(()));
        assert!(partial.fields.iter().all(|f| f.optional));
    }

    #[test]
    fn ids() {
        assert_eq!(IdSchema::String.validate("id", "d-1"), Ok(()));
        assert!(IdSchema::String.validate("id", "").is_err());
        assert!(IdSchema::Uuid.validate("id", "d-1").is_err());
        assert_eq!(
            IdSchema::Uuid.validate("id", &Uuid::now_v7().to_string()),
            Ok(())
        );
    }

    #[test]
    fn descriptors_deserialize_from_yaml_shape() {
        let parsed: Result<ObjectSchema, _> = serde_json::from_value(json!({
            "fields": [
                { "name": "name", "type": "string" },
                { "name": "owner", "type": "string", "optional": true },
                { "name": "tags", "type": "array", "items": { "type": "string" } },
                { "name": "budget", "type": "object", "fields": [{ "name": "amount", "type": "number" }] }
            ]
        }));
        let schema = parsed.expect("schema deserializes");
        assert_eq!(schema.fields.len(), 4);
        assert_eq!(
            schema.field("tags").map(|f| &f.field_type),
            Some(&FieldType::array_of(FieldType::String))
        );
        assert_eq!(schema.field("owner").map(|f| f.optional), Some(true));
        assert_eq!(
            schema.field("budget").map(|f| f.field_type.name()),
            Some("object")
        );
    }
}
