//! Stored documents and in-memory aggregates.
//!
//! A [`Document`] is the unit the store sees:
//!
//! ```text
//! { "id": "budget", "<partition key>": "p-1", "type": "budget", "properties": { ... } }
//! ```
//!
//! An [`Aggregate`] is the unit callers see: a JSON object with `id`, the
//! root's domain fields and one field per sub-entity.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{ID_FIELD, PROPERTIES_FIELD, TYPE_FIELD};
use crate::schema::{SchemaViolation, json_type_name};

/// One flat, partition-scoped record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Document id, unique within its partition.
    pub id: String,
    /// Partition key value (the owning aggregate id).
    pub partition: String,
    /// Type tag of the owning entity.
    pub entity_type: String,
    /// Domain payload.
    pub properties: Map<String, Value>,
}

impl Document {
    /// Render the stored JSON form, naming the partition key `partition_key_field`.
    pub fn to_json(&self, partition_key_field: &str) -> Value {
        let mut object = Map::with_capacity(4);
        object.insert(ID_FIELD.to_owned(), Value::String(self.id.clone()));
        object.insert(
            partition_key_field.to_owned(),
            Value::String(self.partition.clone()),
        );
        object.insert(TYPE_FIELD.to_owned(), Value::String(self.entity_type.clone()));
        object.insert(
            PROPERTIES_FIELD.to_owned(),
            Value::Object(self.properties.clone()),
        );
        Value::Object(object)
    }

    /// Parse the stored JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaViolation`] when the value is not an object, when
    /// `id`, the partition key or `type` are missing or not strings, or when
    /// `properties` is present but not an object.
    pub fn from_json(value: &Value, partition_key_field: &str) -> Result<Self, SchemaViolation> {
        let object = value.as_object().ok_or(SchemaViolation::NotAnObject {
            found: json_type_name(value),
        })?;

        let properties = match object.get(PROPERTIES_FIELD) {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                return Err(SchemaViolation::TypeMismatch {
                    path: PROPERTIES_FIELD.to_owned(),
                    expected: "object",
                    found: json_type_name(other),
                });
            }
        };

        Ok(Self {
            id: string_field(object, ID_FIELD)?,
            partition: string_field(object, partition_key_field)?,
            entity_type: string_field(object, TYPE_FIELD)?,
            properties,
        })
    }
}

fn string_field(object: &Map<String, Value>, name: &str) -> Result<String, SchemaViolation> {
    match object.get(name) {
        Some(Value::String(text)) => Ok(text.clone()),
        None | Some(Value::Null) => Err(SchemaViolation::MissingField {
            path: name.to_owned(),
        }),
        Some(other) => Err(SchemaViolation::TypeMismatch {
            path: name.to_owned(),
            expected: "string",
            found: json_type_name(other),
        }),
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// A hydrated aggregate: root fields plus sub-entity fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Aggregate(Map<String, Value>);

impl Aggregate {
    /// Wrap a JSON object.
    pub const fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Convert any serializable domain type.
    ///
    /// # Errors
    ///
    /// Returns the serde error, or a custom one if `value` does not
    /// serialize to a JSON object.
    pub fn from_typed<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self(map)),
            other => Err(serde::ser::Error::custom(format!(
                "aggregate must serialize to an object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Convert into a deserializable domain type.
    ///
    /// # Errors
    ///
    /// Returns the serde error if the shape does not match `T`.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.0))
    }

    /// The aggregate id, if present and a string.
    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    /// One field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// All fields.
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Unwrap into the JSON object.
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Aggregate {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl From<Aggregate> for Value {
    fn from(aggregate: Aggregate) -> Self {
        Self::Object(aggregate.0)
    }
}

impl TryFrom<Value> for Aggregate {
    type Error = SchemaViolation;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(SchemaViolation::NotAnObject {
                found: json_type_name(&other),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn document_json_layout() {
        let document = Document {
            id: String::from("budget"),
            partition: String::from("p-1"),
            entity_type: String::from("budget"),
            properties: json!({ "amount": 10 }).as_object().cloned().unwrap_or_default(),
        };
        let stored = document.to_json("project_id");
        assert_eq!(
            stored,
            json!({
                "id": "budget",
                "project_id": "p-1",
                "type": "budget",
                "properties": { "amount": 10 }
            })
        );
        assert_eq!(Document::from_json(&stored, "project_id"), Ok(document));
    }

    #[test]
    fn malformed_documents() {
        assert_eq!(
            Document::from_json(&json!("x"), "project_id"),
            Err(SchemaViolation::NotAnObject { found: "string" })
        );
        assert_eq!(
            Document::from_json(&json!({ "id": "a", "type": "project" }), "project_id"),
            Err(SchemaViolation::MissingField {
                path: String::from("project_id")
            })
        );
        assert!(matches!(
            Document::from_json(
                &json!({ "id": "a", "project_id": "a", "type": "project", "properties": [] }),
                "project_id"
            ),
            Err(SchemaViolation::TypeMismatch { .. })
        ));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Project {
        id: String,
        name: String,
    }

    #[test]
    fn typed_conversion() {
        let project = Project {
            id: String::from("p-1"),
            name: String::from("Apollo"),
        };
        let aggregate = Aggregate::from_typed(&project).expect("serializes");
        assert_eq!(aggregate.id(), Some("p-1"));
        assert_eq!(aggregate.into_typed::<Project>().expect("deserializes"), project);
        assert!(Aggregate::from_typed(&42).is_err());
    }
}
