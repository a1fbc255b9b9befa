//! Aggregate ↔ document conversion.
//!
//! An aggregate with id `A` is stored as:
//!
//! | Document | `id` | partition | `type` | `properties` |
//! |----------|------|-----------|--------|--------------|
//! | root | `A` | `A` | root tag | root domain fields |
//! | single entity `e` | `e` | `A` | `e` tag | the entity value |
//! | collection item `i` of `c` | `i.id` | `A` | `c` tag | `i` without `id` |
//!
//! [`split`] produces that list; [`merge_partition`] and [`merge_all`]
//! rebuild aggregates from it. For every valid aggregate whose sub-entity
//! fields are all present, `merge(split(a)) == a`.
//!
//! Document ids share one namespace per partition: the aggregate id, every
//! single entity name and every collection item id must be distinct, so no
//! document overwrites another in the store.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::{EntityConfig, EntityKind, ID_FIELD, RepositoryConfig};
use crate::document::{Aggregate, Document};
use crate::error::RepositoryError;
use crate::schema::{SchemaViolation, json_type_name};

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Decompose `aggregate` into its documents.
///
/// Emission order is the root, then sub-entities in configuration order,
/// collection items in array order. Sub-entity fields that are absent,
/// `null` or empty emit nothing. The input is not modified.
///
/// # Errors
///
/// Returns [`RepositoryError::Encode`] naming the offending entity when any
/// part of the aggregate violates its schema.
pub fn split(config: &RepositoryConfig, aggregate: &Aggregate) -> Result<Vec<Document>, RepositoryError> {
    let root = config.root();
    let fields = aggregate.fields();

    let id = match fields.get(ID_FIELD) {
        Some(Value::String(id)) => id.as_str(),
        Some(other) => {
            return Err(encode_error(
                root,
                SchemaViolation::TypeMismatch {
                    path: ID_FIELD.to_owned(),
                    expected: "string",
                    found: json_type_name(other),
                },
            ));
        }
        None => {
            return Err(encode_error(
                root,
                SchemaViolation::MissingField {
                    path: ID_FIELD.to_owned(),
                },
            ));
        }
    };
    root.id_schema
        .validate(ID_FIELD, id)
        .map_err(|v| encode_error(root, v))?;

    let root_properties: Map<String, Value> = fields
        .iter()
        .filter(|(key, _)| key.as_str() != ID_FIELD && config.entity(key).is_none())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    root.domain_schema
        .validate(&root_properties)
        .map_err(|v| encode_error(root, v))?;

    if is_single_name(config, id) {
        return Err(encode_error(root, duplicate_id(id)));
    }

    let mut documents = vec![Document {
        id: id.to_owned(),
        partition: id.to_owned(),
        entity_type: root.type_tag.clone(),
        properties: root_properties,
    }];

    let mut item_ids = HashSet::new();
    for entity in config.entities() {
        match (entity.kind, fields.get(&entity.name)) {
            (_, None | Some(Value::Null)) => {}
            (EntityKind::Single, Some(value)) => documents.push(encode_single(entity, id, value)?),
            (EntityKind::Collection, Some(Value::Array(items))) => {
                for item in items {
                    let document = encode_item(entity, id, item)?;
                    if is_reserved_id(config, id, &document.id) || !item_ids.insert(document.id.clone()) {
                        return Err(encode_error(entity, duplicate_id(&document.id)));
                    }
                    documents.push(document);
                }
            }
            (EntityKind::Root | EntityKind::Collection, Some(other)) => {
                return Err(encode_error(
                    entity,
                    SchemaViolation::TypeMismatch {
                        path: entity.name.clone(),
                        expected: "array",
                        found: json_type_name(other),
                    },
                ));
            }
        }
    }

    debug!(
        aggregate = %config.name(),
        id,
        documents = documents.len(),
        "split aggregate"
    );
    Ok(documents)
}

/// Build the document for a single-valued entity of aggregate `partition`.
///
/// # Errors
///
/// Returns [`RepositoryError::Encode`] when `value` violates the entity's
/// domain schema.
pub fn encode_single(entity: &EntityConfig, partition: &str, value: &Value) -> Result<Document, RepositoryError> {
    entity
        .domain_schema
        .validate_value(value)
        .map_err(|v| encode_error(entity, v))?;
    Ok(Document {
        id: entity.name.clone(),
        partition: partition.to_owned(),
        entity_type: entity.type_tag.clone(),
        properties: value.as_object().cloned().unwrap_or_default(),
    })
}

/// Build the document for one collection item of aggregate `partition`.
///
/// # Errors
///
/// Returns [`RepositoryError::Encode`] when the item is not an object, has
/// no valid `id`, or violates the entity's domain schema.
pub fn encode_item(entity: &EntityConfig, partition: &str, item: &Value) -> Result<Document, RepositoryError> {
    entity
        .value_schema()
        .validate_value(item)
        .map_err(|v| encode_error(entity, v))?;
    let mut properties = item.as_object().cloned().unwrap_or_default();
    let id = match properties.remove(ID_FIELD) {
        Some(Value::String(id)) => id,
        _ => {
            return Err(encode_error(
                entity,
                SchemaViolation::MissingField {
                    path: ID_FIELD.to_owned(),
                },
            ));
        }
    };
    entity
        .id_schema
        .validate(ID_FIELD, &id)
        .map_err(|v| encode_error(entity, v))?;
    Ok(Document {
        id,
        partition: partition.to_owned(),
        entity_type: entity.type_tag.clone(),
        properties,
    })
}

/// Whether `id` belongs to the root or a single entity of aggregate
/// `partition`, and so cannot be used by a collection item.
pub fn is_reserved_id(config: &RepositoryConfig, partition: &str, id: &str) -> bool {
    id == partition || is_single_name(config, id)
}

fn is_single_name(config: &RepositoryConfig, id: &str) -> bool {
    config
        .entities()
        .iter()
        .any(|entity| entity.kind == EntityKind::Single && entity.name == id)
}

pub(crate) fn duplicate_id(id: &str) -> SchemaViolation {
    SchemaViolation::DuplicateId { id: id.to_owned() }
}

pub(crate) fn encode_error(entity: &EntityConfig, violation: SchemaViolation) -> RepositoryError {
    RepositoryError::Encode {
        entity: entity.name.clone(),
        violation,
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Parse raw store values into documents.
///
/// # Errors
///
/// Returns [`RepositoryError::Decode`] for values that are not well-formed
/// documents of this aggregate.
pub fn decode_documents(config: &RepositoryConfig, values: &[Value]) -> Result<Vec<Document>, RepositoryError> {
    values
        .iter()
        .map(|value| {
            Document::from_json(value, config.partition_key_field()).map_err(|violation| {
                RepositoryError::Decode {
                    entity: config.name().to_owned(),
                    violation,
                }
            })
        })
        .collect()
}

/// Rebuild the aggregate-side value of one entity document.
///
/// Single values are the properties themselves; collection items get their
/// `id` back as the first field.
///
/// # Errors
///
/// Returns [`RepositoryError::Decode`] when the properties violate the
/// entity's domain schema or the id violates its id schema.
pub fn decode_entity(entity: &EntityConfig, document: &Document) -> Result<Value, RepositoryError> {
    let decode_error = |violation| RepositoryError::Decode {
        entity: entity.name.clone(),
        violation,
    };
    entity
        .domain_schema
        .validate(&document.properties)
        .map_err(decode_error)?;

    match entity.kind {
        EntityKind::Collection => {
            entity
                .id_schema
                .validate(ID_FIELD, &document.id)
                .map_err(decode_error)?;
            let mut item = Map::with_capacity(document.properties.len().saturating_add(1));
            item.insert(ID_FIELD.to_owned(), Value::String(document.id.clone()));
            item.extend(document.properties.iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(Value::Object(item))
        }
        EntityKind::Root | EntityKind::Single => Ok(Value::Object(document.properties.clone())),
    }
}

/// Rebuild the aggregate stored in `partition`.
///
/// Only documents whose partition equals `partition` are considered. When
/// `items` is given, only the named sub-entities are hydrated; the others
/// are left out of the result.
///
/// # Errors
///
/// Returns [`RepositoryError::RootNotFound`] when the partition has no root
/// document, and [`RepositoryError::Decode`] when a document does not match
/// its entity's schema.
pub fn merge_partition(
    config: &RepositoryConfig,
    documents: &[Document],
    partition: &str,
    items: Option<&[&str]>,
) -> Result<Aggregate, RepositoryError> {
    let in_partition: Vec<&Document> = documents.iter().filter(|d| d.partition == partition).collect();
    assemble(config, partition, &in_partition, items)?.ok_or_else(|| RepositoryError::RootNotFound {
        aggregate: config.name().to_owned(),
        partition: partition.to_owned(),
    })
}

/// Rebuild every aggregate present in `documents`.
///
/// Documents are grouped by partition in first-seen order. Partitions with
/// no root document are skipped.
///
/// # Errors
///
/// Returns [`RepositoryError::Decode`] when a document does not match its
/// entity's schema.
pub fn merge_all(
    config: &RepositoryConfig,
    documents: &[Document],
    items: Option<&[&str]>,
) -> Result<Vec<Aggregate>, RepositoryError> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&Document>> = HashMap::new();
    for document in documents {
        let group = groups.entry(document.partition.as_str()).or_insert_with(|| {
            order.push(document.partition.as_str());
            Vec::new()
        });
        group.push(document);
    }

    let mut aggregates = Vec::with_capacity(order.len());
    for partition in order {
        let group = groups.get(partition).map(Vec::as_slice).unwrap_or_default();
        match assemble(config, partition, group, items)? {
            Some(aggregate) => aggregates.push(aggregate),
            None => debug!(
                aggregate = %config.name(),
                partition,
                documents = group.len(),
                "skipping partition without root document"
            ),
        }
    }
    Ok(aggregates)
}

/// Assemble one aggregate from the documents of a single partition.
/// `None` when there is no root document.
fn assemble(
    config: &RepositoryConfig,
    partition: &str,
    documents: &[&Document],
    items: Option<&[&str]>,
) -> Result<Option<Aggregate>, RepositoryError> {
    let root = config.root();
    let Some(root_document) = documents.iter().find(|d| d.entity_type == root.type_tag) else {
        return Ok(None);
    };
    root.domain_schema
        .validate(&root_document.properties)
        .map_err(|violation| RepositoryError::Decode {
            entity: root.name.clone(),
            violation,
        })?;

    let mut fields = Map::with_capacity(
        root_document
            .properties
            .len()
            .saturating_add(config.entities().len())
            .saturating_add(1),
    );
    fields.insert(ID_FIELD.to_owned(), Value::String(partition.to_owned()));
    fields.extend(
        root_document
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );

    let wanted = config
        .entities()
        .iter()
        .filter(|e| items.is_none_or(|names| names.contains(&e.name.as_str())));
    for entity in wanted {
        let value = match entity.kind {
            EntityKind::Single => documents
                .iter()
                .find(|d| d.entity_type == entity.type_tag && d.id == entity.name)
                .map(|d| decode_entity(entity, d))
                .transpose()?
                .unwrap_or(Value::Null),
            EntityKind::Collection => Value::Array(
                documents
                    .iter()
                    .filter(|d| d.entity_type == entity.type_tag)
                    .map(|d| decode_entity(entity, d))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            EntityKind::Root => continue,
        };
        fields.insert(entity.name.clone(), value);
    }
    Ok(Some(Aggregate::new(fields)))
}
