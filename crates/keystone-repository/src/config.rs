//! Per-aggregate repository configuration.
//!
//! A [`RepositoryConfig`] describes one aggregate type: its name, the
//! document field that carries the partition key, the root entity and the
//! ordered sub-entities hanging off it. It is built once, validated, and then
//! shared read-only (usually behind an `Arc`) by every repository instance
//! for that aggregate.
//!
//! Configurations can be built in code with [`RepositoryConfig::builder`] or
//! deserialized from YAML/JSON; both paths run the same validation.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::{FieldDescriptor, FieldType, IdSchema, ObjectSchema};

/// Name of the identifier field on aggregates, items and documents.
pub const ID_FIELD: &str = "id";

/// Name of the entity type tag field on documents.
pub const TYPE_FIELD: &str = "type";

/// Name of the domain payload field on documents.
pub const PROPERTIES_FIELD: &str = "properties";

/// Validation failures for a repository configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No root entity was supplied.
    #[error("aggregate `{aggregate}` has no root entity")]
    MissingRoot {
        /// Aggregate name.
        aggregate: String,
    },

    /// An aggregate, entity, type tag or partition key name is empty.
    #[error("{what} name must not be empty")]
    EmptyName {
        /// Which name was empty.
        what: &'static str,
    },

    /// An entity has a kind that is not allowed in its position.
    #[error("entity `{entity}` is {actual}, expected {expected}")]
    WrongKind {
        /// Entity name.
        entity: String,
        /// Kind required at this position.
        expected: EntityKind,
        /// Kind declared.
        actual: EntityKind,
    },

    /// A sub-entity definition does not say whether it is single or collection.
    #[error("entity `{entity}` needs a kind (single or collection)")]
    MissingKind {
        /// Entity name.
        entity: String,
    },

    /// Two sub-entities share a name.
    #[error("duplicate entity name `{entity}`")]
    DuplicateEntity {
        /// Entity name.
        entity: String,
    },

    /// A sub-entity name clashes with `id`, the partition key or a root field.
    #[error("entity name `{entity}` collides with an existing aggregate field")]
    NameCollision {
        /// Entity name.
        entity: String,
    },

    /// Two entities share a type tag.
    #[error("type tag `{tag}` is used by more than one entity")]
    DuplicateTypeTag {
        /// The repeated tag.
        tag: String,
    },

    /// The partition key field uses a name reserved by the document layout.
    #[error("partition key field `{field}` is reserved")]
    ReservedField {
        /// Field name.
        field: String,
    },

    /// The partition key field is also declared as a root domain field.
    #[error("partition key field `{field}` is also a root domain field")]
    PartitionKeyCollision {
        /// Field name.
        field: String,
    },

    /// A root or collection entity declares `id` among its domain fields.
    #[error("entity `{entity}` declares `id` as a domain field")]
    IdRedeclared {
        /// Entity name.
        entity: String,
    },
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Aggregate identity and partitioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateConfig {
    /// Aggregate type name (e.g. `project`).
    pub name: String,
    /// Document field that carries the partition key (the aggregate id).
    pub partition_key_field: String,
}

/// Position of an entity inside its aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// The aggregate root. Exactly one per aggregate.
    Root,
    /// At most one value per aggregate, stored under the entity name.
    Single,
    /// Zero or more items per aggregate, each keyed by its own id.
    Collection,
}

impl EntityKind {
    /// Lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Single => "single",
            Self::Collection => "collection",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entity of an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityConfig {
    /// Entity name; for sub-entities also the aggregate field holding it.
    pub name: String,
    /// Position inside the aggregate.
    pub kind: EntityKind,
    /// Value written to the document `type` field.
    pub type_tag: String,
    /// Type of the `id` field.
    pub id_schema: IdSchema,
    /// Domain fields (everything except `id`).
    pub domain_schema: ObjectSchema,
}

impl EntityConfig {
    fn new(name: impl Into<String>, kind: EntityKind, domain_schema: ObjectSchema) -> Self {
        let name = name.into();
        Self {
            type_tag: name.clone(),
            name,
            kind,
            id_schema: IdSchema::String,
            domain_schema,
        }
    }

    /// A root entity whose type tag defaults to its name.
    pub fn root(name: impl Into<String>, domain_schema: ObjectSchema) -> Self {
        Self::new(name, EntityKind::Root, domain_schema)
    }

    /// A single-valued sub-entity.
    pub fn single(name: impl Into<String>, domain_schema: ObjectSchema) -> Self {
        Self::new(name, EntityKind::Single, domain_schema)
    }

    /// A collection-valued sub-entity.
    pub fn collection(name: impl Into<String>, domain_schema: ObjectSchema) -> Self {
        Self::new(name, EntityKind::Collection, domain_schema)
    }

    /// Override the document type tag.
    #[must_use]
    pub fn with_type_tag(mut self, type_tag: impl Into<String>) -> Self {
        self.type_tag = type_tag.into();
        self
    }

    /// Override the id type.
    #[must_use]
    pub const fn with_id_schema(mut self, id_schema: IdSchema) -> Self {
        self.id_schema = id_schema;
        self
    }

    /// Schema of one value as it appears inside the aggregate.
    ///
    /// Collection items carry their `id` next to the domain fields; root
    /// and single values are just the domain fields.
    pub fn value_schema(&self) -> ObjectSchema {
        match self.kind {
            EntityKind::Collection => {
                let mut fields = Vec::with_capacity(self.domain_schema.fields.len().saturating_add(1));
                fields.push(FieldDescriptor::required(ID_FIELD, self.id_schema.field_type()));
                fields.extend(self.domain_schema.fields.iter().cloned());
                ObjectSchema::new(fields)
            }
            EntityKind::Root | EntityKind::Single => self.domain_schema.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Repository configuration
// ---------------------------------------------------------------------------

/// Validated configuration of one aggregate type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RepositoryDefinition")]
pub struct RepositoryConfig {
    aggregate: AggregateConfig,
    root: EntityConfig,
    entities: Vec<EntityConfig>,
}

impl RepositoryConfig {
    /// Start building a configuration for aggregate `name`.
    pub fn builder(
        name: impl Into<String>,
        partition_key_field: impl Into<String>,
    ) -> RepositoryConfigBuilder {
        RepositoryConfigBuilder {
            aggregate: AggregateConfig {
                name: name.into(),
                partition_key_field: partition_key_field.into(),
            },
            root: None,
            entities: Vec::new(),
        }
    }

    /// Aggregate identity.
    pub const fn aggregate(&self) -> &AggregateConfig {
        &self.aggregate
    }

    /// Aggregate type name.
    pub fn name(&self) -> &str {
        &self.aggregate.name
    }

    /// Document field carrying the partition key.
    pub fn partition_key_field(&self) -> &str {
        &self.aggregate.partition_key_field
    }

    /// The root entity.
    pub const fn root(&self) -> &EntityConfig {
        &self.root
    }

    /// Sub-entities in configuration order.
    pub fn entities(&self) -> &[EntityConfig] {
        &self.entities
    }

    /// Look up a sub-entity by name.
    pub fn entity(&self, name: &str) -> Option<&EntityConfig> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Schema of the root document as a flat object:
    /// `id`, the partition key and the root domain fields.
    pub fn root_schema(&self) -> ObjectSchema {
        let id_type = self.root.id_schema.field_type();
        let mut fields = Vec::with_capacity(self.root.domain_schema.fields.len().saturating_add(2));
        fields.push(FieldDescriptor::required(ID_FIELD, id_type.clone()));
        fields.push(FieldDescriptor::required(
            self.aggregate.partition_key_field.clone(),
            id_type,
        ));
        fields.extend(self.root.domain_schema.fields.iter().cloned());
        ObjectSchema::new(fields)
    }

    /// Schema of the whole aggregate: `id`, root domain fields and one field
    /// per sub-entity (an optional object for singles, an optional array of
    /// items for collections).
    pub fn aggregate_schema(&self) -> ObjectSchema {
        let mut fields = Vec::with_capacity(
            self.root
                .domain_schema
                .fields
                .len()
                .saturating_add(self.entities.len())
                .saturating_add(1),
        );
        fields.push(FieldDescriptor::required(ID_FIELD, self.root.id_schema.field_type()));
        fields.extend(self.root.domain_schema.fields.iter().cloned());
        for entity in &self.entities {
            let value = FieldType::Object(entity.value_schema());
            let field_type = match entity.kind {
                EntityKind::Collection => FieldType::array_of(value),
                EntityKind::Root | EntityKind::Single => value,
            };
            fields.push(FieldDescriptor::optional(entity.name.clone(), field_type));
        }
        ObjectSchema::new(fields)
    }

    /// Schema for search results and filters: the aggregate schema with every
    /// top-level field optional.
    pub fn search_schema(&self) -> ObjectSchema {
        self.aggregate_schema().partial()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let aggregate = &self.aggregate;
        if aggregate.name.is_empty() {
            return Err(ConfigError::EmptyName { what: "aggregate" });
        }
        let key = aggregate.partition_key_field.as_str();
        if key.is_empty() {
            return Err(ConfigError::EmptyName {
                what: "partition key",
            });
        }
        if [ID_FIELD, TYPE_FIELD, PROPERTIES_FIELD].contains(&key) {
            return Err(ConfigError::ReservedField {
                field: key.to_owned(),
            });
        }

        let root = &self.root;
        if root.kind != EntityKind::Root {
            return Err(ConfigError::WrongKind {
                entity: root.name.clone(),
                expected: EntityKind::Root,
                actual: root.kind,
            });
        }
        if root.domain_schema.contains(key) {
            return Err(ConfigError::PartitionKeyCollision {
                field: key.to_owned(),
            });
        }
        if root.domain_schema.contains(ID_FIELD) {
            return Err(ConfigError::IdRedeclared {
                entity: root.name.clone(),
            });
        }

        let mut names = HashSet::new();
        let mut tags = HashSet::new();
        for entity in std::iter::once(root).chain(&self.entities) {
            if entity.name.is_empty() {
                return Err(ConfigError::EmptyName { what: "entity" });
            }
            if entity.type_tag.is_empty() {
                return Err(ConfigError::EmptyName { what: "type tag" });
            }
            if !tags.insert(entity.type_tag.as_str()) {
                return Err(ConfigError::DuplicateTypeTag {
                    tag: entity.type_tag.clone(),
                });
            }
        }

        for entity in &self.entities {
            if entity.kind == EntityKind::Root {
                return Err(ConfigError::WrongKind {
                    entity: entity.name.clone(),
                    expected: EntityKind::Single,
                    actual: entity.kind,
                });
            }
            if entity.name == ID_FIELD
                || entity.name == key
                || root.domain_schema.contains(&entity.name)
            {
                return Err(ConfigError::NameCollision {
                    entity: entity.name.clone(),
                });
            }
            if !names.insert(entity.name.as_str()) {
                return Err(ConfigError::DuplicateEntity {
                    entity: entity.name.clone(),
                });
            }
            if entity.kind == EntityKind::Collection && entity.domain_schema.contains(ID_FIELD) {
                return Err(ConfigError::IdRedeclared {
                    entity: entity.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Builder returned by [`RepositoryConfig::builder`].
#[derive(Debug, Clone)]
pub struct RepositoryConfigBuilder {
    aggregate: AggregateConfig,
    root: Option<EntityConfig>,
    entities: Vec<EntityConfig>,
}

impl RepositoryConfigBuilder {
    /// Set the root entity.
    #[must_use]
    pub fn root(mut self, root: EntityConfig) -> Self {
        self.root = Some(root);
        self
    }

    /// Append a sub-entity.
    #[must_use]
    pub fn entity(mut self, entity: EntityConfig) -> Self {
        self.entities.push(entity);
        self
    }

    /// Append a single-valued sub-entity with default tag and id type.
    #[must_use]
    pub fn single(self, name: impl Into<String>, domain_schema: ObjectSchema) -> Self {
        self.entity(EntityConfig::single(name, domain_schema))
    }

    /// Append a collection sub-entity with default tag and id type.
    #[must_use]
    pub fn collection(self, name: impl Into<String>, domain_schema: ObjectSchema) -> Self {
        self.entity(EntityConfig::collection(name, domain_schema))
    }

    /// Validate and finish the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the root is missing or has the wrong
    /// kind, when names or type tags collide, or when `id` is redeclared.
    pub fn build(self) -> Result<RepositoryConfig, ConfigError> {
        let root = self.root.ok_or_else(|| ConfigError::MissingRoot {
            aggregate: self.aggregate.name.clone(),
        })?;
        let config = RepositoryConfig {
            aggregate: self.aggregate,
            root,
            entities: self.entities,
        };
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Declarative form
// ---------------------------------------------------------------------------

/// Unvalidated configuration as written in a configuration file.
///
/// ```text
/// name: project
/// partition_key_field: project_id
/// root:
///   name: project
///   fields:
///     - { name: name, type: string }
/// entities:
///   - name: deliverables
///     kind: collection
///     fields:
///       - { name: title, type: string }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryDefinition {
    /// Aggregate name.
    pub name: String,
    /// Partition key field.
    pub partition_key_field: String,
    /// Root entity; `kind` may be omitted.
    pub root: EntityDefinition,
    /// Sub-entities in order.
    #[serde(default)]
    pub entities: Vec<EntityDefinition>,
}

/// Unvalidated entity definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityDefinition {
    /// Entity name.
    pub name: String,
    /// Entity kind; defaults to root for the root entry.
    #[serde(default)]
    pub kind: Option<EntityKind>,
    /// Document type tag; defaults to the name.
    #[serde(default)]
    pub type_tag: Option<String>,
    /// Id type.
    #[serde(default)]
    pub id: IdSchema,
    /// Domain fields.
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl EntityDefinition {
    fn into_entity(self, kind: EntityKind) -> EntityConfig {
        let type_tag = self.type_tag.unwrap_or_else(|| self.name.clone());
        EntityConfig {
            name: self.name,
            kind,
            type_tag,
            id_schema: self.id,
            domain_schema: ObjectSchema::new(self.fields),
        }
    }
}

impl TryFrom<RepositoryDefinition> for RepositoryConfig {
    type Error = ConfigError;

    fn try_from(definition: RepositoryDefinition) -> Result<Self, Self::Error> {
        let root_kind = definition.root.kind.unwrap_or(EntityKind::Root);
        let mut builder = Self::builder(definition.name, definition.partition_key_field)
            .root(definition.root.into_entity(root_kind));
        for entity in definition.entities {
            let Some(kind) = entity.kind else {
                return Err(ConfigError::MissingKind {
                    entity: entity.name,
                });
            };
            builder = builder.entity(entity.into_entity(kind));
        }
        builder.build()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn project_root() -> EntityConfig {
        EntityConfig::root(
            "project",
            ObjectSchema::new(vec![
                FieldDescriptor::required("name", FieldType::String),
                FieldDescriptor::optional("owner", FieldType::String),
            ]),
        )
    }

    fn budget() -> ObjectSchema {
        ObjectSchema::new(vec![FieldDescriptor::required("amount", FieldType::Number)])
    }

    fn deliverable() -> ObjectSchema {
        ObjectSchema::new(vec![FieldDescriptor::required("title", FieldType::String)])
    }

    fn project_config() -> Result<RepositoryConfig, ConfigError> {
        RepositoryConfig::builder("project", "project_id")
            .root(project_root())
            .single("budget", budget())
            .collection("deliverables", deliverable())
            .build()
    }

    #[test]
    fn derives_schemas() {
        let config = project_config().expect("valid config");

        let root_schema = config.root_schema();
        let root: Vec<&str> = root_schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(root, ["id", "project_id", "name", "owner"]);

        let aggregate = config.aggregate_schema();
        let names: Vec<&str> = aggregate.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["id", "name", "owner", "budget", "deliverables"]);
        assert_eq!(
            aggregate.field("budget").map(|f| (&f.field_type, f.optional)),
            Some((&FieldType::Object(budget()), true))
        );
        assert!(matches!(
            aggregate.field("deliverables").map(|f| &f.field_type),
            Some(FieldType::Array { .. })
        ));

        let search = config.search_schema();
        assert!(search.fields.iter().all(|f| f.optional));
        assert_eq!(search.validate_value(&json!({ "name": "Apollo" })), Ok(()));
    }

    #[test]
    fn rejects_invalid_configurations() {
        let missing_root = RepositoryConfig::builder("project", "project_id").build();
        assert!(matches!(missing_root, Err(ConfigError::MissingRoot { .. })));

        let duplicate_tag = RepositoryConfig::builder("project", "project_id")
            .root(project_root())
            .entity(EntityConfig::single("budget", budget()).with_type_tag("project"))
            .build();
        assert_eq!(
            duplicate_tag,
            Err(ConfigError::DuplicateTypeTag {
                tag: String::from("project")
            })
        );

        let key_collision = RepositoryConfig::builder("project", "name")
            .root(project_root())
            .build();
        assert!(matches!(key_collision, Err(ConfigError::PartitionKeyCollision { .. })));

        let reserved = RepositoryConfig::builder("project", "type")
            .root(project_root())
            .build();
        assert!(matches!(reserved, Err(ConfigError::ReservedField { .. })));

        let name_collision = RepositoryConfig::builder("project", "project_id")
            .root(project_root())
            .single("owner", budget())
            .build();
        assert!(matches!(name_collision, Err(ConfigError::NameCollision { .. })));

        let duplicate = RepositoryConfig::builder("project", "project_id")
            .root(project_root())
            .single("budget", budget())
            .entity(EntityConfig::collection("budget", deliverable()).with_type_tag("budget-line"))
            .build();
        assert!(matches!(duplicate, Err(ConfigError::DuplicateEntity { .. })));

        let id_redeclared = RepositoryConfig::builder("project", "project_id")
            .root(project_root())
            .collection(
                "deliverables",
                deliverable().with(FieldDescriptor::required("id", FieldType::String)),
            )
            .build();
        assert!(matches!(id_redeclared, Err(ConfigError::IdRedeclared { .. })));

        let nested_root = RepositoryConfig::builder("project", "project_id")
            .root(project_root())
            .entity(EntityConfig::root("phase", budget()))
            .build();
        assert!(matches!(nested_root, Err(ConfigError::WrongKind { .. })));
    }

    #[test]
    fn deserializes_through_validation() {
        let parsed: Result<RepositoryConfig, _> = serde_json::from_value(json!({
            "name": "project",
            "partition_key_field": "project_id",
            "root": { "name": "project", "fields": [{ "name": "name", "type": "string" }] },
            "entities": [
                { "name": "budget", "kind": "single", "fields": [{ "name": "amount", "type": "number" }] },
                { "name": "deliverables", "kind": "collection", "type_tag": "deliverable", "id": "uuid",
                  "fields": [{ "name": "title", "type": "string" }] }
            ]
        }));
        let config = parsed.expect("definition is valid");
        assert_eq!(config.partition_key_field(), "project_id");
        let deliverables = config.entity("deliverables").expect("entity exists");
        assert_eq!(deliverables.type_tag, "deliverable");
        assert_eq!(deliverables.id_schema, IdSchema::Uuid);
        assert_eq!(deliverables.kind, EntityKind::Collection);

        let missing_kind: Result<RepositoryConfig, _> = serde_json::from_value(json!({
            "name": "project",
            "partition_key_field": "project_id",
            "root": { "name": "project" },
            "entities": [{ "name": "budget" }]
        }));
        let message = missing_kind.expect_err("kind is required").to_string();
        assert!(message.contains("needs a kind"), "{message}");
    }
}
