//! The generic aggregate repository.
//!
//! A [`Repository`] ties one [`RepositoryConfig`] to a [`DocumentStore`] and
//! a [`SecurityPredicate`]. It is stateless apart from those handles, so
//! clones are cheap when the store is (`Arc`, connection pools) and may be
//! shared across tasks.
//!
//! Whole-aggregate operations go through the codec. Entity-scoped
//! operations read and write a single document directly, without loading or
//! checking the rest of the aggregate.
//!
//! Writes are not atomic: an `upsert` that fails half way leaves the
//! documents written so far in place, and `delete` removes the root
//! document only.

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use keystone_condition::{Condition, interpret, parse_filter};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::{EntityConfig, EntityKind, RepositoryConfig, TYPE_FIELD};
use crate::document::{Aggregate, Document};
use crate::error::RepositoryError;
use crate::security::SecurityPredicate;
use crate::settings::{MalformedFilterPolicy, RepositorySettings};
use crate::store::DocumentStore;

/// Aggregate repository over a document store.
#[derive(Debug, Clone)]
pub struct Repository<S, P> {
    config: Arc<RepositoryConfig>,
    store: S,
    security: P,
    settings: RepositorySettings,
}

impl<S: DocumentStore, P: SecurityPredicate> Repository<S, P> {
    /// Create a repository with default settings.
    pub fn new(config: Arc<RepositoryConfig>, store: S, security: P) -> Self {
        Self {
            config,
            store,
            security,
            settings: RepositorySettings::default(),
        }
    }

    /// Replace the settings.
    #[must_use]
    pub fn with_settings(mut self, settings: RepositorySettings) -> Self {
        self.settings = settings;
        self
    }

    /// The aggregate configuration.
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The active settings.
    pub const fn settings(&self) -> &RepositorySettings {
        &self.settings
    }

    // -----------------------------------------------------------------------
    // Whole aggregates
    // -----------------------------------------------------------------------

    /// Load and assemble the aggregate `id`.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] when the partition is empty,
    /// [`RepositoryError::RootNotFound`] when it has documents but no root,
    /// [`RepositoryError::Decode`] for documents that do not match their
    /// schema, and [`RepositoryError::Store`] for store failures.
    pub async fn get_by_id(&self, id: &str) -> Result<Aggregate, RepositoryError> {
        self.load(id, None).await
    }

    /// Load the aggregate `id`, hydrating only the named sub-entities.
    ///
    /// # Errors
    ///
    /// As [`Repository::get_by_id`], plus [`RepositoryError::UnknownEntity`]
    /// when `items` names an entity the aggregate does not have.
    pub async fn get_partial(&self, id: &str, items: &[&str]) -> Result<Aggregate, RepositoryError> {
        if let Some(unknown) = items.iter().find(|name| self.config.entity(name).is_none()) {
            return Err(RepositoryError::UnknownEntity {
                aggregate: self.config.name().to_owned(),
                entity: (*unknown).to_owned(),
            });
        }
        self.load(id, Some(items)).await
    }

    async fn load(&self, id: &str, items: Option<&[&str]>) -> Result<Aggregate, RepositoryError> {
        let values = self.store.query(&Map::new(), Some(id)).await?;
        if values.is_empty() {
            return Err(RepositoryError::NotFound {
                aggregate: self.config.name().to_owned(),
                id: id.to_owned(),
            });
        }
        let documents = codec::decode_documents(&self.config, &values)?;
        debug!(
            aggregate = %self.config.name(),
            id,
            documents = documents.len(),
            "loaded partition"
        );
        codec::merge_partition(&self.config, &documents, id, items)
    }

    /// Split `aggregate` into documents and write them all.
    ///
    /// Documents no longer produced by the aggregate (removed collection
    /// items, a single set to `null`) are not deleted.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::Encode`] before anything is written when the
    /// aggregate violates its schema, otherwise the first store failure.
    pub async fn upsert(&self, aggregate: &Aggregate) -> Result<(), RepositoryError> {
        let documents = codec::split(&self.config, aggregate)?;
        let concurrency = self.settings.write_concurrency.max(1);

        if concurrency == 1 {
            for document in &documents {
                self.write(document).await?;
            }
        } else {
            stream::iter(documents.iter().map(|document| self.write(document)))
                .buffer_unordered(concurrency)
                .try_collect::<()>()
                .await?;
        }

        info!(
            aggregate = %self.config.name(),
            id = aggregate.id().unwrap_or_default(),
            documents = documents.len(),
            concurrency,
            "upserted aggregate"
        );
        Ok(())
    }

    /// Delete the root document of aggregate `id`.
    ///
    /// Sub-entity documents stay in the store; without a root they are
    /// invisible to `get_by_id` (which reports `RootNotFound`) and `search`.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::Store`] on store failure.
    pub async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.store.delete(id, id).await?;
        info!(aggregate = %self.config.name(), id, "deleted aggregate root");
        Ok(())
    }

    async fn write(&self, document: &Document) -> Result<(), RepositoryError> {
        let body = document.to_json(self.config.partition_key_field());
        self.store
            .upsert(&document.id, &document.partition, &body)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Single entities and collection items
    // -----------------------------------------------------------------------

    fn entity(&self, name: &str, expected: EntityKind) -> Result<&EntityConfig, RepositoryError> {
        let entity = self
            .config
            .entity(name)
            .ok_or_else(|| RepositoryError::UnknownEntity {
                aggregate: self.config.name().to_owned(),
                entity: name.to_owned(),
            })?;
        if entity.kind != expected {
            return Err(RepositoryError::EntityKind {
                entity: name.to_owned(),
                expected,
                actual: entity.kind,
            });
        }
        Ok(entity)
    }

    fn decode(&self, entity: &EntityConfig, raw: &Value) -> Result<Document, RepositoryError> {
        Document::from_json(raw, self.config.partition_key_field()).map_err(|violation| {
            RepositoryError::Decode {
                entity: entity.name.clone(),
                violation,
            }
        })
    }

    /// Read the single-valued entity `entity` of aggregate `partition`.
    ///
    /// Returns `None` when the entity has never been written. The root is
    /// not consulted.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::UnknownEntity`] / [`RepositoryError::EntityKind`]
    /// when `entity` is not a single entity, [`RepositoryError::Decode`] for
    /// a malformed document, [`RepositoryError::Store`] on store failure.
    pub async fn get_item(&self, partition: &str, entity: &str) -> Result<Option<Value>, RepositoryError> {
        let entity = self.entity(entity, EntityKind::Single)?;
        let Some(raw) = self.store.get(&entity.name, partition).await? else {
            return Ok(None);
        };
        let document = self.decode(entity, &raw)?;
        if document.entity_type != entity.type_tag {
            debug!(
                entity = %entity.name,
                partition,
                found = %document.entity_type,
                "document under single entity id has a different type"
            );
            return Ok(None);
        }
        codec::decode_entity(entity, &document).map(Some)
    }

    /// List the items of collection `entity` in aggregate `partition`, in
    /// store order.
    ///
    /// # Errors
    ///
    /// As [`Repository::get_item`], for collection entities.
    pub async fn query_items(&self, partition: &str, entity: &str) -> Result<Vec<Value>, RepositoryError> {
        let entity = self.entity(entity, EntityKind::Collection)?;
        let mut predicate = Map::with_capacity(1);
        predicate.insert(TYPE_FIELD.to_owned(), Value::String(entity.type_tag.clone()));

        let values = self.store.query(&predicate, Some(partition)).await?;
        values
            .iter()
            .map(|raw| {
                let document = self.decode(entity, raw)?;
                codec::decode_entity(entity, &document)
            })
            .collect()
    }

    /// Write the single-valued entity `entity` of aggregate `partition`.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::Encode`] when `value` violates the entity schema or
    /// the aggregate id equals the entity name, otherwise as
    /// [`Repository::get_item`].
    pub async fn upsert_item(&self, partition: &str, entity: &str, value: &Value) -> Result<(), RepositoryError> {
        let entity = self.entity(entity, EntityKind::Single)?;
        if entity.name == partition {
            return Err(codec::encode_error(entity, codec::duplicate_id(partition)));
        }
        let document = codec::encode_single(entity, partition, value)?;
        self.write(&document).await?;
        debug!(entity = %entity.name, partition, "upserted single entity");
        Ok(())
    }

    /// Write one item of collection `entity` in aggregate `partition`, keyed
    /// by the item's `id`.
    ///
    /// The item id may not be the aggregate id, a single entity name, or
    /// the id of an item stored for another collection.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::Encode`] when the item lacks an id, its id is taken
    /// or it violates the entity schema, otherwise as
    /// [`Repository::query_items`].
    pub async fn upsert_collection_item(
        &self,
        partition: &str,
        entity: &str,
        item: &Value,
    ) -> Result<(), RepositoryError> {
        let entity = self.entity(entity, EntityKind::Collection)?;
        let document = codec::encode_item(entity, partition, item)?;
        if codec::is_reserved_id(&self.config, partition, &document.id) {
            return Err(codec::encode_error(entity, codec::duplicate_id(&document.id)));
        }
        if let Some(raw) = self.store.get(&document.id, partition).await? {
            let existing = self.decode(entity, &raw)?;
            if existing.entity_type != entity.type_tag {
                return Err(codec::encode_error(entity, codec::duplicate_id(&document.id)));
            }
        }
        self.write(&document).await?;
        debug!(entity = %entity.name, partition, item = %document.id, "upserted collection item");
        Ok(())
    }

    /// Delete every item of collection `entity` in aggregate `partition` for
    /// which `predicate` holds. Returns the number of items deleted.
    ///
    /// # Errors
    ///
    /// As [`Repository::query_items`]. Items deleted before a failure stay
    /// deleted.
    pub async fn delete_collection_item<F>(
        &self,
        partition: &str,
        entity: &str,
        predicate: F,
    ) -> Result<usize, RepositoryError>
    where
        F: Fn(&Value) -> bool + Send + Sync,
    {
        let entity = self.entity(entity, EntityKind::Collection)?;
        let values = self.store.query(&Map::new(), Some(partition)).await?;

        let mut deleted = 0_usize;
        for raw in &values {
            let document = self.decode(entity, raw)?;
            if document.entity_type != entity.type_tag {
                continue;
            }
            let item = codec::decode_entity(entity, &document)?;
            if predicate(&item) {
                self.store.delete(&document.id, partition).await?;
                deleted = deleted.saturating_add(1);
            }
        }

        debug!(entity = %entity.name, partition, deleted, "deleted collection items");
        Ok(deleted)
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    /// Search aggregates with a Mongo-style JSON filter.
    ///
    /// An empty or whitespace-only query matches everything. The caller's
    /// filter is always intersected with the security predicate.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::MalformedFilter`] for invalid JSON (unless the
    /// settings say [`MalformedFilterPolicy::MatchAll`]),
    /// [`RepositoryError::InvalidFilter`] for JSON that is not a filter, and
    /// as [`Repository::search_condition`].
    pub async fn search(&self, query_json: &str) -> Result<Vec<Aggregate>, RepositoryError> {
        let filter = self.parse_query(query_json)?;
        self.search_condition(filter).await
    }

    fn parse_query(&self, query_json: &str) -> Result<Condition, RepositoryError> {
        let query = query_json.trim();
        if query.is_empty() {
            return Ok(Condition::always());
        }
        match serde_json::from_str::<Value>(query) {
            Ok(value) => Ok(parse_filter(&value)?),
            Err(e) => match self.settings.malformed_filter {
                MalformedFilterPolicy::Reject => Err(RepositoryError::MalformedFilter(e)),
                MalformedFilterPolicy::MatchAll => {
                    warn!(
                        aggregate = %self.config.name(),
                        error = %e,
                        "malformed search filter, matching all visible aggregates"
                    );
                    Ok(Condition::always())
                }
            },
        }
    }

    /// Search aggregates with an already built condition.
    ///
    /// Loads every document of the store, assembles all aggregates and
    /// keeps those satisfying `filter` and the security predicate.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::Security`] when the security predicate fails,
    /// [`RepositoryError::Decode`] for malformed documents and
    /// [`RepositoryError::Store`] on store failure.
    pub async fn search_condition(&self, filter: Condition) -> Result<Vec<Aggregate>, RepositoryError> {
        let values = self.store.query(&Map::new(), None).await?;
        let documents = codec::decode_documents(&self.config, &values)?;
        let aggregates = codec::merge_all(&self.config, &documents, None)?;

        let security = self.security.security_filter().await?;
        let restricted = !security.is_always();
        let combined = filter.intersect(security);

        let scanned = aggregates.len();
        let matched: Vec<Aggregate> = aggregates
            .into_iter()
            .map(Value::from)
            .filter(|value| interpret(&combined, value))
            .filter_map(|value| Aggregate::try_from(value).ok())
            .collect();

        debug!(
            aggregate = %self.config.name(),
            documents = documents.len(),
            scanned,
            matched = matched.len(),
            restricted,
            "search completed"
        );
        Ok(matched)
    }
}
