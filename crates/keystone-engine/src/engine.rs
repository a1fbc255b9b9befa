//! Command execution against the configured repositories.
//!
//! [`Engine`] owns one [`Repository`] per configured aggregate, all sharing
//! a single store connection and security filter. Each command produces a
//! JSON value that the binary prints.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use keystone_db::{BackendKind, StoreBackend, StoreConnection};
use keystone_repository::{
    Aggregate, EntityKind, IdSchema, ObjectSchema, Repository, RepositoryConfig, StaticPredicate,
};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::cli::Command;
use crate::config::EngineConfig;
use crate::error::EngineError;

/// The repository type the engine serves.
pub type EngineRepository = Repository<StoreBackend, StaticPredicate>;

/// Configured repositories, keyed by aggregate name.
#[derive(Debug, Clone)]
pub struct Engine {
    backend: BackendKind,
    repositories: BTreeMap<String, EngineRepository>,
}

impl Engine {
    /// Connect to the configured store and build every repository.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the backend cannot be reached and
    /// [`EngineError::SecurityFilter`] if the security filter is invalid.
    pub async fn open(config: &EngineConfig) -> Result<Self, EngineError> {
        let store = &config.store;
        info!(
            backend = ?store.backend,
            max_connections = store.max_connections,
            connect_timeout_secs = store.connect_timeout_secs,
            "Opening document store"
        );
        let connection =
            StoreConnection::open(store.backend, store.url.as_deref(), store.pool_options()).await?;
        Self::from_connection(config, &connection)
    }

    /// Build every repository on an already open connection.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SecurityFilter`] if the security filter is invalid.
    pub fn from_connection(
        config: &EngineConfig,
        connection: &StoreConnection,
    ) -> Result<Self, EngineError> {
        let security = config
            .security_filter
            .as_ref()
            .map(StaticPredicate::from_filter)
            .transpose()?
            .unwrap_or_default();

        let repositories: BTreeMap<String, EngineRepository> = config
            .aggregates
            .iter()
            .map(|aggregate| {
                let repository = Repository::new(
                    Arc::new(aggregate.clone()),
                    connection.store_for(aggregate.name()),
                    security.clone(),
                )
                .with_settings(config.repository.clone());
                (aggregate.name().to_owned(), repository)
            })
            .collect();

        let backend = connection.kind();
        if backend == BackendKind::Memory {
            warn!("Memory backend selected, documents are discarded on exit");
        }
        info!(
            aggregates = repositories.len(),
            secured = config.security_filter.is_some(),
            "Repositories ready"
        );
        Ok(Self {
            backend,
            repositories,
        })
    }

    /// The backend the repositories write to.
    pub const fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Names of the configured aggregates, sorted.
    pub fn aggregates(&self) -> impl Iterator<Item = &str> {
        self.repositories.keys().map(String::as_str)
    }

    /// The repository for aggregate `name`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownAggregate`] if `name` is not configured.
    pub fn repository(&self, name: &str) -> Result<&EngineRepository, EngineError> {
        self.repositories
            .get(name)
            .ok_or_else(|| EngineError::UnknownAggregate {
                name: name.to_owned(),
            })
    }

    /// Run one command and return its JSON result.
    ///
    /// # Errors
    ///
    /// Returns the first error of the underlying operation.
    pub async fn run(&self, command: &Command) -> Result<Value, EngineError> {
        info!(
            command = command.name(),
            aggregate = command.aggregate(),
            "Running command"
        );
        match command {
            Command::Get { aggregate, id } => {
                let found = self.repository(aggregate)?.get_by_id(id).await?;
                Ok(found.into())
            }
            Command::Search { aggregate, query } => {
                let found = self
                    .repository(aggregate)?
                    .search(query.as_deref().unwrap_or_default())
                    .await?;
                Ok(Value::Array(found.into_iter().map(Value::from).collect()))
            }
            Command::Upsert { aggregate, file } => {
                let written = self.upsert_file(aggregate, file).await?;
                Ok(json!({ "upserted": written }))
            }
            Command::Delete { aggregate, id } => {
                self.repository(aggregate)?.delete(id).await?;
                Ok(json!({ "deleted": id }))
            }
            Command::Schema { aggregate } => {
                schema_report(self.repository(aggregate)?.config())
            }
        }
    }

    /// Upsert every aggregate in a JSON file and return how many were written.
    ///
    /// The file holds a single aggregate object or an array of them.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ReadInput`] or [`EngineError::InvalidInput`]
    /// for unreadable files, otherwise the first repository error.
    pub async fn upsert_file(&self, aggregate: &str, file: &Path) -> Result<usize, EngineError> {
        let repository = self.repository(aggregate)?;
        let contents = tokio::fs::read_to_string(file)
            .await
            .map_err(|source| EngineError::ReadInput {
                path: file.to_owned(),
                source,
            })?;
        let aggregates = parse_aggregates(&contents).map_err(|message| EngineError::InvalidInput {
            path: file.to_owned(),
            message,
        })?;

        for value in &aggregates {
            repository.upsert(value).await?;
        }
        info!(
            aggregate,
            file = %file.display(),
            count = aggregates.len(),
            "Upserted aggregates from file"
        );
        Ok(aggregates.len())
    }
}

/// Aggregates in an input document: one object or an array of objects.
fn parse_aggregates(contents: &str) -> Result<Vec<Aggregate>, String> {
    let value: Value = serde_json::from_str(contents).map_err(|e| e.to_string())?;
    let values = match value {
        Value::Array(values) => values,
        other => vec![other],
    };
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            Aggregate::try_from(value).map_err(|violation| format!("entry {index}: {violation}"))
        })
        .collect()
}

#[derive(Serialize)]
struct SchemaReport<'a> {
    aggregate: &'a str,
    partition_key_field: &'a str,
    entities: Vec<EntityReport<'a>>,
    root_schema: ObjectSchema,
    aggregate_schema: ObjectSchema,
    search_schema: ObjectSchema,
}

#[derive(Serialize)]
struct EntityReport<'a> {
    name: &'a str,
    kind: EntityKind,
    type_tag: &'a str,
    id: IdSchema,
    fields: &'a ObjectSchema,
}

fn schema_report(config: &RepositoryConfig) -> Result<Value, EngineError> {
    let entities = std::iter::once(config.root())
        .chain(config.entities())
        .map(|entity| EntityReport {
            name: &entity.name,
            kind: entity.kind,
            type_tag: &entity.type_tag,
            id: entity.id_schema,
            fields: &entity.domain_schema,
        })
        .collect();
    let report = SchemaReport {
        aggregate: config.name(),
        partition_key_field: config.partition_key_field(),
        entities,
        root_schema: config.root_schema(),
        aggregate_schema: config.aggregate_schema(),
        search_schema: config.search_schema(),
    };
    serde_json::to_value(report).map_err(|e| EngineError::Output {
        message: e.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use keystone_repository::RepositoryError;

    use super::*;

    const CONFIG: &str = r"
security_filter:
  status: { $ne: archived }
aggregates:
  - name: project
    partition_key_field: project_id
    root:
      name: project
      fields:
        - { name: name, type: string }
        - { name: status, type: string }
    entities:
      - name: budget
        kind: single
        fields:
          - { name: amount, type: number }
";

    fn engine() -> Engine {
        let config = EngineConfig::parse_without_env(CONFIG).expect("valid config");
        Engine::from_connection(&config, &StoreConnection::Memory).expect("engine")
    }

    fn project(id: &str, status: &str) -> Aggregate {
        Aggregate::try_from(json!({
            "id": id,
            "name": format!("Project {id}"),
            "status": status,
            "budget": { "amount": 10 }
        }))
        .expect("object")
    }

    #[tokio::test]
    async fn get_search_delete() {
        let engine = engine();
        assert_eq!(engine.backend(), BackendKind::Memory);
        assert_eq!(engine.aggregates().collect::<Vec<_>>(), vec!["project"]);

        let repository = engine.repository("project").expect("configured");
        repository.upsert(&project("p-1", "active")).await.expect("upsert");
        repository.upsert(&project("p-2", "archived")).await.expect("upsert");

        let found = engine
            .run(&Command::Get {
                aggregate: "project".to_owned(),
                id: "p-2".to_owned(),
            })
            .await
            .expect("get");
        assert_eq!(found["status"], "archived");

        // The configured security filter hides archived projects.
        let listed = engine
            .run(&Command::Search {
                aggregate: "project".to_owned(),
                query: None,
            })
            .await
            .expect("search");
        assert_eq!(listed, json!([Value::from(project("p-1", "active"))]));

        let deleted = engine
            .run(&Command::Delete {
                aggregate: "project".to_owned(),
                id: "p-1".to_owned(),
            })
            .await
            .expect("delete");
        assert_eq!(deleted, json!({ "deleted": "p-1" }));

        let missing = engine
            .run(&Command::Get {
                aggregate: "project".to_owned(),
                id: "p-1".to_owned(),
            })
            .await;
        assert!(
            matches!(
                missing,
                Err(EngineError::Repository {
                    source: RepositoryError::RootNotFound { .. }
                })
            ),
            "{missing:?}"
        );
    }

    #[tokio::test]
    async fn unknown_aggregate() {
        let result = engine()
            .run(&Command::Schema {
                aggregate: "invoice".to_owned(),
            })
            .await;
        assert!(
            matches!(result, Err(EngineError::UnknownAggregate { ref name }) if name == "invoice"),
            "{result:?}"
        );
    }

    #[tokio::test]
    async fn schema_lists_entities_and_derived_schemas() {
        let report = engine()
            .run(&Command::Schema {
                aggregate: "project".to_owned(),
            })
            .await
            .expect("schema");
        assert_eq!(report["aggregate"], "project");
        assert_eq!(report["partition_key_field"], "project_id");
        assert_eq!(report["entities"][0]["kind"], "root");
        assert_eq!(report["entities"][1]["name"], "budget");
        assert_eq!(report["entities"][1]["kind"], "single");

        let root_fields: Vec<&str> = report["root_schema"]["fields"]
            .as_array()
            .expect("fields array")
            .iter()
            .filter_map(|field| field["name"].as_str())
            .collect();
        assert_eq!(root_fields, vec!["id", "project_id", "name", "status"]);
        assert_eq!(report["aggregate_schema"]["fields"][3]["name"], "budget");
        assert_eq!(report["aggregate_schema"]["fields"][3]["optional"], true);
    }

    #[test]
    fn invalid_security_filter() {
        let config = EngineConfig::parse_without_env("security_filter: { status: { $near: 1 } }")
            .expect("valid yaml");
        let result = Engine::from_connection(&config, &StoreConnection::Memory);
        assert!(
            matches!(result, Err(EngineError::SecurityFilter { .. })),
            "{result:?}"
        );
    }

    #[test]
    fn input_documents() {
        let single = parse_aggregates(r#"{"id": "p-1"}"#).expect("object");
        assert_eq!(single.len(), 1);
        let many = parse_aggregates(r#"[{"id": "p-1"}, {"id": "p-2"}]"#).expect("array");
        assert_eq!(many.len(), 2);

        let Err(message) = parse_aggregates(r#"[{"id": "p-1"}, 3]"#) else {
            panic!("a number is not an aggregate");
        };
        assert!(message.starts_with("entry 1:"), "{message}");
        assert!(parse_aggregates("not json").is_err());
    }
}
