//! End-to-end command tests against the sample configuration.
//!
//! Loads `keystone.yaml` and `demos/projects.json` from the workspace root
//! and drives the engine with the in-memory backend.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use keystone_engine::{Command, Engine, EngineConfig, EngineError};
use keystone_repository::RepositoryError;
use serde_json::{Value, json};

fn workspace_file(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..").join(name)
}

async fn loaded_engine() -> Engine {
    let config = EngineConfig::from_file(&workspace_file("keystone.yaml")).expect("sample config loads");
    let engine = Engine::open(&config).await.expect("memory engine opens");

    let upserted = engine
        .run(&Command::Upsert {
            aggregate: "project".to_owned(),
            file: workspace_file("demos/projects.json"),
        })
        .await
        .expect("demo projects upsert");
    assert_eq!(upserted, json!({ "upserted": 3 }));
    engine
}

fn search(query: Option<&str>) -> Command {
    Command::Search {
        aggregate: "project".to_owned(),
        query: query.map(str::to_owned),
    }
}

fn ids(results: &Value) -> Vec<&str> {
    results
        .as_array()
        .expect("search returns an array")
        .iter()
        .filter_map(|aggregate| aggregate["id"].as_str())
        .collect()
}

#[tokio::test]
async fn search_hides_archived_projects() {
    let engine = loaded_engine().await;

    let all = engine.run(&search(None)).await.expect("search");
    assert_eq!(ids(&all), vec!["p-1", "p-2"]);

    let usd = engine
        .run(&search(Some(r#"{"budget.currency": "USD"}"#)))
        .await
        .expect("search");
    assert_eq!(ids(&usd), vec!["p-1"]);

    let flagship = engine
        .run(&search(Some(r#"{"tags": "flagship"}"#)))
        .await
        .expect("search");
    assert_eq!(ids(&flagship), vec!["p-1"]);
}

#[tokio::test]
async fn get_returns_the_written_aggregate() {
    let engine = loaded_engine().await;

    let apollo = engine
        .run(&Command::Get {
            aggregate: "project".to_owned(),
            id: "p-1".to_owned(),
        })
        .await
        .expect("get");
    assert_eq!(apollo["budget"], json!({ "amount": 250_000, "currency": "USD" }));
    assert_eq!(apollo["deliverables"][0]["title"], "Launch plan");
    assert_eq!(apollo["deliverables"][1]["id"], "d-2");

    // Loading by id is not filtered by the security filter.
    let mercury = engine
        .run(&Command::Get {
            aggregate: "project".to_owned(),
            id: "p-3".to_owned(),
        })
        .await
        .expect("get");
    assert_eq!(mercury["status"], "archived");
}

#[tokio::test]
async fn delete_leaves_sub_entities_behind() {
    let engine = loaded_engine().await;
    engine
        .run(&Command::Delete {
            aggregate: "project".to_owned(),
            id: "p-1".to_owned(),
        })
        .await
        .expect("delete");

    let result = engine
        .run(&Command::Get {
            aggregate: "project".to_owned(),
            id: "p-1".to_owned(),
        })
        .await;
    assert!(
        matches!(
            result,
            Err(EngineError::Repository {
                source: RepositoryError::RootNotFound { .. }
            })
        ),
        "{result:?}"
    );

    let remaining = engine.run(&search(None)).await.expect("search");
    assert_eq!(ids(&remaining), vec!["p-2"]);
}

#[tokio::test]
async fn malformed_query_is_rejected() {
    let engine = loaded_engine().await;
    let result = engine.run(&search(Some("{status"))).await;
    assert!(
        matches!(
            result,
            Err(EngineError::Repository {
                source: RepositoryError::MalformedFilter(_)
            })
        ),
        "{result:?}"
    );
}

#[tokio::test]
async fn missing_input_file() {
    let engine = loaded_engine().await;
    let result = engine
        .run(&Command::Upsert {
            aggregate: "project".to_owned(),
            file: workspace_file("demos/does-not-exist.json"),
        })
        .await;
    assert!(matches!(result, Err(EngineError::ReadInput { .. })), "{result:?}");
}
