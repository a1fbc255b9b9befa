//! CLI argument definitions using clap.
//!
//! Commands:
//! - `keystone-engine get <aggregate> <id>`
//! - `keystone-engine search <aggregate> [query]`
//! - `keystone-engine upsert <aggregate> <file>`
//! - `keystone-engine delete <aggregate> <id>`
//! - `keystone-engine schema <aggregate>`

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Keystone: aggregate repositories over a partitioned document store.
#[derive(Parser, Debug)]
#[command(name = "keystone-engine")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, short, global = true, env = "KEYSTONE_CONFIG", default_value = "keystone.yaml")]
    pub config: PathBuf,

    /// Operation to run.
    #[command(subcommand)]
    pub command: Command,
}

/// One engine operation. Results are printed as pretty JSON on stdout.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Load one aggregate by id.
    Get {
        /// Aggregate type.
        aggregate: String,
        /// Aggregate id.
        id: String,
    },

    /// Find aggregates matching a Mongo-style JSON filter.
    Search {
        /// Aggregate type.
        aggregate: String,
        /// Filter JSON; omitted or empty matches every aggregate.
        query: Option<String>,
    },

    /// Write aggregates from a JSON file holding one object or an array.
    Upsert {
        /// Aggregate type.
        aggregate: String,
        /// Path to the JSON file.
        file: PathBuf,
    },

    /// Delete an aggregate's root document.
    Delete {
        /// Aggregate type.
        aggregate: String,
        /// Aggregate id.
        id: String,
    },

    /// Print the entity layout and derived schemas of an aggregate.
    Schema {
        /// Aggregate type.
        aggregate: String,
    },
}

impl Command {
    /// The aggregate type the command addresses.
    pub fn aggregate(&self) -> &str {
        match self {
            Self::Get { aggregate, .. }
            | Self::Search { aggregate, .. }
            | Self::Upsert { aggregate, .. }
            | Self::Delete { aggregate, .. }
            | Self::Schema { aggregate } => aggregate,
        }
    }

    /// Lowercase command name, for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Get { .. } => "get",
            Self::Search { .. } => "search",
            Self::Upsert { .. } => "upsert",
            Self::Delete { .. } => "delete",
            Self::Schema { .. } => "schema",
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_search_without_query() {
        let cli = Cli::try_parse_from(["keystone-engine", "search", "project"]).expect("valid args");
        assert_eq!(
            cli.command,
            Command::Search {
                aggregate: "project".to_owned(),
                query: None,
            }
        );
        assert_eq!(cli.command.aggregate(), "project");
        assert_eq!(cli.command.name(), "search");
    }

    #[test]
    fn config_flag_after_subcommand() {
        let cli = Cli::try_parse_from([
            "keystone-engine",
            "get",
            "project",
            "p-1",
            "--config",
            "deploy/keystone.yaml",
        ])
        .expect("valid args");
        assert_eq!(cli.config, PathBuf::from("deploy/keystone.yaml"));
        assert_eq!(cli.command.name(), "get");
    }

    #[test]
    fn upsert_requires_file() {
        assert!(Cli::try_parse_from(["keystone-engine", "upsert", "project"]).is_err());
    }
}
