//! Error types for the Keystone engine.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during engine startup and command execution.

use std::path::PathBuf;

/// Top-level error for the Keystone engine.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: crate::config::ConfigError,
    },

    /// Connecting to the document store failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying database error.
        #[from]
        source: keystone_db::DbError,
    },

    /// A repository operation failed.
    #[error("repository error: {source}")]
    Repository {
        /// The underlying repository error.
        #[from]
        source: keystone_repository::RepositoryError,
    },

    /// The configured security filter does not parse.
    #[error("invalid security filter: {source}")]
    SecurityFilter {
        /// The underlying condition error.
        #[from]
        source: keystone_condition::ConditionError,
    },

    /// The command names an aggregate that is not configured.
    #[error("unknown aggregate `{name}`")]
    UnknownAggregate {
        /// The requested aggregate name.
        name: String,
    },

    /// An input file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    ReadInput {
        /// The file that was requested.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// An input file is not JSON, or holds something other than aggregates.
    #[error("invalid input in {}: {message}", .path.display())]
    InvalidInput {
        /// The offending file.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// Command output could not be serialised or written.
    #[error("output error: {message}")]
    Output {
        /// Description of the output failure.
        message: String,
    },
}
