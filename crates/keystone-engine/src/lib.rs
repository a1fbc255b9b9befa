//! Keystone engine: serves configured aggregate repositories from the
//! command line.
//!
//! - [`config`] -- YAML configuration with env overrides
//! - [`cli`] -- clap argument definitions
//! - [`engine`] -- repository wiring and command execution
//! - [`error`] -- top-level error type

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;

pub use cli::{Cli, Command};
pub use config::{EngineConfig, LogFormat, LoggingConfig, StoreConfig};
pub use engine::{Engine, EngineRepository};
pub use error::EngineError;
