//! Keystone engine binary.
//!
//! # Startup Sequence
//!
//! 1. Parse command-line arguments
//! 2. Load configuration (default `keystone.yaml`)
//! 3. Initialize structured logging (tracing) on stderr
//! 4. Connect to the configured document store
//! 5. Run the command and print its result as JSON on stdout

use std::io::Write as _;

use clap::Parser;
use keystone_engine::{Cli, Engine, EngineConfig, EngineError, LogFormat, LoggingConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, connection or the command fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = EngineConfig::from_file(&cli.config).map_err(EngineError::from)?;

    init_tracing(&config.logging);
    info!(
        config = %cli.config.display(),
        aggregates = config.aggregates.len(),
        "keystone-engine starting"
    );

    let engine = Engine::open(&config).await?;
    let output = engine.run(&cli.command).await?;

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &output).map_err(|e| EngineError::Output {
        message: e.to_string(),
    })?;
    writeln!(stdout).map_err(|e| EngineError::Output {
        message: e.to_string(),
    })?;
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
