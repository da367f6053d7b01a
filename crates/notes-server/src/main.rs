//! Notes Server
//!
//! Loads the configuration, initializes logging and runs the gRPC service
//! until it receives SIGINT or SIGTERM.

use clap::Parser;
use notes_server::{config::AppConfig, logging, run, AppError};
use std::path::PathBuf;
use std::process;

/// Notes gRPC service
#[derive(Debug, Parser)]
#[command(name = "notes-server", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = notes_server::config::CONF_PATH_ENV)]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    if let Err(e) = start().await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn start() -> Result<(), AppError> {
    let cli = Cli::parse();

    let config = AppConfig::from_file(&cli.config)?;
    logging::init(config.env).map_err(AppError::Logging)?;

    tracing::info!(env = %config.env, config = %cli.config.display(), "starting notes server");

    run(config).await
}
