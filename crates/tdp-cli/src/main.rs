//! TDP CLI - Main entry point

use clap::Parser;
use std::process;
use tdp_cli::{Cli, Commands};
use tdp_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use tracing::error;

#[tokio::main]
async fn main() {
    // Pick up a local .env before reading any bindings
    dotenvy::dotenv().ok();

    // Parse command-line arguments
    let cli = Cli::parse();

    // Initialize logging based on verbose flag and environment
    let log_config = if cli.verbose {
        LogConfig::builder()
            .level(LogLevel::Debug)
            .output(LogOutput::Console)
            .file_prefix("tdp".to_string())
            .build()
    } else {
        LogConfig::builder()
            .level(LogLevel::Warn)
            .output(LogOutput::Console)
            .file_prefix("tdp".to_string())
            .build()
    };

    // Merge with environment variables (they take precedence)
    let log_config = LogConfig::from_env().unwrap_or(log_config);

    // Initialize logging (ignore errors as the CLI should work without logging)
    let _ = init_logging(&log_config);

    // Execute command
    let result = execute_command(&cli).await;

    // Handle result
    if let Err(e) = result {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Execute the CLI command
async fn execute_command(cli: &Cli) -> tdp_cli::Result<()> {
    match &cli.command {
        Commands::Run {
            source,
            destination,
        } => tdp_cli::commands::run::run(source.clone(), destination.clone()).await,

        Commands::Check { destination } => {
            tdp_cli::commands::check::run(destination.clone()).await
        }
    }
}
