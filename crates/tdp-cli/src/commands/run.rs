//! `tdp run` command implementation
//!
//! Runs the full pipeline for one source file against a named destination.

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use tdp_pipeline::{ConnectorRegistry, PipelineConfig, PipelineOrchestrator};

use crate::error::Result;

/// Run the pipeline and print a run report
pub async fn run(source: PathBuf, destination: String) -> Result<()> {
    let config = PipelineConfig::from_env()?;
    let registry = Arc::new(ConnectorRegistry::from_env(config.pool));
    let orchestrator = PipelineOrchestrator::new(config, registry);

    let run = orchestrator.run(&source, &destination).await?;

    println!("{}", "Run succeeded".green().bold());
    println!("  Run ID:      {}", run.run_id);
    println!("  Source:      {}", run.source.display());
    println!("  Destination: {}", run.destination);
    println!("  Extracted:   {} rows", run.extract.rows.unwrap_or(0));
    println!("  Retained:    {} rows", run.transform.rows.unwrap_or(0));
    println!("  Loaded:      {} rows", run.rows_loaded().unwrap_or(0));

    Ok(())
}
