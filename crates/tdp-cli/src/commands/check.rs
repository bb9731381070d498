//! `tdp check` command implementation
//!
//! Probes configured destinations so binding or connectivity problems
//! surface before a run does real work.

use colored::Colorize;
use tdp_pipeline::{ConnectorRegistry, PipelineConfig};

use crate::error::{CliError, Result};

/// Check connectivity for one or all configured destinations
pub async fn run(destination: Option<String>) -> Result<()> {
    let config = PipelineConfig::from_env()?;
    let registry = ConnectorRegistry::from_env(config.pool);

    let names = match destination {
        Some(name) => vec![name],
        None => registry.destination_names(),
    };
    if names.is_empty() {
        return Err(CliError::config(
            "no destinations configured; set DATABASE_URL or TDP_DEST_<NAME>_URL",
        ));
    }

    let mut failed = 0usize;
    for name in &names {
        match registry.acquire(name).await {
            Ok(dest) => {
                println!(
                    "{} {} (table \"{}\")",
                    "ok".green().bold(),
                    name,
                    dest.table()
                );
            }
            Err(err) => {
                println!("{} {}: {}", "failed".red().bold(), name, err);
                failed += 1;
            }
        }
    }

    if failed == 0 {
        Ok(())
    } else {
        Err(CliError::check(format!(
            "{failed} of {} destination(s) unreachable",
            names.len()
        )))
    }
}
