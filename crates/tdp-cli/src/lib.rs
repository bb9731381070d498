//! TDP CLI Library
//!
//! Command-line interface for running the TDP batch pipeline.
//!
//! # Overview
//!
//! The TDP CLI moves delimited event files into Postgres destinations:
//!
//! - **Pipeline Runs**: Extract, clean, and load one source file (`tdp run`)
//! - **Connectivity Checks**: Probe configured destinations (`tdp check`)
//!
//! Destinations are bound from the environment: `TDP_DEST_<NAME>_URL` (with
//! optional `TDP_DEST_<NAME>_TABLE`) binds a named destination, and
//! `DATABASE_URL` binds `default`.

pub mod commands;
pub mod error;

// Re-export commonly used types
pub use error::{CliError, Result};

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// TDP - Tabular Data Pipeline
#[derive(Parser, Debug)]
#[command(name = "tdp")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline for one source file
    Run {
        /// Path to the delimited source file
        source: PathBuf,

        /// Destination to load into
        #[arg(
            short,
            long,
            env = "TDP_DESTINATION",
            default_value = "default"
        )]
        destination: String,
    },

    /// Check destination connectivity
    Check {
        /// Only check this destination (defaults to all configured)
        #[arg(short, long)]
        destination: Option<String>,
    },
}
