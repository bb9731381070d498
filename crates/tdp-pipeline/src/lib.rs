//! TDP Pipeline Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Batch pipeline that moves delimited event files into Postgres.
//!
//! # Overview
//!
//! A run moves one source file through three stages, in order:
//!
//! - **Extract**: read a delimited file with a header row into an immutable
//!   [`Dataset`], typing columns from configuration
//! - **Transform**: drop records holding nulls, render text-declared columns
//!   as text, preserve the column set exactly
//! - **Load**: replace the destination relation's contents in a single
//!   transaction, inserting in batches
//!
//! The [`PipelineOrchestrator`] owns the run lifecycle around the stages:
//! per-stage retry with exponential backoff, optional deadlines, cooperative
//! cancellation between stages, and event emission through an [`EventSink`].
//!
//! # Architecture
//!
//! ## Stage Contract
//!
//! Stages are retry-oblivious. Every attempt invokes the stage from scratch
//! and the orchestrator decides, per failure kind, whether another attempt is
//! worth making. Only lost connections and extract/load deadlines are
//! transient; data and schema problems fail the run at once.
//!
//! ## Destinations
//!
//! Destinations are named Postgres databases bound from the environment
//! (`TDP_DEST_<NAME>_URL`, `DATABASE_URL` for `default`). The
//! [`ConnectorRegistry`] memoizes one pool and one write lock per name, so
//! concurrent runs against the same destination serialize their replace
//! transactions instead of interleaving.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use tdp_pipeline::{ConnectorRegistry, PipelineConfig, PipelineOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::from_env()?;
//!     let connector = Arc::new(ConnectorRegistry::from_env(config.pool));
//!     let orchestrator = PipelineOrchestrator::new(config, connector);
//!     let run = orchestrator.run(Path::new("events.csv"), "default").await?;
//!     println!("loaded {} rows", run.rows_loaded().unwrap_or(0));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connector;
pub mod dataset;
pub mod error;
pub mod events;
pub mod extract;
pub mod load;
pub mod orchestrator;
pub mod retry;
pub mod schema;
pub mod state;
pub mod transform;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use connector::{ConnectorRegistry, Destination};
pub use dataset::{ColumnSchema, ColumnType, Dataset, Record, Value};
pub use error::{
    ExtractError, LoadError, PipelineError, SchemaError, StageError, TransformError,
};
pub use events::{EventSink, MemorySink, PipelineEvent, TracingSink};
pub use extract::ExtractStage;
pub use load::{LoadResult, LoadStage};
pub use orchestrator::PipelineOrchestrator;
pub use retry::RetryPolicy;
pub use schema::SchemaManager;
pub use state::{RunState, RunStatus, StageKind, StageState, StageStatus};
pub use transform::TransformStage;
