//! Error types for the TDP CLI
//!
//! User-facing errors with enough context to act on: the failing stage and
//! error kind for pipeline runs, the remedy for configuration problems.

use tdp_pipeline::{PipelineError, StageError, StageKind};
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Error type for CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    /// A pipeline run failed. Names the stage and error kind so scripted
    /// callers can grep stderr.
    #[error("pipeline failed in the {stage} stage ({kind}) after {attempts} attempt(s): {source}")]
    Pipeline {
        stage: StageKind,
        kind: &'static str,
        attempts: u32,
        #[source]
        source: StageError,
    },

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your environment variables.")]
    Config(String),

    /// One or more destinations failed their connectivity probe
    #[error("Connectivity check failed: {0}")]
    Check(String),

    /// Generic anyhow error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connectivity check error
    pub fn check(msg: impl Into<String>) -> Self {
        Self::Check(msg.into())
    }
}

impl From<PipelineError> for CliError {
    fn from(err: PipelineError) -> Self {
        Self::Pipeline {
            stage: err.stage,
            kind: err.source.kind(),
            attempts: err.attempts,
            source: err.source,
        }
    }
}
