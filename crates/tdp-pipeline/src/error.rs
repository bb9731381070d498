//! Error taxonomy for pipeline stages
//!
//! Each stage surfaces a typed error instead of leaking raw driver errors.
//! [`StageError`] is the orchestrator-level sum of the stage taxonomies plus
//! the two conditions only the orchestrator can observe (stage deadline,
//! cooperative cancellation). Whether a kind is worth retrying is decided in
//! the retry policy, not here.

use std::path::PathBuf;
use thiserror::Error;

use crate::state::StageKind;

/// Failures reading the source file into a dataset.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The source path did not resolve to a readable file.
    #[error("source not found: {}", .path.display())]
    NotFound { path: PathBuf },

    /// The file was readable but is not a well-formed delimited table.
    #[error("failed to parse source: {0}")]
    Parse(String),
}

/// Failures applying the cleaning rules.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("dataset does not match its declared schema: {0}")]
    SchemaMismatch(String),
}

/// Failures ensuring the destination relation.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The relation exists but its column set conflicts with the declared
    /// schema. Never retried; reruns must not paper over schema drift.
    #[error("relation {relation:?} is incompatible with the declared schema: {detail}")]
    Incompatible { relation: String, detail: String },

    /// Driver failure during catalog introspection or DDL. The load boundary
    /// reclassifies this into the load taxonomy.
    #[error("schema check failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// Failures writing to the destination.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("destination connection lost: {0}")]
    ConnectionLost(String),

    #[error("destination rejected rows: {0}")]
    ConstraintViolation(String),

    #[error("load transaction aborted: {0}")]
    Aborted(String),

    #[error("destination timed out: {0}")]
    Timeout(String),
}

impl LoadError {
    /// Map a driver error onto the load taxonomy. Anything unrecognized is
    /// `Aborted`: fail fast rather than retry blindly.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        match err {
            sqlx::Error::Io(e) => LoadError::ConnectionLost(e.to_string()),
            sqlx::Error::Tls(e) => LoadError::ConnectionLost(e.to_string()),
            sqlx::Error::Protocol(e) => LoadError::ConnectionLost(e),
            sqlx::Error::PoolClosed => {
                LoadError::ConnectionLost("connection pool closed".to_string())
            }
            sqlx::Error::WorkerCrashed => {
                LoadError::ConnectionLost("connection worker crashed".to_string())
            }
            sqlx::Error::PoolTimedOut => {
                LoadError::Timeout("timed out acquiring a pooled connection".to_string())
            }
            sqlx::Error::Database(db) => match db.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => LoadError::ConstraintViolation(db.to_string()),
                _ => LoadError::Aborted(db.to_string()),
            },
            other => LoadError::Aborted(other.to_string()),
        }
    }
}

/// Error surfaced by one stage execution, as the orchestrator sees it.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Schema(SchemaError),

    #[error(transparent)]
    Load(#[from] LoadError),

    /// The orchestrator-imposed stage deadline elapsed.
    #[error("{stage} stage timed out")]
    Timeout { stage: StageKind },

    /// The run was cancelled before this stage started.
    #[error("run cancelled before {stage} stage")]
    Cancelled { stage: StageKind },
}

impl StageError {
    /// Short machine-readable kind, used in events and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::Extract(ExtractError::NotFound { .. }) => "not_found",
            StageError::Extract(ExtractError::Parse(_)) => "parse_error",
            StageError::Transform(TransformError::SchemaMismatch(_)) => "schema_mismatch",
            StageError::Schema(SchemaError::Incompatible { .. }) => "schema_incompatible",
            StageError::Schema(SchemaError::Database(_)) => "schema_database",
            StageError::Load(LoadError::ConnectionLost(_)) => "connection_lost",
            StageError::Load(LoadError::ConstraintViolation(_)) => "constraint_violation",
            StageError::Load(LoadError::Aborted(_)) => "aborted",
            StageError::Load(LoadError::Timeout(_)) | StageError::Timeout { .. } => "timeout",
            StageError::Cancelled { .. } => "cancelled",
        }
    }
}

/// Terminal failure of a pipeline run: the originating stage, how many
/// attempts it got, and the last error.
#[derive(Debug, Error)]
#[error("{stage} stage failed after {attempts} attempt(s): {source}")]
pub struct PipelineError {
    pub stage: StageKind,
    pub attempts: u32,
    #[source]
    pub source: StageError,
}
