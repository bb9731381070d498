//! Pipeline configuration
//!
//! Compiled-in defaults, overridable from `TDP_*` environment variables.
//! `from_env` only overrides what is set; `validate` rejects values that
//! would make a run misbehave silently.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Rows per INSERT statement during load.
pub const DEFAULT_INSERT_CHUNK_SIZE: usize = 1000;
/// Attempts per stage, first try included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// First retry delay in milliseconds.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
/// Retry delay ceiling in milliseconds.
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 30_000;
/// Relation written when a destination binding does not name one.
pub const DEFAULT_TABLE: &str = "events";

/// How source files are read and typed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Field delimiter byte.
    pub delimiter: u8,
    /// Header names decoded as booleans instead of text.
    pub boolean_columns: Vec<String>,
    /// Header names decoded as timestamps instead of text.
    pub timestamp_columns: Vec<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            boolean_columns: vec!["public".to_string()],
            timestamp_columns: vec!["created_at".to_string()],
        }
    }
}

impl ExtractConfig {
    /// Declared type for a header name.
    pub fn column_type(&self, name: &str) -> crate::dataset::ColumnType {
        if self.boolean_columns.iter().any(|c| c == name) {
            crate::dataset::ColumnType::Boolean
        } else if self.timestamp_columns.iter().any(|c| c == name) {
            crate::dataset::ColumnType::Timestamp
        } else {
            crate::dataset::ColumnType::Text
        }
    }
}

/// How rows are written to the destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub chunk_size: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_INSERT_CHUNK_SIZE,
        }
    }
}

/// Retry schedule for transient stage failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_cap_ms: DEFAULT_BACKOFF_CAP_MS,
        }
    }
}

/// Optional per-stage deadlines, in seconds. Unset means unbounded.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StageTimeouts {
    pub extract_secs: Option<u64>,
    pub transform_secs: Option<u64>,
    pub load_secs: Option<u64>,
}

impl StageTimeouts {
    pub fn extract(&self) -> Option<Duration> {
        self.extract_secs.map(Duration::from_secs)
    }

    pub fn transform(&self) -> Option<Duration> {
        self.transform_secs.map(Duration::from_secs)
    }

    pub fn load(&self) -> Option<Duration> {
        self.load_secs.map(Duration::from_secs)
    }
}

/// Destination connection pool sizing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
        }
    }
}

/// Everything a pipeline run needs beyond source and destination.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub extract: ExtractConfig,
    pub load: LoadConfig,
    pub retry: RetryConfig,
    pub timeouts: StageTimeouts,
    pub pool: PoolConfig,
}

impl PipelineConfig {
    /// Defaults overridden by whatever `TDP_*` variables are set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("TDP_SOURCE_DELIMITER") {
            let mut bytes = raw.bytes();
            match (bytes.next(), bytes.next()) {
                (Some(b), None) => config.extract.delimiter = b,
                _ => bail!("TDP_SOURCE_DELIMITER must be a single byte, got {raw:?}"),
            }
        }
        if let Ok(raw) = std::env::var("TDP_BOOLEAN_COLUMNS") {
            config.extract.boolean_columns = split_columns(&raw);
        }
        if let Ok(raw) = std::env::var("TDP_TIMESTAMP_COLUMNS") {
            config.extract.timestamp_columns = split_columns(&raw);
        }

        if let Ok(raw) = std::env::var("TDP_INSERT_CHUNK_SIZE") {
            config.load.chunk_size = raw
                .parse()
                .with_context(|| format!("invalid TDP_INSERT_CHUNK_SIZE: {raw:?}"))?;
        }

        if let Ok(raw) = std::env::var("TDP_MAX_ATTEMPTS") {
            config.retry.max_attempts = raw
                .parse()
                .with_context(|| format!("invalid TDP_MAX_ATTEMPTS: {raw:?}"))?;
        }
        if let Ok(raw) = std::env::var("TDP_BACKOFF_BASE_MS") {
            config.retry.backoff_base_ms = raw
                .parse()
                .with_context(|| format!("invalid TDP_BACKOFF_BASE_MS: {raw:?}"))?;
        }
        if let Ok(raw) = std::env::var("TDP_BACKOFF_CAP_MS") {
            config.retry.backoff_cap_ms = raw
                .parse()
                .with_context(|| format!("invalid TDP_BACKOFF_CAP_MS: {raw:?}"))?;
        }

        config.timeouts.extract_secs =
            parse_optional_secs("TDP_EXTRACT_TIMEOUT_SECS")?.or(config.timeouts.extract_secs);
        config.timeouts.transform_secs =
            parse_optional_secs("TDP_TRANSFORM_TIMEOUT_SECS")?.or(config.timeouts.transform_secs);
        config.timeouts.load_secs =
            parse_optional_secs("TDP_LOAD_TIMEOUT_SECS")?.or(config.timeouts.load_secs);

        if let Ok(raw) = std::env::var("TDP_DB_MAX_CONNECTIONS") {
            config.pool.max_connections = raw
                .parse()
                .with_context(|| format!("invalid TDP_DB_MAX_CONNECTIONS: {raw:?}"))?;
        }
        if let Ok(raw) = std::env::var("TDP_DB_MIN_CONNECTIONS") {
            config.pool.min_connections = raw
                .parse()
                .with_context(|| format!("invalid TDP_DB_MIN_CONNECTIONS: {raw:?}"))?;
        }
        if let Ok(raw) = std::env::var("TDP_DB_CONNECT_TIMEOUT_SECS") {
            config.pool.connect_timeout_secs = raw
                .parse()
                .with_context(|| format!("invalid TDP_DB_CONNECT_TIMEOUT_SECS: {raw:?}"))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.load.chunk_size == 0 {
            bail!("insert chunk size must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            bail!("max attempts must be at least 1");
        }
        if self.retry.backoff_base_ms == 0 {
            bail!("backoff base must be at least 1ms");
        }
        if self.retry.backoff_cap_ms < self.retry.backoff_base_ms {
            bail!(
                "backoff cap ({}ms) must not be below the base ({}ms)",
                self.retry.backoff_cap_ms,
                self.retry.backoff_base_ms
            );
        }
        for (name, secs) in [
            ("extract", self.timeouts.extract_secs),
            ("transform", self.timeouts.transform_secs),
            ("load", self.timeouts.load_secs),
        ] {
            if secs == Some(0) {
                bail!("{name} timeout must be at least 1 second when set");
            }
        }
        if self.pool.max_connections == 0 {
            bail!("pool max connections must be at least 1");
        }
        if self.pool.min_connections > self.pool.max_connections {
            bail!(
                "pool min connections ({}) exceeds max connections ({})",
                self.pool.min_connections,
                self.pool.max_connections
            );
        }
        Ok(())
    }
}

fn split_columns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_optional_secs(var: &str) -> Result<Option<u64>> {
    match std::env::var(var) {
        Ok(raw) => {
            let secs = raw
                .parse()
                .with_context(|| format!("invalid {var}: {raw:?}"))?;
            Ok(Some(secs))
        }
        Err(_) => Ok(None),
    }
}
