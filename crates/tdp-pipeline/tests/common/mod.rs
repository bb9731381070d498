//! Common test utilities for pipeline integration tests
//!
//! Spins up a throwaway PostgreSQL container per test. No schema setup is
//! done here; the pipeline under test owns its destination relation.
//!
//! # Running These Tests
//!
//! Container-backed tests require Docker:
//!
//! ```bash
//! cargo test -p tdp-pipeline -- --ignored
//! ```
#![allow(dead_code)]

use std::io::Write;

use anyhow::{Context, Result};
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;

use tdp_pipeline::{ConnectorRegistry, PipelineConfig};

/// A running PostgreSQL container plus its connection URL. Dropping this
/// stops the container.
pub struct TestPostgres {
    container: ContainerAsync<Postgres>,
    url: String,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container.get_host().await.context("Failed to get host")?;
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .context("Failed to get port")?;
        let url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        Ok(Self { container, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Registry with `default` bound to this container.
    pub fn registry(&self, config: &PipelineConfig, table: &str) -> ConnectorRegistry {
        let mut registry = ConnectorRegistry::new(config.pool);
        registry.bind("default", self.url(), table);
        registry
    }
}

/// Write a CSV source file the extract stage can read.
pub fn write_source(content: &str) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::new().context("Failed to create temp file")?;
    file.write_all(content.as_bytes())
        .context("Failed to write source")?;
    file.flush().context("Failed to flush source")?;
    Ok(file)
}

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tdp_pipeline=debug,sqlx=warn")),
        )
        .with_test_writer()
        .try_init();
}
