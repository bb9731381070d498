//! Destination connectors
//!
//! Named Postgres destinations, bound from the environment. A destination is
//! memoized on first acquire: one pool and one write lock per name for the
//! registry's lifetime. The write lock is what serializes concurrent loads
//! into the same destination.
//!
//! Bindings:
//! - `TDP_DEST_<NAME>_URL` and optional `TDP_DEST_<NAME>_TABLE`
//! - `DATABASE_URL` binds the `default` destination

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{PoolConfig, DEFAULT_TABLE};
use crate::error::LoadError;

pub const DEFAULT_DESTINATION: &str = "default";
const ENV_PREFIX: &str = "TDP_DEST_";
const ENV_URL_SUFFIX: &str = "_URL";

/// How to reach one destination, before any connection is made.
#[derive(Debug, Clone)]
pub struct DestinationSettings {
    pub url: String,
    pub table: String,
}

/// A live destination: connected pool plus the lock that serializes writes.
#[derive(Debug, Clone)]
pub struct Destination {
    name: String,
    table: String,
    pool: PgPool,
    write_lock: Arc<Mutex<()>>,
}

impl Destination {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) fn write_lock(&self) -> &Mutex<()> {
        &self.write_lock
    }
}

/// Registry of named destinations.
pub struct ConnectorRegistry {
    pool_config: PoolConfig,
    bindings: HashMap<String, DestinationSettings>,
    active: Mutex<HashMap<String, Destination>>,
}

impl ConnectorRegistry {
    pub fn new(pool_config: PoolConfig) -> Self {
        Self {
            pool_config,
            bindings: HashMap::new(),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Register a destination by name.
    pub fn bind(
        &mut self,
        name: impl Into<String>,
        url: impl Into<String>,
        table: impl Into<String>,
    ) -> &mut Self {
        self.bindings.insert(
            name.into(),
            DestinationSettings {
                url: url.into(),
                table: table.into(),
            },
        );
        self
    }

    /// Bindings from the environment. `TDP_DEST_<NAME>_URL` wins over
    /// `DATABASE_URL` for the `default` name.
    pub fn from_env(pool_config: PoolConfig) -> Self {
        let mut registry = Self::new(pool_config);

        for (key, url) in std::env::vars() {
            let Some(rest) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let Some(upper_name) = rest.strip_suffix(ENV_URL_SUFFIX) else {
                continue;
            };
            if upper_name.is_empty() {
                continue;
            }
            let name = upper_name.to_ascii_lowercase();
            let table = std::env::var(format!("{ENV_PREFIX}{upper_name}_TABLE"))
                .unwrap_or_else(|_| DEFAULT_TABLE.to_string());
            debug!(destination = %name, table = %table, "bound destination from environment");
            registry.bind(name, url, table);
        }

        if !registry.bindings.contains_key(DEFAULT_DESTINATION) {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                debug!(destination = DEFAULT_DESTINATION, "bound destination from DATABASE_URL");
                registry.bind(DEFAULT_DESTINATION, url, DEFAULT_TABLE);
            }
        }

        registry
    }

    /// Names with a binding, sorted for stable error messages.
    pub fn destination_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bindings.keys().cloned().collect();
        names.sort();
        names
    }

    /// Connect to a named destination, reusing the pool from any previous
    /// acquire. Probes the connection before handing it out.
    pub async fn acquire(&self, name: &str) -> Result<Destination, LoadError> {
        if let Some(dest) = self.active.lock().await.get(name) {
            return Ok(dest.clone());
        }

        let settings = self.bindings.get(name).ok_or_else(|| {
            LoadError::ConnectionLost(format!(
                "unknown destination {name:?}; configured destinations: [{}]",
                self.destination_names().join(", ")
            ))
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(self.pool_config.max_connections)
            .min_connections(self.pool_config.min_connections)
            .acquire_timeout(Duration::from_secs(self.pool_config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(self.pool_config.idle_timeout_secs))
            .connect(&settings.url)
            .await
            .map_err(LoadError::from_sqlx)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(LoadError::from_sqlx)?;

        info!(destination = %name, table = %settings.table, "destination connected");

        let dest = Destination {
            name: name.to_string(),
            table: settings.table.clone(),
            pool,
            write_lock: Arc::new(Mutex::new(())),
        };

        // Two tasks may race past the memo check; the first insert wins so
        // both end up sharing one write lock.
        let mut active = self.active.lock().await;
        Ok(active.entry(name.to_string()).or_insert(dest).clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn bind_registers_names_sorted() {
        let mut registry = ConnectorRegistry::new(PoolConfig::default());
        registry.bind("warehouse", "postgres://w", "events");
        registry.bind("archive", "postgres://a", "history");
        assert_eq!(registry.destination_names(), vec!["archive", "warehouse"]);
    }

    #[tokio::test]
    async fn unknown_destination_lists_configured_names() {
        let mut registry = ConnectorRegistry::new(PoolConfig::default());
        registry.bind("warehouse", "postgres://w", "events");

        let err = registry.acquire("staging").await.unwrap_err();
        match err {
            LoadError::ConnectionLost(message) => {
                assert!(message.contains("staging"), "got: {message}");
                assert!(message.contains("warehouse"), "got: {message}");
            }
            other => panic!("expected connection error, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn env_bindings_resolve_names_and_tables() {
        std::env::set_var("TDP_DEST_WAREHOUSE_URL", "postgres://warehouse");
        std::env::set_var("TDP_DEST_WAREHOUSE_TABLE", "github_events");
        std::env::set_var("DATABASE_URL", "postgres://fallback");

        let registry = ConnectorRegistry::from_env(PoolConfig::default());
        assert_eq!(
            registry.destination_names(),
            vec!["default", "warehouse"]
        );
        assert_eq!(registry.bindings["warehouse"].table, "github_events");
        assert_eq!(registry.bindings["default"].table, DEFAULT_TABLE);
        assert_eq!(registry.bindings["default"].url, "postgres://fallback");

        std::env::remove_var("TDP_DEST_WAREHOUSE_URL");
        std::env::remove_var("TDP_DEST_WAREHOUSE_TABLE");
        std::env::remove_var("DATABASE_URL");
    }

    #[test]
    #[serial]
    fn named_default_binding_wins_over_database_url() {
        std::env::set_var("TDP_DEST_DEFAULT_URL", "postgres://explicit");
        std::env::set_var("DATABASE_URL", "postgres://fallback");

        let registry = ConnectorRegistry::from_env(PoolConfig::default());
        assert_eq!(registry.bindings["default"].url, "postgres://explicit");

        std::env::remove_var("TDP_DEST_DEFAULT_URL");
        std::env::remove_var("DATABASE_URL");
    }
}
