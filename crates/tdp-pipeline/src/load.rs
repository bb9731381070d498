//! Load stage
//!
//! Replaces the destination relation's contents with the dataset in one
//! transaction: readers see the previous rows or the new rows, never a mix,
//! and a rerun of the same source converges on the same state. Rows go in
//! batched multi-row INSERTs.

use sqlx::{Postgres, QueryBuilder, Transaction};
use tracing::info;

use crate::config::LoadConfig;
use crate::connector::Destination;
use crate::dataset::{ColumnSchema, ColumnType, Dataset, Record, Value};
use crate::error::{LoadError, SchemaError, StageError};
use crate::schema::SchemaManager;

/// Outcome of a completed load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadResult {
    pub rows_written: u64,
}

#[derive(Debug, Clone, Default)]
pub struct LoadStage {
    config: LoadConfig,
    schema: SchemaManager,
}

impl LoadStage {
    pub fn new(config: LoadConfig) -> Self {
        Self {
            config,
            schema: SchemaManager::new(),
        }
    }

    /// Ensure the relation, then replace its contents with `dataset`.
    pub async fn load(
        &self,
        dataset: &Dataset,
        dest: &Destination,
    ) -> Result<LoadResult, StageError> {
        // Writers to one destination take turns; the schema check and the
        // replace transaction run under the same guard.
        let _write_guard = dest.write_lock().lock().await;

        self.schema
            .ensure_relation(dest.pool(), dest.table(), dataset.columns())
            .await
            .map_err(|e| match e {
                SchemaError::Incompatible { .. } => StageError::Schema(e),
                SchemaError::Database(db) => StageError::Load(LoadError::from_sqlx(db)),
            })?;

        let mut tx = dest
            .pool()
            .begin()
            .await
            .map_err(|e| StageError::Load(LoadError::from_sqlx(e)))?;

        sqlx::query(&format!("DELETE FROM \"{}\"", dest.table()))
            .execute(&mut *tx)
            .await
            .map_err(|e| StageError::Load(LoadError::from_sqlx(e)))?;

        let chunk_size = self.config.chunk_size.max(1);
        for chunk in dataset.records().chunks(chunk_size) {
            insert_chunk(&mut tx, dest.table(), dataset.columns(), chunk).await?;
        }

        tx.commit()
            .await
            .map_err(|e| StageError::Load(LoadError::from_sqlx(e)))?;

        let rows_written = dataset.len() as u64;
        info!(
            destination = %dest.name(),
            table = %dest.table(),
            rows = rows_written,
            "relation contents replaced"
        );
        Ok(LoadResult { rows_written })
    }
}

async fn insert_chunk(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    columns: &[ColumnSchema],
    chunk: &[Record],
) -> Result<(), StageError> {
    let column_list: Vec<String> = columns.iter().map(|c| format!("\"{}\"", c.name)).collect();
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "INSERT INTO \"{table}\" ({}) ",
        column_list.join(", ")
    ));

    builder.push_values(chunk, |mut row, record| {
        for column in columns {
            match record.get(&column.name) {
                Some(Value::Text(s)) => {
                    row.push_bind(s.clone());
                }
                Some(Value::Boolean(b)) => {
                    row.push_bind(*b);
                }
                Some(Value::Timestamp(ts)) => {
                    row.push_bind(*ts);
                }
                // Nulls bind as the column's declared type so the driver
                // sends a typed NULL.
                Some(Value::Null) | None => match column.column_type {
                    ColumnType::Text => {
                        row.push_bind(None::<String>);
                    }
                    ColumnType::Boolean => {
                        row.push_bind(None::<bool>);
                    }
                    ColumnType::Timestamp => {
                        row.push_bind(None::<chrono::DateTime<chrono::Utc>>);
                    }
                },
            }
        }
    });

    builder
        .build()
        .execute(&mut **tx)
        .await
        .map_err(|e| StageError::Load(LoadError::from_sqlx(e)))?;
    Ok(())
}
