//! Destination schema management
//!
//! `ensure_relation` converges on the declared schema: creates the relation
//! when absent, verifies it column-for-column when present. It never alters
//! an existing relation; drift surfaces as [`SchemaError::Incompatible`] for
//! an operator to resolve.

use sqlx::PgPool;
use tracing::{debug, info};

use crate::dataset::{ColumnSchema, ColumnType};
use crate::error::SchemaError;

/// Postgres identifiers are truncated beyond this; reject instead.
const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaManager;

impl SchemaManager {
    pub fn new() -> Self {
        Self
    }

    /// Create the relation if absent, verify it if present. Idempotent.
    pub async fn ensure_relation(
        &self,
        pool: &PgPool,
        relation: &str,
        columns: &[ColumnSchema],
    ) -> Result<(), SchemaError> {
        if !is_identifier(relation) {
            return Err(SchemaError::Incompatible {
                relation: relation.to_string(),
                detail: "relation name is not a valid identifier".to_string(),
            });
        }
        for column in columns {
            if !is_identifier(&column.name) {
                return Err(SchemaError::Incompatible {
                    relation: relation.to_string(),
                    detail: format!("column name {:?} is not a valid identifier", column.name),
                });
            }
        }
        if columns.is_empty() {
            return Err(SchemaError::Incompatible {
                relation: relation.to_string(),
                detail: "declared schema has no columns".to_string(),
            });
        }

        let existing = sqlx::query_as::<_, (String, String)>(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 \
             ORDER BY ordinal_position",
        )
        .bind(relation)
        .fetch_all(pool)
        .await?;

        if existing.is_empty() {
            let ddl = render_create(relation, columns);
            debug!(relation, ddl = %ddl, "creating destination relation");
            sqlx::query(&ddl).execute(pool).await?;
            info!(relation, columns = columns.len(), "destination relation created");
            return Ok(());
        }

        verify_compatible(relation, columns, &existing)?;
        debug!(relation, "destination relation verified");
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    name.len() <= MAX_IDENTIFIER_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn sql_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Text => "TEXT",
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::Timestamp => "TIMESTAMPTZ",
    }
}

fn render_create(relation: &str, columns: &[ColumnSchema]) -> String {
    let body: Vec<String> = columns
        .iter()
        .map(|c| format!("\"{}\" {}", c.name, sql_type(c.column_type)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS \"{relation}\" ({})",
        body.join(", ")
    )
}

fn type_matches(declared: ColumnType, data_type: &str) -> bool {
    match declared {
        ColumnType::Text => matches!(data_type, "text" | "character varying"),
        ColumnType::Boolean => data_type == "boolean",
        ColumnType::Timestamp => matches!(
            data_type,
            "timestamp with time zone" | "timestamp without time zone"
        ),
    }
}

fn verify_compatible(
    relation: &str,
    declared: &[ColumnSchema],
    existing: &[(String, String)],
) -> Result<(), SchemaError> {
    let mut problems = Vec::new();

    for column in declared {
        match existing.iter().find(|(name, _)| *name == column.name) {
            None => problems.push(format!("missing column {:?}", column.name)),
            Some((_, data_type)) => {
                if !type_matches(column.column_type, data_type) {
                    problems.push(format!(
                        "column {:?} is {data_type}, expected {}",
                        column.name, column.column_type
                    ));
                }
            }
        }
    }
    for (name, _) in existing {
        if !declared.iter().any(|c| c.name == *name) {
            problems.push(format!("unexpected column {name:?}"));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::Incompatible {
            relation: relation.to_string(),
            detail: problems.join("; "),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn declared() -> Vec<ColumnSchema> {
        vec![
            ColumnSchema::text("id"),
            ColumnSchema::new("public", ColumnType::Boolean),
            ColumnSchema::new("created_at", ColumnType::Timestamp),
        ]
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("events"));
        assert!(is_identifier("_raw_2015"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2015_events"));
        assert!(!is_identifier("events; DROP TABLE users"));
        assert!(!is_identifier(&"x".repeat(64)));
    }

    #[test]
    fn create_statement_quotes_and_types() {
        let ddl = render_create("events", &declared());
        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS \"events\" \
             (\"id\" TEXT, \"public\" BOOLEAN, \"created_at\" TIMESTAMPTZ)"
        );
    }

    #[test]
    fn matching_relation_verifies() {
        let existing = vec![
            ("id".to_string(), "text".to_string()),
            ("public".to_string(), "boolean".to_string()),
            ("created_at".to_string(), "timestamp with time zone".to_string()),
        ];
        assert!(verify_compatible("events", &declared(), &existing).is_ok());
    }

    #[test]
    fn plain_timestamp_columns_are_accepted() {
        let existing = vec![
            ("id".to_string(), "text".to_string()),
            ("public".to_string(), "boolean".to_string()),
            (
                "created_at".to_string(),
                "timestamp without time zone".to_string(),
            ),
        ];
        assert!(verify_compatible("events", &declared(), &existing).is_ok());
    }

    #[test]
    fn drifted_relation_reports_every_problem() {
        let existing = vec![
            ("id".to_string(), "integer".to_string()),
            ("created_at".to_string(), "timestamp with time zone".to_string()),
            ("org".to_string(), "text".to_string()),
        ];
        let err = verify_compatible("events", &declared(), &existing).unwrap_err();
        match err {
            SchemaError::Incompatible { relation, detail } => {
                assert_eq!(relation, "events");
                assert!(detail.contains("\"id\" is integer"), "got: {detail}");
                assert!(detail.contains("missing column \"public\""), "got: {detail}");
                assert!(detail.contains("unexpected column \"org\""), "got: {detail}");
            }
            other => panic!("expected incompatibility, got {other:?}"),
        }
    }
}
