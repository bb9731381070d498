//! Extract stage
//!
//! Reads one delimited file with a header row into a [`Dataset`]. Column
//! types come from [`ExtractConfig`]; every undeclared column is text.
//! Empty fields decode as nulls so the transform stage can see them.

use std::path::Path;

use tracing::debug;

use crate::config::ExtractConfig;
use crate::dataset::{ColumnSchema, Dataset, Record, Value};
use crate::error::ExtractError;

#[derive(Debug, Clone, Default)]
pub struct ExtractStage {
    config: ExtractConfig,
}

impl ExtractStage {
    pub fn new(config: ExtractConfig) -> Self {
        Self { config }
    }

    /// Read and decode the source file.
    pub async fn extract(&self, path: &Path) -> Result<Dataset, ExtractError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|_| ExtractError::NotFound {
                path: path.to_path_buf(),
            })?;
        debug!(path = %path.display(), bytes = bytes.len(), "read source file");

        let config = self.config.clone();
        tokio::task::spawn_blocking(move || parse_bytes(&config, &bytes))
            .await
            .map_err(|_| ExtractError::Parse("parser task failed".to_string()))?
    }
}

fn parse_bytes(config: &ExtractConfig, bytes: &[u8]) -> Result<Dataset, ExtractError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter)
        .has_headers(true)
        .flexible(false)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| ExtractError::Parse(e.to_string()))?
        .clone();
    if headers.is_empty() {
        return Err(ExtractError::Parse("source has no header row".to_string()));
    }

    let mut columns = Vec::with_capacity(headers.len());
    for name in headers.iter() {
        if name.is_empty() {
            return Err(ExtractError::Parse("header row has an empty column name".to_string()));
        }
        if columns.iter().any(|c: &ColumnSchema| c.name == name) {
            return Err(ExtractError::Parse(format!("duplicate column {name:?}")));
        }
        columns.push(ColumnSchema::new(name, config.column_type(name)));
    }

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        // Header occupies line 1; data row `index` sits on line index + 2.
        let line = index + 2;
        let row = row.map_err(|e| ExtractError::Parse(e.to_string()))?;

        let mut record = Record::new();
        for (column, field) in columns.iter().zip(row.iter()) {
            let value = decode_field(column, field, line)?;
            record.insert(column.name.clone(), value);
        }
        records.push(record);
    }

    Dataset::new(columns, records).map_err(|e| ExtractError::Parse(e.to_string()))
}

fn decode_field(
    column: &ColumnSchema,
    field: &str,
    line: usize,
) -> Result<Value, ExtractError> {
    if field.is_empty() {
        return Ok(Value::Null);
    }
    match column.column_type {
        crate::dataset::ColumnType::Text => Ok(Value::Text(field.to_string())),
        crate::dataset::ColumnType::Boolean => parse_bool(field).ok_or_else(|| {
            ExtractError::Parse(format!(
                "line {line}: column {:?} expects a boolean, got {field:?}",
                column.name
            ))
        }),
        crate::dataset::ColumnType::Timestamp => parse_timestamp(field).ok_or_else(|| {
            ExtractError::Parse(format!(
                "line {line}: column {:?} expects a timestamp, got {field:?}",
                column.name
            ))
        }),
    }
}

fn parse_bool(field: &str) -> Option<Value> {
    match field.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" => Some(Value::Boolean(true)),
        "false" | "f" | "0" | "no" => Some(Value::Boolean(false)),
        _ => None,
    }
}

fn parse_timestamp(field: &str) -> Option<Value> {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

    if let Ok(ts) = DateTime::parse_from_rfc3339(field) {
        return Some(Value::Timestamp(ts.with_timezone(&Utc)));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(field, format) {
            return Some(Value::Timestamp(naive.and_utc()));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(field, "%Y-%m-%d") {
        return Some(Value::Timestamp(
            date.and_hms_opt(0, 0, 0)?.and_utc(),
        ));
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::dataset::ColumnType;
    use std::io::Write;

    fn write_source(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn extracts_typed_rows() {
        let source = write_source(
            "id,type,actor,public,created_at\n\
             1,PushEvent,alice,true,2015-01-01T15:00:00Z\n\
             2,WatchEvent,bob,false,2015-01-01 16:30:00\n",
        );
        let stage = ExtractStage::default();
        let dataset = stage.extract(source.path()).await.unwrap();

        assert_eq!(dataset.len(), 2);
        let names: Vec<_> = dataset.column_names().collect();
        assert_eq!(names, vec!["id", "type", "actor", "public", "created_at"]);
        assert_eq!(dataset.columns()[3].column_type, ColumnType::Boolean);
        assert_eq!(dataset.columns()[4].column_type, ColumnType::Timestamp);

        let first = &dataset.records()[0];
        assert_eq!(first.get("id"), Some(&Value::Text("1".to_string())));
        assert_eq!(first.get("public"), Some(&Value::Boolean(true)));
        assert!(matches!(first.get("created_at"), Some(Value::Timestamp(_))));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let stage = ExtractStage::default();
        let err = stage
            .extract(Path::new("/nonexistent/events.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::NotFound { .. }));
    }

    #[tokio::test]
    async fn empty_fields_decode_as_null() {
        let source = write_source("id,actor,public\n1,,\n");
        let stage = ExtractStage::default();
        let dataset = stage.extract(source.path()).await.unwrap();

        let record = &dataset.records()[0];
        assert_eq!(record.get("actor"), Some(&Value::Null));
        assert_eq!(record.get("public"), Some(&Value::Null));
        assert!(record.has_null());
    }

    #[tokio::test]
    async fn malformed_boolean_reports_line() {
        let source = write_source("id,public\n1,true\n2,maybe\n");
        let stage = ExtractStage::default();
        let err = stage.extract(source.path()).await.unwrap_err();

        match err {
            ExtractError::Parse(message) => {
                assert!(message.contains("line 3"), "got: {message}");
                assert!(message.contains("boolean"), "got: {message}");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn uneven_rows_are_rejected() {
        let source = write_source("id,actor\n1,alice,extra\n");
        let stage = ExtractStage::default();
        let err = stage.extract(source.path()).await.unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }

    #[tokio::test]
    async fn duplicate_headers_are_rejected() {
        let source = write_source("id,id\n1,2\n");
        let stage = ExtractStage::default();
        let err = stage.extract(source.path()).await.unwrap_err();
        match err {
            ExtractError::Parse(message) => assert!(message.contains("duplicate")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_file_is_a_parse_error() {
        let source = write_source("");
        let stage = ExtractStage::default();
        let err = stage.extract(source.path()).await.unwrap_err();
        assert!(matches!(err, ExtractError::Parse(_)));
    }

    #[tokio::test]
    async fn header_only_file_yields_empty_dataset() {
        let source = write_source("id,actor\n");
        let stage = ExtractStage::default();
        let dataset = stage.extract(source.path()).await.unwrap();
        assert!(dataset.is_empty());
        let names: Vec<_> = dataset.column_names().collect();
        assert_eq!(names, vec!["id", "actor"]);
    }

    #[tokio::test]
    async fn respects_custom_delimiter() {
        let source = write_source("id\tactor\n1\talice\n");
        let stage = ExtractStage::new(ExtractConfig {
            delimiter: b'\t',
            ..Default::default()
        });
        let dataset = stage.extract(source.path()).await.unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(
            dataset.records()[0].get("actor"),
            Some(&Value::Text("alice".to_string()))
        );
    }

    #[test]
    fn timestamp_formats() {
        for field in [
            "2015-01-01T15:00:00Z",
            "2015-01-01T15:00:00+02:00",
            "2015-01-01 15:00:00",
            "2015-01-01T15:00:00",
            "2015-01-01",
        ] {
            assert!(parse_timestamp(field).is_some(), "failed on {field:?}");
        }
        assert!(parse_timestamp("yesterday").is_none());
    }
}
