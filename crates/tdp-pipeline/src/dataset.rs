//! In-memory table model shared by the pipeline stages
//!
//! A [`Dataset`] is an immutable table: an ordered column list with declared
//! types plus the records that conform to it. Construction validates that
//! every record carries exactly the declared columns, so downstream stages
//! never re-check shape. Stages produce new datasets instead of mutating.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Scalar cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Null,
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text rendering used by the transform coercion rule. Null has none.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Text(s) => Some(s.clone()),
            Value::Boolean(b) => Some(b.to_string()),
            Value::Timestamp(ts) => Some(ts.to_rfc3339()),
            Value::Null => None,
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Boolean(_) => "boolean",
            Value::Timestamp(_) => "timestamp",
            Value::Null => "null",
        }
    }
}

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Boolean,
    Timestamp,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamp",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Column name plus declared type; the unit the destination relation is
/// defined and verified against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Text)
    }
}

/// One row: column name to scalar value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    values: HashMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.values.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn has_null(&self) -> bool {
        self.values.values().any(Value::is_null)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Shape violation caught at dataset construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatasetError {
    #[error("duplicate column {0:?} in dataset schema")]
    DuplicateColumn(String),

    #[error("record {index} is missing column {column:?}")]
    MissingColumn { index: usize, column: String },

    #[error("record {index} has unexpected column {column:?}")]
    UnexpectedColumn { index: usize, column: String },
}

/// An immutable table: ordered columns plus conforming records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<ColumnSchema>,
    records: Vec<Record>,
}

impl Dataset {
    /// Build a dataset, validating that every record's key set equals the
    /// column list exactly.
    pub fn new(columns: Vec<ColumnSchema>, records: Vec<Record>) -> Result<Self, DatasetError> {
        let mut names: HashSet<&str> = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !names.insert(column.name.as_str()) {
                return Err(DatasetError::DuplicateColumn(column.name.clone()));
            }
        }

        for (index, record) in records.iter().enumerate() {
            for column in &columns {
                if record.get(&column.name).is_none() {
                    return Err(DatasetError::MissingColumn {
                        index,
                        column: column.name.clone(),
                    });
                }
            }
            if record.len() != columns.len() {
                let extra = record
                    .columns()
                    .find(|name| !names.contains(name))
                    .unwrap_or("?")
                    .to_string();
                return Err(DatasetError::UnexpectedColumn {
                    index,
                    column: extra,
                });
            }
        }

        Ok(Self { columns, records })
    }

    pub fn empty(columns: Vec<ColumnSchema>) -> Result<Self, DatasetError> {
        Self::new(columns, Vec::new())
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn columns() -> Vec<ColumnSchema> {
        vec![
            ColumnSchema::text("id"),
            ColumnSchema::new("public", ColumnType::Boolean),
        ]
    }

    #[test]
    fn accepts_conforming_records() {
        let record = Record::from_pairs([
            ("id", Value::text("1")),
            ("public", Value::Boolean(true)),
        ]);
        let dataset = Dataset::new(columns(), vec![record]).unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(
            dataset.column_names().collect::<Vec<_>>(),
            vec!["id", "public"]
        );
    }

    #[test]
    fn rejects_missing_column() {
        let record = Record::from_pairs([("id", Value::text("1"))]);
        let err = Dataset::new(columns(), vec![record]).unwrap_err();
        assert_eq!(
            err,
            DatasetError::MissingColumn {
                index: 0,
                column: "public".into()
            }
        );
    }

    #[test]
    fn rejects_extra_column() {
        let record = Record::from_pairs([
            ("id", Value::text("1")),
            ("public", Value::Boolean(false)),
            ("stray", Value::Null),
        ]);
        let err = Dataset::new(columns(), vec![record]).unwrap_err();
        assert_eq!(
            err,
            DatasetError::UnexpectedColumn {
                index: 0,
                column: "stray".into()
            }
        );
    }

    #[test]
    fn rejects_duplicate_schema_column() {
        let cols = vec![ColumnSchema::text("id"), ColumnSchema::text("id")];
        let err = Dataset::new(cols, Vec::new()).unwrap_err();
        assert_eq!(err, DatasetError::DuplicateColumn("id".into()));
    }

    #[test]
    fn record_null_detection() {
        let mut record = Record::new();
        record.insert("a", Value::text("x"));
        assert!(!record.has_null());
        record.insert("b", Value::Null);
        assert!(record.has_null());
    }

    #[test]
    fn value_text_rendering() {
        let ts = Utc.with_ymd_and_hms(2015, 1, 1, 15, 0, 0).unwrap();
        assert_eq!(Value::text("a").to_text().as_deref(), Some("a"));
        assert_eq!(Value::Boolean(true).to_text().as_deref(), Some("true"));
        assert_eq!(
            Value::Timestamp(ts).to_text().as_deref(),
            Some("2015-01-01T15:00:00+00:00")
        );
        assert_eq!(Value::Null.to_text(), None);
    }
}
