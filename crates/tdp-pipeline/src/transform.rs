//! Transform stage
//!
//! Two cleaning rules, applied in order:
//! 1. Drop every record holding a null in any column. Partial rows never
//!    reach the destination.
//! 2. Under a text-declared column, render whatever value remains as text.
//!    Typed columns must already hold their declared type; a stray variant
//!    there is a schema mismatch, not something to coerce over.
//!
//! The column set and order of the input are preserved exactly.

use tracing::debug;

use crate::dataset::{ColumnType, Dataset, Record, Value};
use crate::error::TransformError;

#[derive(Debug, Clone, Copy, Default)]
pub struct TransformStage;

impl TransformStage {
    pub fn new() -> Self {
        Self
    }

    pub fn transform(&self, dataset: &Dataset) -> Result<Dataset, TransformError> {
        let mut kept = Vec::with_capacity(dataset.len());

        for (index, record) in dataset.records().iter().enumerate() {
            if record.has_null() {
                continue;
            }

            let mut cleaned = Record::new();
            for column in dataset.columns() {
                let value = record.get(&column.name).ok_or_else(|| {
                    TransformError::SchemaMismatch(format!(
                        "row {} is missing column {:?}",
                        index + 1,
                        column.name
                    ))
                })?;
                cleaned.insert(column.name.clone(), coerce(column.column_type, value, index)?);
            }
            kept.push(cleaned);
        }

        debug!(
            input_rows = dataset.len(),
            output_rows = kept.len(),
            "applied cleaning rules"
        );

        Dataset::new(dataset.columns().to_vec(), kept)
            .map_err(|e| TransformError::SchemaMismatch(e.to_string()))
    }
}

fn coerce(declared: ColumnType, value: &Value, index: usize) -> Result<Value, TransformError> {
    match (declared, value) {
        (ColumnType::Text, value) => value.to_text().map(Value::Text).ok_or_else(|| {
            TransformError::SchemaMismatch(format!(
                "row {}: null survived the purge rule",
                index + 1
            ))
        }),
        (ColumnType::Boolean, Value::Boolean(b)) => Ok(Value::Boolean(*b)),
        (ColumnType::Timestamp, Value::Timestamp(ts)) => Ok(Value::Timestamp(*ts)),
        (declared, value) => Err(TransformError::SchemaMismatch(format!(
            "row {}: column declared {declared} but holds {}",
            index + 1,
            value.type_name()
        ))),
    }
}
