// src/schema/arrow.rs

use arrow::datatypes::{DataType, Field as ArrowField, Schema as ArrowSchema, SchemaRef};
use std::sync::{Arc, OnceLock};

use super::types::{ColumnType, TRANSACTION_COLUMNS};

/// Map a contract column type into an Arrow DataType.
///
/// - Integer → Int64
/// - String  → Utf8
/// - Float   → Float64
/// - Date    → Date32
pub fn map_to_arrow_type(ty: ColumnType) -> DataType {
    match ty {
        ColumnType::Integer => DataType::Int64,
        ColumnType::String => DataType::Utf8,
        ColumnType::Float => DataType::Float64,
        ColumnType::Date => DataType::Date32,
    }
}

/// Arrow schema of a coerced transaction batch.
///
/// Every field is nullable at the Arrow level; requiredness is a row-level
/// acceptance rule enforced by the classifier.
pub fn transaction_schema() -> SchemaRef {
    static SCHEMA: OnceLock<SchemaRef> = OnceLock::new();
    SCHEMA
        .get_or_init(|| {
            let fields: Vec<ArrowField> = TRANSACTION_COLUMNS
                .iter()
                .map(|col| ArrowField::new(col.name, map_to_arrow_type(col.ty), true))
                .collect();
            Arc::new(ArrowSchema::new(fields))
        })
        .clone()
}
