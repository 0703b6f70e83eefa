// src/schema/types.rs

use serde::{Deserialize, Serialize};

/// Logical type of a contract column.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    String,
    Float,
    Date,
}

/// A single column of the transaction contract.
#[derive(Debug, PartialEq, Clone, Copy, Eq, Hash)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    /// Required columns must be non-null for a row to be accepted.
    pub required: bool,
}

impl Column {
    const fn new(name: &'static str, ty: ColumnType, required: bool) -> Self {
        Self { name, ty, required }
    }
}

pub const TRANSACTION_ID: &str = "transaction_id";
pub const PRODUCT_NAME: &str = "product_name";
pub const CATEGORY: &str = "category";
pub const PRICE: &str = "price";
pub const QUANTITY: &str = "quantity";
pub const DATE: &str = "date";
pub const CUSTOMER_NAME: &str = "customer_name";
pub const CUSTOMER_EMAIL: &str = "customer_email";

/// The fixed, positional 8-column contract shared by cleaned artifacts and the
/// destination table.
pub const TRANSACTION_COLUMNS: [Column; 8] = [
    Column::new(TRANSACTION_ID, ColumnType::Integer, false),
    Column::new(PRODUCT_NAME, ColumnType::String, true),
    Column::new(CATEGORY, ColumnType::String, true),
    Column::new(PRICE, ColumnType::Float, true),
    Column::new(QUANTITY, ColumnType::Integer, true),
    Column::new(DATE, ColumnType::Date, true),
    Column::new(CUSTOMER_NAME, ColumnType::String, false),
    Column::new(CUSTOMER_EMAIL, ColumnType::String, false),
];

/// Names of the columns that must be present in every input header.
pub fn required_header() -> impl Iterator<Item = &'static str> {
    TRANSACTION_COLUMNS.iter().map(|c| c.name)
}

/// Position of `name` in the contract.
pub fn position(name: &str) -> Option<usize> {
    TRANSACTION_COLUMNS.iter().position(|c| c.name == name)
}
