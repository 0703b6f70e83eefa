pub mod arrow;
pub mod types;

pub use self::arrow::{map_to_arrow_type, transaction_schema};
pub use types::{Column, ColumnType, TRANSACTION_COLUMNS};
