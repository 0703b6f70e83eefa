//! Header contract check and per-column type coercion.

use arrow::{
    array::{ArrayRef, Date32Builder, Float64Builder, Int64Builder, StringBuilder},
    record_batch::RecordBatch,
};
use std::sync::Arc;
use tracing::debug;

use crate::error::{PipelineError, Result, RowCoercionFailure};
use crate::process::date_parser::{parse_iso_date, to_date32};
use crate::process::policy::ValidationPolicy;
use crate::process::raw_table::RawTable;
use crate::process::utils::{clean_cell, parse_f64, parse_i64};
use crate::schema::{transaction_schema, types::*, TRANSACTION_COLUMNS};

/// A coerced batch in contract column order, plus the cells whose value was
/// lost during coercion (non-empty input that ended up null).
#[derive(Debug, Clone)]
pub struct ValidatedBatch {
    pub batch: RecordBatch,
    pub failures: Vec<RowCoercionFailure>,
}

impl ValidatedBatch {
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }
}

/// Check `raw` against the contract header and coerce every row.
///
/// Pure: no I/O, and `raw` is left untouched.
pub fn validate(raw: &RawTable, policy: &ValidationPolicy) -> Result<ValidatedBatch> {
    let missing: Vec<String> = required_header()
        .filter(|name| raw.column_index(name).is_none())
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::SchemaMismatch { missing });
    }

    let mut idx = [0usize; TRANSACTION_COLUMNS.len()];
    for (slot, col) in idx.iter_mut().zip(TRANSACTION_COLUMNS.iter()) {
        // presence checked above
        *slot = raw.column_index(col.name).unwrap_or_default();
    }

    let n = raw.num_rows();
    let fill = policy.fills();
    let mut transaction_id = Int64Builder::with_capacity(n);
    let mut product_name = StringBuilder::new();
    let mut category = StringBuilder::new();
    let mut price = Float64Builder::with_capacity(n);
    let mut quantity = Int64Builder::with_capacity(n);
    let mut date = Date32Builder::with_capacity(n);
    let mut customer_name = StringBuilder::new();
    let mut customer_email = StringBuilder::new();
    let mut failures = Vec::new();

    for (r, row) in raw.rows.iter().enumerate() {
        let cell = |i: usize| clean_cell(row.get(idx[i]).map(String::as_str).unwrap_or(""));
        let mut lost = |column: &'static str, value: String| {
            failures.push(RowCoercionFailure {
                row: r,
                column,
                value,
            })
        };

        // transaction_id: nullable integer, 0 when filling
        let v = match cell(0) {
            None => None,
            Some(s) => match parse_i64(&s) {
                Some(v) => Some(v),
                None if fill => None,
                None => {
                    lost(TRANSACTION_ID, s);
                    None
                }
            },
        };
        transaction_id.append_option(if fill { Some(v.unwrap_or(0)) } else { v });

        product_name.append_option(
            cell(1).or_else(|| fill.then(|| policy.defaults.product_name.clone())),
        );
        category.append_option(cell(2).or_else(|| fill.then(|| policy.defaults.category.clone())));

        // price is never defaulted
        price.append_option(cell(3).and_then(|s| {
            let v = parse_f64(&s);
            if v.is_none() {
                lost(PRICE, s);
            }
            v
        }));

        // quantity: only an empty cell is filled; a bad value rejects the row
        quantity.append_option(match cell(4) {
            None => fill.then_some(0),
            Some(s) => {
                let v = parse_i64(&s);
                if v.is_none() {
                    lost(QUANTITY, s);
                }
                v
            }
        });

        date.append_option(cell(5).and_then(|s| {
            let v = parse_iso_date(&s).map(to_date32);
            if v.is_none() {
                lost(DATE, s);
            }
            v
        }));

        customer_name.append_option(cell(6));
        customer_email.append_option(cell(7));
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(transaction_id.finish()),
        Arc::new(product_name.finish()),
        Arc::new(category.finish()),
        Arc::new(price.finish()),
        Arc::new(quantity.finish()),
        Arc::new(date.finish()),
        Arc::new(customer_name.finish()),
        Arc::new(customer_email.finish()),
    ];
    let batch = RecordBatch::try_new(transaction_schema(), columns)?;

    debug!(
        rows = batch.num_rows(),
        lost_cells = failures.len(),
        "validated batch"
    );
    Ok(ValidatedBatch { batch, failures })
}
