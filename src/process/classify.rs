//! Order-preserving partition of a coerced batch into accepted and rejected rows.

use arrow::{
    array::{Array, BooleanArray},
    compute::filter_record_batch,
    record_batch::RecordBatch,
};
use std::fmt;

use crate::error::{Result, RowCoercionFailure};
use crate::process::validate::ValidatedBatch;
use crate::schema::TRANSACTION_COLUMNS;

/// Why a single row was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Coercion(RowCoercionFailure),
    MissingValue(&'static str),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Coercion(c) => write!(f, "{}: invalid value {:?}", c.column, c.value),
            RejectReason::MissingValue(col) => write!(f, "{}: missing required value", col),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    /// Index of the row in the source batch.
    pub row: usize,
    pub reasons: Vec<RejectReason>,
}

impl RejectedRow {
    /// Reasons joined into a single cell-friendly string.
    pub fn describe(&self) -> String {
        self.reasons
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub accepted: RecordBatch,
    /// Rejected rows in source order.
    pub rejected: Vec<RejectedRow>,
}

impl Classification {
    pub fn accepted_rows(&self) -> usize {
        self.accepted.num_rows()
    }

    pub fn rejected_rows(&self) -> usize {
        self.rejected.len()
    }

    pub fn all_accepted(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// A row is accepted iff every required contract column is non-null.
pub fn classify(validated: &ValidatedBatch) -> Result<Classification> {
    let batch = &validated.batch;
    let n = batch.num_rows();
    let mut reasons: Vec<Vec<RejectReason>> = vec![Vec::new(); n];

    for (i, col) in TRANSACTION_COLUMNS.iter().enumerate() {
        if !col.required {
            continue;
        }
        let array = batch.column(i);
        if array.null_count() == 0 {
            continue;
        }
        for (row, slot) in reasons.iter_mut().enumerate() {
            if array.is_null(row) {
                let reason = validated
                    .failures
                    .iter()
                    .find(|f| f.row == row && f.column == col.name)
                    .map(|f| RejectReason::Coercion(f.clone()))
                    .unwrap_or(RejectReason::MissingValue(col.name));
                slot.push(reason);
            }
        }
    }

    let mask: BooleanArray = reasons.iter().map(|r| Some(r.is_empty())).collect();
    let accepted = filter_record_batch(batch, &mask)?;
    let rejected = reasons
        .into_iter()
        .enumerate()
        .filter(|(_, r)| !r.is_empty())
        .map(|(row, reasons)| RejectedRow { row, reasons })
        .collect();

    Ok(Classification { accepted, rejected })
}
