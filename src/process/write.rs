use arrow::{csv::WriterBuilder, record_batch::RecordBatch};
use std::io::Write;

use crate::error::{PipelineError, Result};
use crate::process::classify::RejectedRow;
use crate::process::raw_table::RawTable;

/// Name of the extra column appended to rejected rows.
pub const REJECTION_REASON: &str = "rejection_reason";

/// Write the accepted batch as header + canonical 8-column rows; dates are
/// written as `YYYY-MM-DD` and nulls as empty cells.
pub fn write_accepted_csv<W: Write>(batch: &RecordBatch, out: W) -> Result<()> {
    let mut writer = WriterBuilder::new().with_header(true).build(out);
    writer.write(batch)?;
    Ok(())
}

/// Write rejected rows with their original cells, in source order, plus a
/// trailing `rejection_reason` column.
pub fn write_rejected_csv<W: Write>(raw: &RawTable, rejected: &[RejectedRow], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    let csv_err = |e: csv::Error| PipelineError::Io(e.into());

    let mut header = raw.headers.clone();
    header.push(REJECTION_REASON.to_string());
    writer.write_record(&header).map_err(csv_err)?;

    for rej in rejected {
        let Some(row) = raw.rows.get(rej.row) else {
            continue;
        };
        let mut record = row.clone();
        record.push(rej.describe());
        writer.write_record(&record).map_err(csv_err)?;
    }
    writer.flush()?;
    Ok(())
}
