// src/history/mod.rs

use anyhow::{Context, Result};
use arrow::array::{Array, ArrayRef, StringArray, TimestampMicrosecondArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::Serialize;
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
    sync::Arc,
};

/// One processed artifact in a stage run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub key: String,
    pub stage: String,
    /// `routed`, `unreadable`, `loaded`, `failed`, ...
    pub outcome: String,
    pub accepted_rows: u64,
    pub rejected_rows: u64,
    /// Comma-separated keys written for this artifact.
    pub destination: Option<String>,
    pub error: Option<String>,
    pub event_time: DateTime<Utc>,
}

fn ledger_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        Field::new("stage", DataType::Utf8, false),
        Field::new("outcome", DataType::Utf8, false),
        Field::new("accepted_rows", DataType::UInt64, false),
        Field::new("rejected_rows", DataType::UInt64, false),
        Field::new("destination", DataType::Utf8, true),
        Field::new("error", DataType::Utf8, true),
        Field::new(
            "event_time",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        ),
    ]))
}

/// Per-run audit trail: one Parquet file per stage run, named
/// `<stage>---<run_ts>.parquet`.
#[derive(Debug, Clone)]
pub struct RunLedger {
    ledger_dir: PathBuf,
}

impl RunLedger {
    /// Construct a ledger at `ledger_dir`, creating the directory if needed.
    pub fn new(ledger_dir: impl Into<PathBuf>) -> Result<Self> {
        let ledger_dir = ledger_dir.into();
        fs::create_dir_all(&ledger_dir)
            .with_context(|| format!("creating ledger directory {:?}", &ledger_dir))?;
        Ok(Self { ledger_dir })
    }

    /// Write `entries` for one run of `stage`. Nothing is written for an
    /// empty run. Returns the final file path.
    pub fn record_run(
        &self,
        stage: &str,
        run_started: DateTime<Utc>,
        entries: &[LedgerEntry],
    ) -> Result<Option<PathBuf>> {
        if entries.is_empty() {
            return Ok(None);
        }
        let fname = format!("{}---{}.parquet", stage, run_started.timestamp_micros());
        let final_path = self.ledger_dir.join(&fname);
        let tmp_path = self.ledger_dir.join(format!("{}.tmp", fname));

        let schema = ledger_schema();
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.key.as_str()))),
            Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.stage.as_str()))),
            Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.outcome.as_str()))),
            Arc::new(UInt64Array::from_iter_values(entries.iter().map(|e| e.accepted_rows))),
            Arc::new(UInt64Array::from_iter_values(entries.iter().map(|e| e.rejected_rows))),
            Arc::new(StringArray::from_iter(entries.iter().map(|e| e.destination.as_deref()))),
            Arc::new(StringArray::from_iter(entries.iter().map(|e| e.error.as_deref()))),
            Arc::new(TimestampMicrosecondArray::from_iter_values(
                entries.iter().map(|e| e.event_time.timestamp_micros()),
            )),
        ];
        let batch = RecordBatch::try_new(schema.clone(), columns)
            .context("building ledger record batch")?;

        let file = File::create(&tmp_path)
            .with_context(|| format!("could not create temporary file `{}`", tmp_path.display()))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(BufWriter::new(file), schema, Some(props))
            .context("creating Arrow writer for ledger")?;
        writer.write(&batch).context("writing ledger batch")?;
        writer.close().context("closing ledger writer")?;

        fs::rename(&tmp_path, &final_path).with_context(|| {
            format!(
                "failed to rename `{}` to `{}`",
                tmp_path.display(),
                final_path.display()
            )
        })?;
        Ok(Some(final_path))
    }
}

/// Read every entry of one ledger file back.
pub fn read_ledger(path: &Path) -> Result<Vec<LedgerEntry>> {
    let file = File::open(path).with_context(|| format!("opening ledger {}", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut out = Vec::new();
    for batch in reader {
        let batch = batch?;
        let text = |i: usize| -> Result<&StringArray> {
            batch
                .column(i)
                .as_any()
                .downcast_ref::<StringArray>()
                .context("ledger column is not Utf8")
        };
        let count = |i: usize| -> Result<&UInt64Array> {
            batch
                .column(i)
                .as_any()
                .downcast_ref::<UInt64Array>()
                .context("ledger column is not UInt64")
        };
        let (key, stage, outcome) = (text(0)?, text(1)?, text(2)?);
        let (accepted, rejected) = (count(3)?, count(4)?);
        let (destination, error) = (text(5)?, text(6)?);
        let time = batch
            .column(7)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .context("ledger event_time is not a timestamp")?;

        let opt = |a: &StringArray, i: usize| (!a.is_null(i)).then(|| a.value(i).to_string());
        for i in 0..batch.num_rows() {
            out.push(LedgerEntry {
                key: key.value(i).to_string(),
                stage: stage.value(i).to_string(),
                outcome: outcome.value(i).to_string(),
                accepted_rows: accepted.value(i),
                rejected_rows: rejected.value(i),
                destination: opt(destination, i),
                error: opt(error, i),
                event_time: DateTime::from_timestamp_micros(time.value(i))
                    .context("ledger event_time out of range")?,
            });
        }
    }
    Ok(out)
}
