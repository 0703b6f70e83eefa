//! Append cleaned artifacts to the destination table, then archive them.

mod bigquery;
mod duck;
mod memory;

pub use bigquery::{bigquery_schema, BigQueryLoader};
pub use duck::DuckDbLoader;
pub use memory::MemoryTable;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::error::{PipelineError, Result};
use crate::storage::{move_artifact, swap_prefix, ObjectStore};

/// Outcome of one completed append job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub job_id: String,
    /// Rows appended, when the backend reports it.
    pub rows: Option<u64>,
}

/// A bulk-append service bound to one destination table with the fixed
/// transaction schema. CSV input, one header row skipped, append-only.
///
/// `append_csv` returns only once the job has finished; a job either lands
/// completely or not at all.
#[async_trait]
pub trait TableLoader: Send + Sync {
    async fn append_csv(&self, source_uri: &str) -> Result<LoadReport>;

    /// Fully qualified destination, for logs.
    fn destination(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedArtifact {
    pub key: String,
    pub done_key: String,
    pub job_id: String,
    pub rows: Option<u64>,
}

pub struct BatchLoader {
    store: Arc<dyn ObjectStore>,
    loader: Arc<dyn TableLoader>,
    clean_prefix: String,
    done_prefix: String,
}

impl BatchLoader {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        loader: Arc<dyn TableLoader>,
        clean_prefix: impl Into<String>,
        done_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            loader,
            clean_prefix: clean_prefix.into(),
            done_prefix: done_prefix.into(),
        }
    }

    /// Append `key` to the table and move it to `done/` once the job has
    /// succeeded. On failure the artifact is left where it is.
    #[instrument(level = "info", skip(self), fields(table = %self.loader.destination()))]
    pub async fn load_artifact(&self, key: &str) -> Result<LoadedArtifact> {
        let done_key = swap_prefix(key, &self.clean_prefix, &self.done_prefix).ok_or_else(|| {
            PipelineError::storage(
                "load",
                key,
                format!("not under the `{}` prefix", self.clean_prefix),
            )
        })?;

        let uri = self.store.uri(key);
        let report = self.loader.append_csv(&uri).await?;
        info!(uri = %uri, job_id = %report.job_id, rows = ?report.rows, "load job done");

        move_artifact(self.store.as_ref(), key, &done_key).await?;

        Ok(LoadedArtifact {
            key: key.to_string(),
            done_key,
            job_id: report.job_id,
            rows: report.rows,
        })
    }
}
