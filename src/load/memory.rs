use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use super::{LoadReport, TableLoader};
use crate::error::{PipelineError, Result};
use crate::process::classify::{classify, RejectReason};
use crate::process::policy::{FillPolicy, ValidationPolicy};
use crate::process::raw_table::RawTable;
use crate::process::validate::validate;
use crate::schema::types::required_header;
use crate::storage::MemoryStore;

#[derive(Debug, Default)]
struct TableState {
    rows: Vec<Vec<String>>,
    failing: HashSet<String>,
}

/// In-memory destination table reading `mem://` artifacts from a
/// [`MemoryStore`]. Enforces the same all-or-nothing contract as a load job.
#[derive(Debug)]
pub struct MemoryTable {
    store: Arc<MemoryStore>,
    name: String,
    state: Mutex<TableState>,
}

impl MemoryTable {
    pub fn new(store: Arc<MemoryStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
            state: Mutex::new(TableState::default()),
        }
    }

    /// Make every future job for `uri` fail.
    pub fn fail_uri(&self, uri: &str) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failing
            .insert(uri.to_string());
    }

    pub fn row_count(&self) -> usize {
        self.rows().len()
    }

    /// Appended rows, cells as written in the artifact.
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rows
            .clone()
    }
}

#[async_trait]
impl TableLoader for MemoryTable {
    async fn append_csv(&self, source_uri: &str) -> Result<LoadReport> {
        if self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failing
            .contains(source_uri)
        {
            return Err(PipelineError::load_job(source_uri, "injected failure"));
        }

        let key = source_uri
            .strip_prefix("mem://")
            .ok_or_else(|| PipelineError::load_job(source_uri, "not a mem:// uri"))?;
        let bytes = self
            .store
            .get_bytes(key)
            .ok_or_else(|| PipelineError::load_job(source_uri, "source object not found"))?;

        let raw = RawTable::from_reader(bytes.as_slice(), key)
            .map_err(|e| PipelineError::load_job(source_uri, e))?;
        if !raw.headers.iter().map(String::as_str).eq(required_header()) {
            return Err(PipelineError::load_job(
                source_uri,
                format!("column layout {:?} does not match the table", raw.headers),
            ));
        }

        // A load job accepts nothing it would have to coerce or default.
        let strict = ValidationPolicy {
            fill: FillPolicy::StrictReject,
            ..Default::default()
        };
        let validated = validate(&raw, &strict).map_err(|e| PipelineError::load_job(source_uri, e))?;
        let classification = classify(&validated).map_err(|e| PipelineError::load_job(source_uri, e))?;
        if let Some(bad) = classification.rejected.first() {
            return Err(match bad.reasons.first() {
                Some(RejectReason::Coercion(failure)) => PipelineError::RowCoercion(failure.clone()),
                _ => PipelineError::load_job(source_uri, format!("row {}: {}", bad.row, bad.describe())),
            });
        }

        let appended = raw.num_rows() as u64;
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rows
            .extend(raw.rows);
        Ok(LoadReport {
            job_id: format!("mem_{}", Uuid::new_v4().simple()),
            rows: Some(appended),
        })
    }

    fn destination(&self) -> String {
        format!("mem:{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "transaction_id,product_name,category,price,quantity,date,customer_name,customer_email\n";

    #[tokio::test]
    async fn appends_valid_artifact() {
        let store = Arc::new(MemoryStore::new());
        store.put_bytes(
            "clean/a.csv",
            format!("{HEADER}1,Mouse,Tech,19.99,2,2024-01-05,,\n").as_bytes(),
        );
        let table = MemoryTable::new(store.clone(), "t");
        let report = table.append_csv("mem://clean/a.csv").await.unwrap();
        assert_eq!(report.rows, Some(1));
        assert_eq!(table.rows()[0][1], "Mouse");
    }

    #[tokio::test]
    async fn invalid_row_fails_whole_job() {
        let store = Arc::new(MemoryStore::new());
        store.put_bytes(
            "clean/a.csv",
            format!("{HEADER}1,Mouse,Tech,19.99,2,2024-01-05,,\n2,Desk,Home,x,1,2024-01-06,,\n")
                .as_bytes(),
        );
        let table = MemoryTable::new(store.clone(), "t");
        match table.append_csv("mem://clean/a.csv").await {
            Err(PipelineError::RowCoercion(failure)) => {
                assert_eq!(failure.row, 1);
                assert_eq!(failure.column, "price");
                assert_eq!(failure.value, "x");
            }
            other => panic!("expected a coercion failure, got {other:?}"),
        }
        assert_eq!(table.row_count(), 0);
    }

    #[tokio::test]
    async fn missing_required_value_is_a_load_job_error() {
        let store = Arc::new(MemoryStore::new());
        store.put_bytes(
            "clean/a.csv",
            format!("{HEADER}1,Mouse,Tech,19.99,,2024-01-05,,\n").as_bytes(),
        );
        let table = MemoryTable::new(store.clone(), "t");
        assert!(matches!(
            table.append_csv("mem://clean/a.csv").await,
            Err(PipelineError::LoadJob { .. })
        ));
    }

    #[tokio::test]
    async fn reordered_columns_are_refused() {
        let store = Arc::new(MemoryStore::new());
        store.put_bytes(
            "clean/a.csv",
            b"product_name,transaction_id,category,price,quantity,date,customer_name,customer_email\nMouse,1,Tech,1.0,1,2024-01-05,,\n",
        );
        let table = MemoryTable::new(store.clone(), "t");
        assert!(table.append_csv("mem://clean/a.csv").await.is_err());
    }
}
