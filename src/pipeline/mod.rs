//! The two batch stages: `input/` → `clean/` + `error/`, then `clean/` → table + `done/`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::history::{LedgerEntry, RunLedger};
use crate::load::{BatchLoader, LoadedArtifact, TableLoader};
use crate::process::{clean_file, policy::ValidationPolicy};
use crate::route::{FileRouter, RouteReport, RoutingInput};
use crate::staging::StagingArea;
use crate::storage::{list_artifacts, ObjectStore};

/// An artifact whose processing failed; it was left where it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedArtifact {
    pub key: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleaningSummary {
    pub started_at: DateTime<Utc>,
    pub routed: Vec<RouteReport>,
    /// Inputs deleted after their outputs were verified.
    pub consumed: Vec<String>,
    pub failed: Vec<FailedArtifact>,
}

impl CleaningSummary {
    pub fn accepted_rows(&self) -> usize {
        self.routed.iter().map(|r| r.accepted_rows).sum()
    }

    pub fn rejected_rows(&self) -> usize {
        self.routed.iter().map(|r| r.rejected_rows).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadingSummary {
    pub started_at: DateTime<Utc>,
    pub loaded: Vec<LoadedArtifact>,
    pub failed: Vec<FailedArtifact>,
}

impl LoadingSummary {
    /// Rows appended, counting only jobs that reported a figure.
    pub fn loaded_rows(&self) -> u64 {
        self.loaded.iter().filter_map(|l| l.rows).sum()
    }
}

/// Sequential driver over one bucket and one destination table. Clients are
/// injected; nothing here is global.
pub struct Pipeline {
    store: Arc<dyn ObjectStore>,
    loader: Arc<dyn TableLoader>,
    config: PipelineConfig,
    policy: ValidationPolicy,
    ledger: Option<RunLedger>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        loader: Arc<dyn TableLoader>,
        config: PipelineConfig,
    ) -> anyhow::Result<Self> {
        let ledger = config.ledger_dir.as_ref().map(RunLedger::new).transpose()?;
        Ok(Self {
            store,
            loader,
            policy: config.validation_policy(),
            config,
            ledger,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process every artifact under `input/`. Per-file failures are logged
    /// and counted; only listing or staging failures abort the stage.
    #[instrument(level = "info", skip(self))]
    pub async fn run_cleaning(&self) -> Result<CleaningSummary> {
        let started_at = Utc::now();
        let prefixes = &self.config.prefixes;
        let staging = Arc::new(StagingArea::new(self.config.staging_dir.as_deref())?);
        let router = FileRouter::new(
            self.store.clone(),
            staging.clone(),
            prefixes.input.as_str(),
            prefixes.clean.as_str(),
            prefixes.error.as_str(),
            self.policy.routing,
        )
        .with_empty_artifacts(self.config.write_empty_artifacts);

        let keys = list_artifacts(self.store.as_ref(), &prefixes.input).await?;
        info!(prefix = %prefixes.input, count = keys.len(), "cleaning stage starting");

        let mut summary = CleaningSummary {
            started_at,
            routed: Vec::new(),
            consumed: Vec::new(),
            failed: Vec::new(),
        };
        let mut entries = Vec::with_capacity(keys.len());

        for key in keys {
            match self.clean_one(&staging, &router, &key).await {
                Ok((report, consumed)) => {
                    entries.push(LedgerEntry {
                        key: key.clone(),
                        stage: "clean".into(),
                        outcome: report.disposition.as_str().into(),
                        accepted_rows: report.accepted_rows as u64,
                        rejected_rows: report.rejected_rows as u64,
                        destination: Some(report.destinations().collect::<Vec<_>>().join(","))
                            .filter(|d| !d.is_empty()),
                        error: None,
                        event_time: Utc::now(),
                    });
                    if consumed {
                        summary.consumed.push(key);
                    }
                    summary.routed.push(report);
                }
                Err(e) => {
                    error!(key = %key, error = %e, "failed to process input; left in place");
                    entries.push(failed_entry(&key, "clean", &e));
                    summary.failed.push(FailedArtifact {
                        key,
                        error: e.to_string(),
                    });
                }
            }
        }

        self.record("clean", started_at, &entries);
        info!(
            routed = summary.routed.len(),
            failed = summary.failed.len(),
            accepted = summary.accepted_rows(),
            rejected = summary.rejected_rows(),
            "cleaning stage finished"
        );
        Ok(summary)
    }

    async fn clean_one(
        &self,
        staging: &StagingArea,
        router: &FileRouter,
        key: &str,
    ) -> Result<(RouteReport, bool)> {
        let staged = staging.stage(key)?;
        self.store.download(key, staged.path()).await?;

        let report = match clean_file(staged.path(), key, &self.policy) {
            Ok(file) => {
                let input = RoutingInput::Cleaned {
                    staged: staged.path(),
                    file: &file,
                };
                router.route(key, input).await?
            }
            Err(err) => {
                let input = RoutingInput::Unreadable {
                    staged: staged.path(),
                    error: &err,
                };
                router.route(key, input).await?
            }
        };

        let consumed = self.config.consume_input && self.consume(key, &report).await?;
        Ok((report, consumed))
    }

    /// Delete `key` once every routed output for it is visible.
    async fn consume(&self, key: &str, report: &RouteReport) -> Result<bool> {
        for dst in report.destinations() {
            if !self.store.exists(dst).await? {
                return Err(PipelineError::storage(
                    "consume",
                    key,
                    format!("routed output `{dst}` not visible; input kept"),
                ));
            }
        }
        self.store.delete(key).await?;
        Ok(true)
    }

    /// Append every artifact under `clean/` and archive it to `done/`.
    #[instrument(level = "info", skip(self), fields(table = %self.loader.destination()))]
    pub async fn run_loading(&self) -> Result<LoadingSummary> {
        let started_at = Utc::now();
        let prefixes = &self.config.prefixes;
        let batch_loader = BatchLoader::new(
            self.store.clone(),
            self.loader.clone(),
            prefixes.clean.as_str(),
            prefixes.done.as_str(),
        );

        let keys = list_artifacts(self.store.as_ref(), &prefixes.clean).await?;
        info!(prefix = %prefixes.clean, count = keys.len(), "loading stage starting");

        let mut summary = LoadingSummary {
            started_at,
            loaded: Vec::new(),
            failed: Vec::new(),
        };
        let mut entries = Vec::with_capacity(keys.len());

        for key in keys {
            match batch_loader.load_artifact(&key).await {
                Ok(loaded) => {
                    entries.push(LedgerEntry {
                        key: key.clone(),
                        stage: "load".into(),
                        outcome: "loaded".into(),
                        accepted_rows: loaded.rows.unwrap_or_default(),
                        rejected_rows: 0,
                        destination: Some(loaded.done_key.clone()),
                        error: None,
                        event_time: Utc::now(),
                    });
                    summary.loaded.push(loaded);
                }
                Err(e) => {
                    error!(key = %key, error = %e, "failed to load artifact; left in place");
                    entries.push(failed_entry(&key, "load", &e));
                    summary.failed.push(FailedArtifact {
                        key,
                        error: e.to_string(),
                    });
                }
            }
        }

        self.record("load", started_at, &entries);
        info!(
            loaded = summary.loaded.len(),
            failed = summary.failed.len(),
            rows = summary.loaded_rows(),
            "loading stage finished"
        );
        Ok(summary)
    }

    /// A ledger write failure never fails the stage.
    fn record(&self, stage: &str, started_at: DateTime<Utc>, entries: &[LedgerEntry]) {
        let Some(ledger) = &self.ledger else {
            return;
        };
        match ledger.record_run(stage, started_at, entries) {
            Ok(Some(path)) => info!(path = %path.display(), "ledger written"),
            Ok(None) => {}
            Err(e) => warn!(stage, error = %e, "could not write run ledger"),
        }
    }
}

fn failed_entry(key: &str, stage: &str, e: &PipelineError) -> LedgerEntry {
    LedgerEntry {
        key: key.to_string(),
        stage: stage.to_string(),
        outcome: "failed".into(),
        accepted_rows: 0,
        rejected_rows: 0,
        destination: None,
        error: Some(e.to_string()),
        event_time: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::read_ledger;
    use crate::load::MemoryTable;
    use crate::storage::MemoryStore;

    const MIXED: &str = "transaction_id,product_name,category,price,quantity,date,customer_name,customer_email\n\
                         1,Mouse,Tech,19.99,2,2024-01-05,,\n\
                         2,Desk,Home,oops,1,2024-01-06,,\n";

    fn pipeline(config: PipelineConfig) -> (Arc<MemoryStore>, Arc<MemoryTable>, Pipeline) {
        let store = Arc::new(MemoryStore::new());
        let table = Arc::new(MemoryTable::new(store.clone(), "transactions"));
        let p = Pipeline::new(store.clone(), table.clone(), config).unwrap();
        (store, table, p)
    }

    #[tokio::test]
    async fn cleaning_keeps_input_when_not_consuming() {
        let config = PipelineConfig {
            consume_input: false,
            ..Default::default()
        };
        let (store, _table, p) = pipeline(config);
        store.put_bytes("input/a.csv", MIXED.as_bytes());

        let summary = p.run_cleaning().await.unwrap();
        assert_eq!(summary.routed.len(), 1);
        assert!(summary.consumed.is_empty());
        assert!(store.get_bytes("input/a.csv").is_some());

        // a rerun reprocesses the same input into the same keys
        let again = p.run_cleaning().await.unwrap();
        assert_eq!(again.routed, summary.routed);
    }

    #[tokio::test]
    async fn invisible_outputs_keep_the_input() {
        let (store, _table, p) = pipeline(PipelineConfig::default());
        store.put_bytes("input/a.csv", MIXED.as_bytes());
        store.drop_writes_to("clean/");

        let summary = p.run_cleaning().await.unwrap();
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].error.contains("not visible"));
        assert!(store.get_bytes("input/a.csv").is_some());
    }

    #[tokio::test]
    async fn placeholders_are_skipped_and_inputs_consumed() {
        let (store, _table, p) = pipeline(PipelineConfig::default());
        store.put_bytes("input/a.csv", MIXED.as_bytes());
        store.put_bytes("input/b.csv", MIXED.as_bytes());
        store.put_bytes("input/.placeholder", b"");

        let summary = p.run_cleaning().await.unwrap();
        assert_eq!(summary.routed.len(), 2);
        assert_eq!(summary.consumed, vec!["input/a.csv", "input/b.csv"]);
        assert_eq!(summary.accepted_rows(), 2);
        assert_eq!(summary.rejected_rows(), 2);
    }

    #[tokio::test]
    async fn ledger_records_both_stages() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            ledger_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let (store, table, p) = pipeline(config);
        store.put_bytes("input/a.csv", MIXED.as_bytes());

        p.run_cleaning().await.unwrap();
        let loading = p.run_loading().await.unwrap();
        assert_eq!(loading.loaded_rows(), 1);
        assert_eq!(table.row_count(), 1);

        let mut files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        assert_eq!(files.len(), 2);
        let clean = files
            .iter()
            .find(|p| p.file_name().unwrap().to_string_lossy().starts_with("clean---"))
            .unwrap();
        let entries = read_ledger(clean).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, "split");
        assert_eq!(
            entries[0].destination.as_deref(),
            Some("clean/a_cleaned.csv,error/a_errors.csv")
        );
    }
}
