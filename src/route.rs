//! Decide where each part of a processed input file lands.

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::{PipelineError, Result};
use crate::process::policy::RoutingPolicy;
use crate::process::write::{write_accepted_csv, write_rejected_csv};
use crate::process::CleanedFile;
use crate::staging::StagingArea;
use crate::storage::{strip_extension, ObjectStore};

/// What the router was handed for one input key. `staged` always holds the
/// original bytes of the input.
#[derive(Debug, Clone, Copy)]
pub enum RoutingInput<'a> {
    Cleaned {
        staged: &'a Path,
        file: &'a CleanedFile,
    },
    /// The file could not be decoded or validated as a whole.
    Unreadable {
        staged: &'a Path,
        error: &'a PipelineError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Disposition {
    /// Accepted rows to `clean/`, rejected rows to `error/`.
    Split,
    /// Whole-file policy, every row valid.
    Accepted,
    /// Whole-file policy, at least one invalid row: original copied to `error/`.
    Rejected,
    /// Original copied to `error/` because it could not be processed.
    Unreadable,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Split => "split",
            Disposition::Accepted => "accepted",
            Disposition::Rejected => "rejected",
            Disposition::Unreadable => "unreadable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteReport {
    pub input_key: String,
    pub disposition: Disposition,
    pub accepted_rows: usize,
    pub rejected_rows: usize,
    pub clean_key: Option<String>,
    pub error_key: Option<String>,
}

impl RouteReport {
    /// Every object written for this input.
    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.clean_key.iter().chain(self.error_key.iter()).map(String::as_str)
    }
}

/// Writes routed artifacts. Never deletes its input.
pub struct FileRouter {
    store: Arc<dyn ObjectStore>,
    staging: Arc<StagingArea>,
    input_prefix: String,
    clean_prefix: String,
    error_prefix: String,
    routing: RoutingPolicy,
    write_empty_artifacts: bool,
}

impl FileRouter {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        staging: Arc<StagingArea>,
        input_prefix: impl Into<String>,
        clean_prefix: impl Into<String>,
        error_prefix: impl Into<String>,
        routing: RoutingPolicy,
    ) -> Self {
        Self {
            store,
            staging,
            input_prefix: input_prefix.into(),
            clean_prefix: clean_prefix.into(),
            error_prefix: error_prefix.into(),
            routing,
            write_empty_artifacts: false,
        }
    }

    /// Also write header-only artifacts for empty subsets.
    pub fn with_empty_artifacts(mut self, write_empty_artifacts: bool) -> Self {
        self.write_empty_artifacts = write_empty_artifacts;
        self
    }

    fn relative<'k>(&self, input_key: &'k str) -> Result<&'k str> {
        input_key
            .strip_prefix(self.input_prefix.as_str())
            .filter(|rest| !rest.is_empty())
            .ok_or_else(|| {
                PipelineError::storage(
                    "route",
                    input_key,
                    format!("not under the `{}` prefix", self.input_prefix),
                )
            })
    }

    #[instrument(level = "info", skip(self, input))]
    pub async fn route(&self, input_key: &str, input: RoutingInput<'_>) -> Result<RouteReport> {
        let relative = self.relative(input_key)?;
        let stem = strip_extension(relative);

        let mut report = RouteReport {
            input_key: input_key.to_string(),
            disposition: Disposition::Split,
            accepted_rows: 0,
            rejected_rows: 0,
            clean_key: None,
            error_key: None,
        };

        match input {
            RoutingInput::Unreadable { staged, error } => {
                let dst = format!("{}{}", self.error_prefix, relative);
                self.store.upload(staged, &dst).await?;
                warn!(key = %input_key, dst = %dst, %error, "unreadable input copied to error prefix");
                report.disposition = Disposition::Unreadable;
                report.error_key = Some(dst);
            }
            RoutingInput::Cleaned { staged, file } => {
                report.accepted_rows = file.accepted_rows();
                report.rejected_rows = file.rejected_rows();
                match self.routing {
                    RoutingPolicy::SplitByRow => {
                        report.disposition = Disposition::Split;
                        // errors first: a clean artifact is only published once the
                        // rest of the file is safely placed
                        if report.rejected_rows > 0 || self.write_empty_artifacts {
                            let dst = format!("{}{}_errors.csv", self.error_prefix, stem);
                            self.put_csv(&dst, |out| {
                                write_rejected_csv(&file.raw, &file.classification.rejected, out)
                            })
                            .await?;
                            report.error_key = Some(dst);
                        }
                        report.clean_key = self.put_accepted(stem, file).await?;
                    }
                    RoutingPolicy::WholeFile if file.classification.all_accepted() => {
                        report.disposition = Disposition::Accepted;
                        report.clean_key = self.put_accepted(stem, file).await?;
                    }
                    RoutingPolicy::WholeFile => {
                        let dst = format!("{}{}", self.error_prefix, relative);
                        self.store.upload(staged, &dst).await?;
                        report.disposition = Disposition::Rejected;
                        report.error_key = Some(dst);
                    }
                }
            }
        }

        info!(
            key = %input_key,
            disposition = ?report.disposition,
            accepted = report.accepted_rows,
            rejected = report.rejected_rows,
            "routed"
        );
        Ok(report)
    }

    async fn put_accepted(&self, stem: &str, file: &CleanedFile) -> Result<Option<String>> {
        if file.accepted_rows() == 0 && !self.write_empty_artifacts {
            return Ok(None);
        }
        let dst = format!("{}{}_cleaned.csv", self.clean_prefix, stem);
        self.put_csv(&dst, |out| write_accepted_csv(&file.classification.accepted, out))
            .await?;
        Ok(Some(dst))
    }

    /// Encode into a staged file, then upload it to `key`.
    async fn put_csv<F>(&self, key: &str, encode: F) -> Result<()>
    where
        F: FnOnce(&mut BufWriter<&File>) -> Result<()>,
    {
        let staged = self.staging.stage(key)?;
        {
            let mut out = BufWriter::new(staged.as_file());
            encode(&mut out)?;
            out.flush()?;
        }
        self.store.upload(staged.path(), key).await?;
        Ok(())
    }
}
