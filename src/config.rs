//! Run configuration: YAML file, then CLI overrides.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::process::policy::{DefaultValues, FillPolicy, RoutingPolicy, ValidationPolicy};
use crate::storage::normalize_prefix;

/// The four prefixes of the bucket layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prefixes {
    pub input: String,
    pub clean: String,
    pub error: String,
    pub done: String,
}

impl Default for Prefixes {
    fn default() -> Self {
        Self {
            input: "input/".into(),
            clean: "clean/".into(),
            error: "error/".into(),
            done: "done/".into(),
        }
    }
}

impl Prefixes {
    fn normalized(&self) -> Result<Self> {
        let p = Self {
            input: normalize_prefix(&self.input),
            clean: normalize_prefix(&self.clean),
            error: normalize_prefix(&self.error),
            done: normalize_prefix(&self.done),
        };
        let all = [&p.input, &p.clean, &p.error, &p.done];
        if all.iter().any(|s| s.is_empty()) {
            bail!("prefixes must not be empty: {:?}", p);
        }
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                if a.starts_with(b.as_str()) || b.starts_with(a.as_str()) {
                    bail!("prefixes `{a}` and `{b}` overlap");
                }
            }
        }
        Ok(p)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub bucket: String,
    /// Falls back to `GOOGLE_CLOUD_PROJECT`, then to the credentials' project.
    pub project: Option<String>,
    pub dataset: String,
    pub table: String,
    pub location: Option<String>,
    pub prefixes: Prefixes,
    pub fill_policy: FillPolicy,
    /// Reject the whole file on any invalid row.
    pub strict_file_mode: bool,
    pub write_empty_artifacts: bool,
    /// Delete the input once its routed outputs are verified.
    pub consume_input: bool,
    pub defaults: DefaultValues,
    pub staging_dir: Option<PathBuf>,
    pub ledger_dir: Option<PathBuf>,
    pub poll_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            project: None,
            dataset: String::new(),
            table: "transactions".into(),
            location: None,
            prefixes: Prefixes::default(),
            fill_policy: FillPolicy::default(),
            strict_file_mode: false,
            write_empty_artifacts: false,
            consume_input: true,
            defaults: DefaultValues::default(),
            staging_dir: None,
            ledger_dir: None,
            poll_interval_ms: 1_000,
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(yaml).context("parsing pipeline config")?;
        cfg.finish()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Normalise prefixes and fill `project` from the environment.
    pub fn finish(mut self) -> Result<Self> {
        self.prefixes = self.prefixes.normalized()?;
        if self.project.is_none() {
            self.project = std::env::var("GOOGLE_CLOUD_PROJECT")
                .ok()
                .filter(|p| !p.is_empty());
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be positive");
        }
        Ok(self)
    }

    pub fn validation_policy(&self) -> ValidationPolicy {
        ValidationPolicy {
            fill: self.fill_policy,
            routing: RoutingPolicy::from_strict_file_mode(self.strict_file_mode),
            defaults: self.defaults.clone(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Settings the cloud backends cannot run without.
    pub fn require_cloud(&self) -> Result<()> {
        if self.bucket.is_empty() {
            bail!("`bucket` is required for the gcs backend");
        }
        if self.dataset.is_empty() {
            bail!("`dataset` is required for the gcs backend");
        }
        Ok(())
    }
}
