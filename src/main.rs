use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::{path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use transloader::{
    config::PipelineConfig,
    load::{BigQueryLoader, DuckDbLoader, TableLoader},
    process::policy::FillPolicy,
    storage::{GcsStore, LocalStore, ObjectStore},
    CleaningSummary, LoadingSummary, Pipeline,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// GCS bucket + BigQuery table
    Gcs,
    /// Directory tree + DuckDB file
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FillArg {
    FillDefaults,
    StrictReject,
}

#[derive(Debug, Subcommand)]
enum Stage {
    /// Validate `input/` and route rows to `clean/` and `error/`
    Clean,
    /// Append `clean/` artifacts to the table and archive them to `done/`
    Load,
    /// Clean, then load
    Run,
}

/// Batch CSV cleaning and warehouse loading over a bucket.
#[derive(Debug, Parser)]
#[command(name = "transloader", version)]
struct Cli {
    #[command(subcommand)]
    stage: Stage,

    /// YAML config file; flags below override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    bucket: Option<String>,

    #[arg(long, value_enum, default_value = "gcs", global = true)]
    backend: Backend,

    /// Store root for the local backend
    #[arg(long, global = true, default_value = "data")]
    root: PathBuf,

    /// Reject a whole file when any of its rows is invalid
    #[arg(long, global = true)]
    strict_file_mode: bool,

    #[arg(long, value_enum, global = true)]
    fill_policy: Option<FillArg>,

    /// Write the stage summaries as JSON to this path
    #[arg(long, global = true)]
    report: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize)]
struct Report {
    cleaning: Option<CleaningSummary>,
    loading: Option<LoadingSummary>,
}

fn init_logging() {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut cfg = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default().finish()?,
    };
    if let Some(bucket) = &cli.bucket {
        cfg.bucket = bucket.clone();
    }
    if cli.strict_file_mode {
        cfg.strict_file_mode = true;
    }
    if let Some(fill) = cli.fill_policy {
        cfg.fill_policy = match fill {
            FillArg::FillDefaults => FillPolicy::FillDefaults,
            FillArg::StrictReject => FillPolicy::StrictReject,
        };
    }
    Ok(cfg)
}

async fn connect(
    cli: &Cli,
    cfg: &PipelineConfig,
) -> Result<(Arc<dyn ObjectStore>, Arc<dyn TableLoader>)> {
    match cli.backend {
        Backend::Gcs => {
            cfg.require_cloud()?;
            let store = GcsStore::connect(cfg.bucket.as_str())
                .await
                .context("authenticating to GCS")?;
            let loader = BigQueryLoader::connect(
                cfg.project.clone(),
                cfg.dataset.as_str(),
                cfg.table.as_str(),
                cfg.location.clone(),
                cfg.poll_interval(),
            )
            .await
            .context("authenticating to BigQuery")?;
            let store: Arc<dyn ObjectStore> = Arc::new(store);
            let loader: Arc<dyn TableLoader> = Arc::new(loader);
            Ok((store, loader))
        }
        Backend::Local => {
            let store = LocalStore::new(&cli.root)
                .with_context(|| format!("opening local store {}", cli.root.display()))?;
            let db = store.root().join("warehouse.duckdb");
            let loader = DuckDbLoader::open(Some(&db), &cfg.table)
                .with_context(|| format!("opening DuckDB at {}", db.display()))?;
            let store: Arc<dyn ObjectStore> = Arc::new(store);
            let loader: Arc<dyn TableLoader> = Arc::new(loader);
            Ok((store, loader))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();
    let cfg = load_config(&cli)?;
    info!(backend = ?cli.backend, stage = ?cli.stage, bucket = %cfg.bucket, "startup");

    let (store, loader) = connect(&cli, &cfg).await?;
    let pipeline = Pipeline::new(store, loader, cfg).context("building pipeline")?;

    let mut report = Report::default();
    let outcome = run_stages(&cli.stage, &pipeline, &mut report).await;

    if let Some(path) = &cli.report {
        let json = serde_json::to_vec_pretty(&report).context("serialising report")?;
        std::fs::write(path, json).with_context(|| format!("writing report {}", path.display()))?;
        info!(path = %path.display(), "report written");
    }

    outcome
}

async fn run_stages(stage: &Stage, pipeline: &Pipeline, report: &mut Report) -> Result<()> {
    if matches!(stage, Stage::Clean | Stage::Run) {
        let summary = pipeline.run_cleaning().await.context("cleaning stage")?;
        report.cleaning = Some(summary);
    }
    if matches!(stage, Stage::Load | Stage::Run) {
        let summary = pipeline.run_loading().await.context("loading stage")?;
        report.loading = Some(summary);
    }
    Ok(())
}
