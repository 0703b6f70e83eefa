use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use transloader::{
    load::{DuckDbLoader, MemoryTable},
    storage::{list_artifacts, LocalStore, MemoryStore, ObjectStore},
    Pipeline, PipelineConfig,
};

const HEADER: &str =
    "transaction_id,product_name,category,price,quantity,date,customer_name,customer_email\n";

fn init_test_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,transloader=debug")),
        )
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn memory_pipeline(config: PipelineConfig) -> (Arc<MemoryStore>, Arc<MemoryTable>, Pipeline) {
    init_test_logging();
    let store = Arc::new(MemoryStore::new());
    let table = Arc::new(MemoryTable::new(store.clone(), "retail.transactions"));
    let pipeline = Pipeline::new(store.clone(), table.clone(), config).unwrap();
    (store, table, pipeline)
}

fn text(store: &MemoryStore, key: &str) -> String {
    String::from_utf8(store.get_bytes(key).unwrap_or_else(|| panic!("missing {key}"))).unwrap()
}

#[tokio::test]
async fn scenario_a_split_policy() -> Result<()> {
    let (store, _table, pipeline) = memory_pipeline(PipelineConfig::default());
    store.put_bytes(
        "input/2024/01/sales.csv",
        format!(
            "{HEADER}\
             1,Mouse,Tech,19.99,2,2024-01-05,Jane,jane@example.com\n\
             2,Desk,Home,not-a-price,1,2024-01-06,,\n\
             3,Lamp,Home,12.50,1,2024-01-07,,\n"
        )
        .as_bytes(),
    );

    let summary = pipeline.run_cleaning().await?;
    assert_eq!(summary.routed.len(), 1);
    assert!(summary.failed.is_empty());
    assert_eq!(summary.accepted_rows(), 2);
    assert_eq!(summary.rejected_rows(), 1);

    let clean = text(&store, "clean/2024/01/sales_cleaned.csv");
    let clean_rows: Vec<_> = clean.lines().skip(1).collect();
    assert_eq!(clean_rows.len(), 2);
    assert!(clean_rows[0].starts_with("1,Mouse,"));
    assert!(clean_rows[1].starts_with("3,Lamp,"));

    let errors = text(&store, "error/2024/01/sales_errors.csv");
    let error_rows: Vec<_> = errors.lines().skip(1).collect();
    assert_eq!(error_rows.len(), 1);
    assert!(error_rows[0].starts_with("2,Desk,Home,not-a-price"));
    assert!(error_rows[0].contains("price"));

    // input consumed: the second run has nothing to do
    assert!(list_artifacts(store.as_ref(), "input/").await?.is_empty());
    let second = pipeline.run_cleaning().await?;
    assert!(second.routed.is_empty());
    assert!(second.failed.is_empty());
    Ok(())
}

#[tokio::test]
async fn default_config_rejects_unparseable_quantity() -> Result<()> {
    let (store, _table, pipeline) = memory_pipeline(PipelineConfig::default());
    store.put_bytes(
        "input/qty.csv",
        format!(
            "{HEADER}\
             1,A,X,1.0,two,2024-01-01,,\n\
             2,B,X,2.0,1,2024-01-02,,\n"
        )
        .as_bytes(),
    );

    let summary = pipeline.run_cleaning().await?;
    assert_eq!(summary.accepted_rows(), 1);
    assert_eq!(summary.rejected_rows(), 1);

    let clean = text(&store, "clean/qty_cleaned.csv");
    assert_eq!(clean.lines().skip(1).collect::<Vec<_>>(), vec!["2,B,X,2.0,1,2024-01-02,,"]);
    let errors = text(&store, "error/qty_errors.csv");
    let error_rows: Vec<_> = errors.lines().skip(1).collect();
    assert_eq!(error_rows.len(), 1);
    assert!(error_rows[0].starts_with("1,A,X,1.0,two,2024-01-01"));
    assert!(error_rows[0].contains("quantity"));
    Ok(())
}

#[tokio::test]
async fn scenario_b_load_and_archive() -> Result<()> {
    let (store, table, pipeline) = memory_pipeline(PipelineConfig::default());
    let rows: String = (1..=5)
        .map(|i| format!("{i},Item {i},Cat,{i}.5,{i},2024-02-0{i},,\n"))
        .collect();
    store.put_bytes("clean/2024/batch_cleaned.csv", format!("{HEADER}{rows}").as_bytes());

    let before = table.row_count();
    let summary = pipeline.run_loading().await?;
    assert_eq!(table.row_count(), before + 5);
    assert_eq!(summary.loaded.len(), 1);
    assert_eq!(summary.loaded_rows(), 5);

    assert!(store.get_bytes("done/2024/batch_cleaned.csv").is_some());
    assert!(store.get_bytes("clean/2024/batch_cleaned.csv").is_none());
    Ok(())
}

#[tokio::test]
async fn scenario_c_failed_load_is_left_in_place() -> Result<()> {
    let (store, table, pipeline) = memory_pipeline(PipelineConfig::default());
    let body = format!("{HEADER}1,Mouse,Tech,19.99,2,2024-01-05,,\n");
    store.put_bytes("clean/a_cleaned.csv", body.as_bytes());
    store.put_bytes("clean/b_cleaned.csv", body.as_bytes());
    table.fail_uri(&store.uri("clean/a_cleaned.csv"));

    let summary = pipeline.run_loading().await?;
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].key, "clean/a_cleaned.csv");
    assert_eq!(summary.loaded.len(), 1);
    assert_eq!(summary.loaded[0].key, "clean/b_cleaned.csv");

    assert!(store.get_bytes("clean/a_cleaned.csv").is_some());
    assert!(store.get_bytes("done/a_cleaned.csv").is_none());
    assert!(store.get_bytes("done/b_cleaned.csv").is_some());
    assert_eq!(table.row_count(), 1);
    Ok(())
}

#[tokio::test]
async fn whole_file_policy_rejects_entire_file() -> Result<()> {
    let config = PipelineConfig {
        strict_file_mode: true,
        ..Default::default()
    };
    let (store, _table, pipeline) = memory_pipeline(config);
    let body = format!(
        "{HEADER}\
         1,Mouse,Tech,19.99,2,2024-01-05,,\n\
         2,Desk,Home,49.00,1,05/01/2024,,\n"
    );
    store.put_bytes("input/sales.csv", body.as_bytes());

    let summary = pipeline.run_cleaning().await?;
    assert_eq!(summary.routed.len(), 1);
    assert_eq!(text(&store, "error/sales.csv"), body);
    assert!(list_artifacts(store.as_ref(), "clean/").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn malformed_file_is_copied_to_error_unchanged() -> Result<()> {
    let (store, _table, pipeline) = memory_pipeline(PipelineConfig::default());
    let body = format!("{HEADER}1,Mouse,Tech\n");
    store.put_bytes("input/ragged.csv", body.as_bytes());
    store.put_bytes("input/good.csv", format!("{HEADER}1,Mouse,Tech,1.0,1,2024-01-05,,\n").as_bytes());

    let summary = pipeline.run_cleaning().await?;
    assert_eq!(summary.routed.len(), 2);
    assert_eq!(text(&store, "error/ragged.csv"), body);
    assert!(store.get_bytes("clean/good_cleaned.csv").is_some());
    Ok(())
}

#[tokio::test]
async fn local_store_with_duckdb_end_to_end() -> Result<()> {
    init_test_logging();
    let dir = tempfile::tempdir()?;
    let store = Arc::new(LocalStore::new(dir.path().join("bucket"))?);
    let loader = Arc::new(DuckDbLoader::open(None, "transactions")?);

    let src = dir.path().join("upload.csv");
    std::fs::write(
        &src,
        format!(
            "{HEADER}\
             1,Mouse,Tech,19.99,2,2024-01-05,\"Doe, Jane\",jane@example.com\n\
             ,,,5.00,,2024-01-06,,\n\
             3,Lamp,Home,12.5,1,2024-13-01,,\n"
        ),
    )?;
    store.upload(&src, "input/2024/sales.csv").await?;

    let config = PipelineConfig {
        staging_dir: Some(dir.path().join("staging")),
        ..Default::default()
    };
    let pipeline = Pipeline::new(store.clone(), loader.clone(), config)?;

    let cleaning = pipeline.run_cleaning().await?;
    assert_eq!(cleaning.accepted_rows(), 2);
    assert_eq!(cleaning.rejected_rows(), 1);

    let loading = pipeline.run_loading().await?;
    assert!(loading.failed.is_empty());
    assert_eq!(loading.loaded_rows(), 2);
    assert_eq!(loader.row_count()?, 2);

    let done = list_artifacts(store.as_ref(), "done/").await?;
    assert_eq!(done, vec!["done/2024/sales_cleaned.csv"]);
    assert!(list_artifacts(store.as_ref(), "clean/").await?.is_empty());
    assert!(list_artifacts(store.as_ref(), "input/").await?.is_empty());
    assert_eq!(
        list_artifacts(store.as_ref(), "error/").await?,
        vec!["error/2024/sales_errors.csv"]
    );

    // staging is cleaned up once the stage returns
    let staging = dir.path().join("staging");
    assert_eq!(std::fs::read_dir(&staging)?.count(), 0);
    Ok(())
}
