use async_trait::async_trait;
use google_cloud_bigquery::client::{Client, ClientConfig};
use google_cloud_bigquery::http::job::get::GetJobRequest;
use google_cloud_bigquery::http::job::{
    CreateDisposition, Job, JobConfiguration, JobConfigurationLoad, JobReference, JobState,
    JobType, WriteDisposition,
};
use google_cloud_bigquery::http::table::{
    SourceFormat, TableFieldMode, TableFieldSchema, TableFieldType, TableReference, TableSchema,
};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::{LoadReport, TableLoader};
use crate::error::{PipelineError, Result};
use crate::schema::{ColumnType, TRANSACTION_COLUMNS};

/// Warehouse view of the transaction contract. Order matters: CSV loads are
/// positional.
pub fn bigquery_schema() -> TableSchema {
    let fields = TRANSACTION_COLUMNS
        .iter()
        .map(|col| TableFieldSchema {
            name: col.name.to_string(),
            data_type: match col.ty {
                ColumnType::Integer => TableFieldType::Integer,
                ColumnType::String => TableFieldType::String,
                ColumnType::Float => TableFieldType::Float,
                ColumnType::Date => TableFieldType::Date,
            },
            mode: Some(if col.required {
                TableFieldMode::Required
            } else {
                TableFieldMode::Nullable
            }),
            ..Default::default()
        })
        .collect();
    TableSchema { fields }
}

/// Load jobs against `project.dataset.table`, polled to completion.
#[derive(Clone)]
pub struct BigQueryLoader {
    client: Client,
    project: String,
    dataset: String,
    table: String,
    location: Option<String>,
    poll_interval: Duration,
}

impl std::fmt::Debug for BigQueryLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BigQueryLoader<{}>", self.destination())
    }
}

impl BigQueryLoader {
    /// Authenticate via ADC. `project` wins over the credentials' project.
    pub async fn connect(
        project: Option<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
        location: Option<String>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let dataset = dataset.into();
        let (cfg, project_from_creds) = ClientConfig::new_with_auth()
            .await
            .map_err(|e| PipelineError::load_job(&dataset, format!("authenticate: {e}")))?;
        let project = project.or(project_from_creds).ok_or_else(|| {
            PipelineError::load_job(&dataset, "no project configured and none in credentials")
        })?;
        let client = Client::new(cfg)
            .await
            .map_err(|e| PipelineError::load_job(&dataset, format!("client: {e}")))?;
        info!(project = %project, dataset = %dataset, "authenticated BigQuery client");

        Ok(Self {
            client,
            project,
            dataset,
            table: table.into(),
            location,
            poll_interval,
        })
    }

    fn load_job(&self, job_id: &str, source_uri: &str) -> Job {
        Job {
            job_reference: JobReference {
                project_id: self.project.clone(),
                job_id: job_id.to_string(),
                location: self.location.clone(),
            },
            configuration: JobConfiguration {
                job: JobType::Load(JobConfigurationLoad {
                    source_uris: vec![source_uri.to_string()],
                    destination_table: TableReference {
                        project_id: self.project.clone(),
                        dataset_id: self.dataset.clone(),
                        table_id: self.table.clone(),
                    },
                    schema: Some(bigquery_schema()),
                    source_format: Some(SourceFormat::Csv),
                    skip_leading_rows: Some(1),
                    create_disposition: Some(CreateDisposition::CreateIfNeeded),
                    write_disposition: Some(WriteDisposition::WriteAppend),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[async_trait]
impl TableLoader for BigQueryLoader {
    async fn append_csv(&self, source_uri: &str) -> Result<LoadReport> {
        let job_id = format!("transloader_{}", Uuid::new_v4().simple());
        let mut job = self
            .client
            .job()
            .create(&self.load_job(&job_id, source_uri))
            .await
            .map_err(|e| PipelineError::load_job(source_uri, e))?;
        debug!(job_id = %job_id, uri = %source_uri, "submitted load job");

        let poll = GetJobRequest {
            location: self.location.clone(),
        };
        while !matches!(job.status.state, JobState::Done) {
            tokio::time::sleep(self.poll_interval).await;
            job = self
                .client
                .job()
                .get(&self.project, &job_id, &poll)
                .await
                .map_err(|e| PipelineError::load_job(source_uri, e))?;
        }

        if let Some(err) = job.status.error_result {
            let mut message = err.message.unwrap_or_else(|| "unknown error".into());
            if let Some(reason) = err.reason {
                message = format!("{reason}: {message}");
            }
            return Err(PipelineError::load_job(source_uri, message));
        }

        // output row counts are in job statistics, which are not fetched here
        Ok(LoadReport { job_id, rows: None })
    }

    fn destination(&self) -> String {
        format!("{}.{}.{}", self.project, self.dataset, self.table)
    }
}
