use async_trait::async_trait;
use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::http::objects::copy::CopyObjectRequest;
use google_cloud_storage::http::objects::delete::DeleteObjectRequest;
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::list::ListObjectsRequest;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use google_cloud_storage::http::Error as GcsError;
use std::path::Path;
use tracing::{debug, info};

use super::ObjectStore;
use crate::error::{PipelineError, Result};

/// A single GCS bucket, authenticated with Application Default Credentials.
#[derive(Clone)]
pub struct GcsStore {
    client: Client,
    bucket: String,
}

impl std::fmt::Debug for GcsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GcsStore<gs://{}>", self.bucket)
    }
}

impl GcsStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Authenticate via ADC and bind to `bucket`.
    pub async fn connect(bucket: impl Into<String>) -> Result<Self> {
        let bucket = bucket.into();
        let cfg = ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| PipelineError::storage("authenticate", &bucket, e))?;
        info!(bucket = %bucket, "authenticated GCS client");
        Ok(Self::new(Client::new(cfg), bucket))
    }

    fn get_request(&self, key: &str) -> GetObjectRequest {
        GetObjectRequest {
            bucket: self.bucket.clone(),
            object: key.to_string(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let req = ListObjectsRequest {
                bucket: self.bucket.clone(),
                prefix: Some(prefix.to_string()),
                page_token: page_token.take(),
                ..Default::default()
            };
            let resp = self
                .client
                .list_objects(&req)
                .await
                .map_err(|e| PipelineError::storage("list", prefix, e))?;
            keys.extend(resp.items.unwrap_or_default().into_iter().map(|o| o.name));
            match resp.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        debug!(prefix, count = keys.len(), "listed objects");
        Ok(keys)
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<u64> {
        let data = self
            .client
            .download_object(&self.get_request(key), &Range::default())
            .await
            .map_err(|e| PipelineError::storage("download", key, e))?;
        tokio::fs::write(dest, &data).await?;
        debug!(object = %key, bytes = data.len(), "downloaded");
        Ok(data.len() as u64)
    }

    async fn upload(&self, src: &Path, key: &str) -> Result<u64> {
        let data = tokio::fs::read(src).await?;
        let len = data.len() as u64;

        let mut media = Media::new(key.to_string());
        media.content_type = "text/csv".into();
        media.content_length = Some(len);
        let req = UploadObjectRequest {
            bucket: self.bucket.clone(),
            ..Default::default()
        };
        self.client
            .upload_object(&req, data, &UploadType::Simple(media))
            .await
            .map_err(|e| PipelineError::storage("upload", key, e))?;
        debug!(object = %key, bytes = len, "uploaded");
        Ok(len)
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let req = CopyObjectRequest {
            source_bucket: self.bucket.clone(),
            source_object: src.to_string(),
            destination_bucket: self.bucket.clone(),
            destination_object: dst.to_string(),
            ..Default::default()
        };
        self.client
            .copy_object(&req)
            .await
            .map_err(|e| PipelineError::storage("copy", src, e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let req = DeleteObjectRequest {
            bucket: self.bucket.clone(),
            object: key.to_string(),
            ..Default::default()
        };
        self.client
            .delete_object(&req)
            .await
            .map_err(|e| PipelineError::storage("delete", key, e))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self.client.get_object(&self.get_request(key)).await {
            Ok(_) => Ok(true),
            Err(GcsError::Response(resp)) if resp.code == 404 => Ok(false),
            Err(e) => Err(PipelineError::storage("stat", key, e)),
        }
    }

    fn uri(&self, key: &str) -> String {
        format!("gs://{}/{}", self.bucket, key)
    }
}
