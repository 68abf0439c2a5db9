//! S3 compatible object storage helpers
//!
//! Buckets are addressed path-style (`{endpoint}/{bucket}/{key}`), which is
//! what MinIO and most on-premise stores expect.

use crate::config::ObjectStorageConfig;
use crate::error::{EtlError, Result};
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Default size of the ranged reads done by [`ObjectStorageManager::process_file`]
pub const DEFAULT_CHUNK_SIZE: u64 = 500_000;

#[derive(Debug, Clone)]
pub struct ObjectStorageManager {
    client: Client,
    endpoint: String,
}

impl ObjectStorageManager {
    /// Build a client, failing with every missing field listed.
    pub fn new(config: ObjectStorageConfig) -> Result<Self> {
        let ObjectStorageConfig {
            endpoint,
            access_key,
            secret_key,
            region,
        } = config;

        let (endpoint, access_key, secret_key) = match (endpoint, access_key, secret_key) {
            (Some(endpoint), Some(access_key), Some(secret_key)) => (endpoint, access_key, secret_key),
            (endpoint, access_key, secret_key) => {
                let missing: Vec<&str> = [
                    (endpoint.is_none(), "<<endpoint>>"),
                    (access_key.is_none(), "<<access_key>>"),
                    (secret_key.is_none(), "<<secret_key>>"),
                ]
                .into_iter()
                .filter_map(|(is_missing, name)| is_missing.then_some(name))
                .collect();
                return Err(EtlError::missing_fields(&missing, "ObjectStorageManager"));
            }
        };

        let credentials = Credentials::new(access_key, secret_key, None, None, "etl-object-storage");
        let s3_config = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(region))
            .endpoint_url(&endpoint)
            .force_path_style(true)
            .build();

        debug!(endpoint = %endpoint, "Object storage client initialized");
        Ok(Self {
            client: Client::from_conf(s3_config),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Create `bucket`. A bucket that already exists is not an error.
    #[instrument(skip(self))]
    pub async fn create_bucket(&self, bucket: &str) -> Result<()> {
        match self.client.create_bucket().bucket(bucket).send().await {
            Ok(_) => {
                debug!("Created bucket ({})", bucket);
                Ok(())
            }
            Err(err)
                if err.as_service_error().is_some_and(|e| {
                    e.is_bucket_already_exists() || e.is_bucket_already_owned_by_you()
                }) =>
            {
                debug!("Bucket {} already exists", bucket);
                Ok(())
            }
            Err(err) => Err(EtlError::storage(format!(
                "An error ocurred while creating {}: {}",
                bucket,
                DisplayErrorContext(&err)
            ))),
        }
    }

    #[instrument(skip(self))]
    pub async fn remove_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|err| {
                EtlError::storage(format!(
                    "An error ocurred while deleting {}: {}",
                    bucket,
                    DisplayErrorContext(&err)
                ))
            })?;

        debug!("Removed bucket {}", bucket);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(EtlError::storage(format!(
                "Failed to check bucket {}: {}",
                bucket,
                DisplayErrorContext(&err)
            ))),
        }
    }

    /// Upload `source` as object `destination`, creating the bucket first.
    #[instrument(skip(self, source), fields(path = %source.as_ref().display()))]
    pub async fn upload_file(
        &self,
        bucket: &str,
        destination: &str,
        source: impl AsRef<Path>,
    ) -> Result<()> {
        self.create_bucket(bucket).await?;

        let body = ByteStream::from_path(source.as_ref()).await.map_err(|err| {
            EtlError::storage(format!("An error ocurred while uploading the file: {}", err))
        })?;

        debug!("Uploading object {} to bucket {}", destination, bucket);
        self.client
            .put_object()
            .bucket(bucket)
            .key(destination)
            .body(body)
            .send()
            .await
            .map_err(|err| {
                EtlError::storage(format!(
                    "An error ocurred while uploading the file: {}",
                    DisplayErrorContext(&err)
                ))
            })?;

        info!("Uploaded s3://{}/{}", bucket, destination);
        Ok(())
    }

    /// Read object `key` in ranges of `chunk_size` bytes, handing each range
    /// to `process` in order.
    #[instrument(skip(self, process))]
    pub async fn process_file<F>(
        &self,
        bucket: &str,
        key: &str,
        chunk_size: u64,
        mut process: F,
    ) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        if chunk_size == 0 {
            return Err(EtlError::validation("<<chunk_size>> must be greater than 0"));
        }

        let head = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| processing_error(DisplayErrorContext(&err)))?;
        let size = head.content_length().unwrap_or(0).max(0) as u64;

        let mut offset = 0;
        while offset < size {
            let range = format!("bytes={}-{}", offset, offset.saturating_add(chunk_size - 1));
            let response = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .range(range)
                .send()
                .await
                .map_err(|err| processing_error(DisplayErrorContext(&err)))?;

            let data = response
                .body
                .collect()
                .await
                .map_err(processing_error)?
                .into_bytes();
            process(&data)?;

            offset = offset.saturating_add(chunk_size);
        }

        debug!(size, "Processing ended");
        Ok(())
    }
}

fn processing_error(err: impl std::fmt::Display) -> EtlError {
    EtlError::storage(format!("An error occured while processing the file: {}", err))
}
