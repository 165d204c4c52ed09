//! S3-compatible object store destination

use super::{
    decode_batch, encode_batch, normalize_sub_path, select_raw_keys, table_key,
    validate_relative_key, watermarks_from_keys, Destination, RawRecordStream, Watermarks,
};
use crate::config::StorageConfig;
use crate::materialize::write_parquet;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use futures::StreamExt;
use tracing::{debug, info, instrument};
use wxlake_common::{Record, Result, WxError};

/// Destination backed by one bucket, optionally under a key prefix
#[derive(Clone)]
pub struct ObjectStoreDestination {
    name: String,
    client: Client,
    bucket: String,
    prefix: String,
    staging_dir: Option<std::path::PathBuf>,
    staging_chunk_bytes: usize,
}

impl ObjectStoreDestination {
    /// Connect and verify the bucket exists
    pub async fn new(config: StorageConfig, prefix: &str) -> Result<Self> {
        config.validate()?;
        debug!("Initializing object store with config: {:?}", config);

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "wxlake-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        client
            .head_bucket()
            .bucket(&config.bucket)
            .send()
            .await
            .map_err(|e| {
                WxError::config(format!(
                    "Bucket '{}' is not accessible: {}",
                    config.bucket,
                    DisplayErrorContext(e)
                ))
            })?;

        let prefix = normalize_sub_path(prefix);
        info!(bucket = %config.bucket, prefix = %prefix, "Object store destination ready");

        Ok(Self {
            name: format!("s3://{}/{}", config.bucket, prefix),
            client,
            bucket: config.bucket,
            prefix,
            staging_dir: config.staging_dir,
            staging_chunk_bytes: config.staging_chunk_bytes,
        })
    }

    fn full_key(&self, relative: &str) -> String {
        if self.prefix.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.prefix, relative)
        }
    }

    fn relative_key<'a>(&self, full: &'a str) -> Option<&'a str> {
        if self.prefix.is_empty() {
            Some(full)
        } else {
            full.strip_prefix(&self.prefix)?.strip_prefix('/')
        }
    }

    /// Every object key under `relative_prefix`, relative to the destination prefix
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn list(&self, relative_prefix: &str) -> Result<Vec<String>> {
        let relative_prefix = normalize_sub_path(relative_prefix);
        let prefix = match (self.prefix.is_empty(), relative_prefix.is_empty()) {
            (true, true) => String::new(),
            (true, false) => format!("{}/", relative_prefix),
            (false, true) => format!("{}/", self.prefix),
            (false, false) => format!("{}/{}/", self.prefix, relative_prefix),
        };

        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| {
                    WxError::transport(format!(
                        "Failed to list s3://{}/{}: {}",
                        self.bucket,
                        prefix,
                        DisplayErrorContext(e)
                    ))
                })?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key())
                    .filter_map(|key| self.relative_key(key))
                    .map(str::to_string),
            );

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        debug!(prefix = %prefix, objects = keys.len(), "Listed objects");
        Ok(keys)
    }

    async fn download(client: &Client, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let response = client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                WxError::transport(format!(
                    "Failed to download s3://{}/{}: {}",
                    bucket,
                    key,
                    DisplayErrorContext(e)
                ))
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| WxError::transport(format!("Failed to read s3://{}/{}: {}", bucket, key, e)))?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    async fn upload(&self, key: &str, body: ByteStream, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                WxError::transport(format!(
                    "Failed to upload s3://{}/{}: {}",
                    self.bucket,
                    key,
                    DisplayErrorContext(e)
                ))
            })?;
        Ok(())
    }
}

#[async_trait]
impl Destination for ObjectStoreDestination {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, batch), fields(destination = %self.name, records = batch.len()))]
    async fn save_batch(&self, batch: &[Record], relative_path: &str) -> Result<()> {
        validate_relative_key(relative_path)?;
        let key = self.full_key(relative_path);

        self.upload(&key, ByteStream::from(encode_batch(batch)?), "application/json")
            .await?;

        debug!(key = %key, "Saved batch");
        Ok(())
    }

    async fn last_persisted_dates(&self) -> Result<Watermarks> {
        Ok(watermarks_from_keys(self.list("").await?))
    }

    async fn iterate_raw_records(&self, sub_path: &str) -> Result<RawRecordStream> {
        let keys = select_raw_keys(self.list(sub_path).await?, sub_path);
        debug!(destination = %self.name, sub_path, files = keys.len(), "Listing raw batches");

        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let prefix = self.prefix.clone();

        let stream = futures::stream::iter(keys).then(move |key| {
            let client = client.clone();
            let bucket = bucket.clone();
            let full = if prefix.is_empty() { key.clone() } else { format!("{}/{}", prefix, key) };
            async move {
                let bytes = Self::download(&client, &bucket, &full).await?;
                let records = decode_batch(&key, &bytes)?;
                Ok::<_, WxError>((key, records))
            }
        });

        Ok(stream.boxed())
    }

    /// Stages the Parquet file locally, then streams it up in bounded chunks
    #[instrument(skip(self, table), fields(destination = %self.name, rows = table.num_rows()))]
    async fn materialize_table(
        &self,
        sub_path: &str,
        table_name: &str,
        table: &RecordBatch,
    ) -> Result<String> {
        let relative = table_key(sub_path, table_name)?;
        let key = self.full_key(&relative);

        let staging_dir = self.staging_dir.clone().unwrap_or_else(std::env::temp_dir);
        let table = table.clone();
        let staged = tokio::task::spawn_blocking(move || -> Result<tempfile::NamedTempFile> {
            std::fs::create_dir_all(&staging_dir)?;
            let mut tmp = tempfile::Builder::new()
                .prefix("wxlake-")
                .suffix(".parquet")
                .tempfile_in(&staging_dir)?;
            write_parquet(tmp.as_file_mut(), &table)?;
            Ok(tmp)
        })
        .await
        .map_err(|e| WxError::Io(std::io::Error::other(e)))??;

        let body = ByteStream::read_from()
            .path(staged.path())
            .buffer_size(self.staging_chunk_bytes)
            .build()
            .await
            .map_err(|e| WxError::transport(format!("Failed to stream staged file: {}", e)))?;

        self.upload(&key, body, "application/vnd.apache.parquet").await?;

        info!(key = %key, "Materialized table");
        Ok(relative)
    }

    /// Object stores have no empty directories to remove
    async fn clean_up(&self) {}
}
