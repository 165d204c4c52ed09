//! Filesystem destination

use super::{
    decode_batch, encode_batch, select_raw_keys, table_key, validate_relative_key,
    watermarks_from_keys, Destination, RawRecordStream, Watermarks,
};
use crate::materialize::write_parquet;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use walkdir::WalkDir;
use wxlake_common::{Record, Result, WxError};

/// Destination rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    name: String,
    root: PathBuf,
}

impl LocalDirectory {
    /// Open (and create) the root directory
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            WxError::config(format!("Cannot create output directory {}: {}", root.display(), e))
        })?;

        Ok(Self { name: format!("local:{}", root.display()), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative `/`-separated keys of every file under the root
    fn relative_keys(root: &Path) -> Vec<String> {
        WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(root).ok()?;
                let segments: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                Some(segments.join("/"))
            })
            .collect()
    }

    /// Write `bytes` next to `target` under a temporary name, then rename over it
    async fn write_atomic(target: &Path, bytes: Vec<u8>) -> Result<()> {
        let parent = target.parent().unwrap_or(Path::new("."));
        tokio::fs::create_dir_all(parent).await?;

        let file_name = target.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let tmp = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl Destination for LocalDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, batch), fields(destination = %self.name, records = batch.len()))]
    async fn save_batch(&self, batch: &[Record], relative_path: &str) -> Result<()> {
        validate_relative_key(relative_path)?;
        let target = self.root.join(relative_path);

        Self::write_atomic(&target, encode_batch(batch)?).await?;

        debug!(path = %target.display(), "Saved batch");
        Ok(())
    }

    async fn last_persisted_dates(&self) -> Result<Watermarks> {
        let root = self.root.clone();
        let keys = tokio::task::spawn_blocking(move || Self::relative_keys(&root))
            .await
            .map_err(|e| WxError::Io(std::io::Error::other(e)))?;

        Ok(watermarks_from_keys(keys))
    }

    async fn iterate_raw_records(&self, sub_path: &str) -> Result<RawRecordStream> {
        let root = self.root.clone();
        let keys = {
            let root = root.clone();
            tokio::task::spawn_blocking(move || Self::relative_keys(&root))
                .await
                .map_err(|e| WxError::Io(std::io::Error::other(e)))?
        };
        let keys = select_raw_keys(keys, sub_path);
        debug!(destination = %self.name, sub_path, files = keys.len(), "Listing raw batches");

        let stream = futures::stream::iter(keys).then(move |key| {
            let path = root.join(&key);
            async move {
                let bytes = tokio::fs::read(&path).await?;
                let records = decode_batch(&key, &bytes)?;
                Ok::<_, WxError>((key, records))
            }
        });

        Ok(stream.boxed())
    }

    #[instrument(skip(self, table), fields(destination = %self.name, rows = table.num_rows()))]
    async fn materialize_table(
        &self,
        sub_path: &str,
        table_name: &str,
        table: &RecordBatch,
    ) -> Result<String> {
        let key = table_key(sub_path, table_name)?;
        let target = self.root.join(&key);
        let parent = target.parent().unwrap_or(&self.root).to_path_buf();
        tokio::fs::create_dir_all(&parent).await?;

        let table = table.clone();
        let written = target.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
            write_parquet(tmp.as_file_mut(), &table)?;
            tmp.persist(&written).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| WxError::Io(std::io::Error::other(e)))??;

        info!(path = %target.display(), "Materialized table");
        Ok(key)
    }

    async fn clean_up(&self) {
        let root = self.root.clone();
        let result = tokio::task::spawn_blocking(move || {
            // contents_first visits children before their parent, so emptied
            // parents are removed in the same pass.
            for entry in WalkDir::new(&root).contents_first(true).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_dir() {
                    continue;
                }
                match std::fs::remove_dir(entry.path()) {
                    Ok(()) => debug!(path = %entry.path().display(), "Removed empty directory"),
                    Err(e) => debug!(path = %entry.path().display(), error = %e, "Keeping directory"),
                }
            }
        })
        .await;

        if let Err(e) = result {
            debug!(destination = %self.name, error = %e, "Clean-up task failed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_save_batch_overwrites() {
        let dir = TempDir::new().unwrap();
        let destination = LocalDirectory::new(dir.path()).unwrap();

        destination.save_batch(&[record(json!({"dt": 1}))], "weather/2025-01-01/Oslo.json").await.unwrap();
        destination.save_batch(&[record(json!({"dt": 2}))], "weather/2025-01-01/Oslo.json").await.unwrap();

        let saved: serde_json::Value = serde_json::from_slice(
            &std::fs::read(dir.path().join("weather/2025-01-01/Oslo.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(saved, json!([{"dt": 2}]));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("weather/2025-01-01"))
            .unwrap()
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let destination = LocalDirectory::new(dir.path().join("out")).unwrap();
        let err = destination.save_batch(&[], "../escape.json").await.unwrap_err();
        assert!(matches!(err, WxError::Config(_)));
    }

    #[tokio::test]
    async fn test_iterate_raw_records_in_key_order() {
        let dir = TempDir::new().unwrap();
        let destination = LocalDirectory::new(dir.path()).unwrap();

        destination.save_batch(&[record(json!({"dt": 2}))], "weather/2025-01-02/Oslo.json").await.unwrap();
        destination.save_batch(&[record(json!({"dt": 1}))], "weather/2025-01-01/Oslo.json").await.unwrap();
        destination.save_batch(&[record(json!({"aqi": 1}))], "air_pollution/2025-01-01/Oslo.json").await.unwrap();

        let items: Vec<(String, Vec<Record>)> = destination
            .iterate_raw_records("weather")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        let keys: Vec<&str> = items.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["weather/2025-01-01/Oslo.json", "weather/2025-01-02/Oslo.json"]);
        assert_eq!(items[1].1[0]["dt"], json!(2));
    }

    #[tokio::test]
    async fn test_clean_up_removes_only_empty_directories() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("out");
        let destination = LocalDirectory::new(&root).unwrap();

        std::fs::create_dir_all(root.join("weather/2025-01-01")).unwrap();
        destination.save_batch(&[], "air_pollution/2025-01-01/Oslo.json").await.unwrap();

        destination.clean_up().await;

        assert!(!root.join("weather").exists());
        assert!(root.join("air_pollution/2025-01-01/Oslo.json").exists());
    }

    #[tokio::test]
    async fn test_clean_up_removes_empty_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("out");
        let destination = LocalDirectory::new(&root).unwrap();

        destination.clean_up().await;
        assert!(!root.exists());

        // A second call on a missing root is harmless
        destination.clean_up().await;
    }
}
