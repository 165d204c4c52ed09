//! Storage destinations
//!
//! A [`Destination`] persists raw batches, reports per-partition watermarks,
//! streams persisted batches back for flattening, and stores materialized
//! tables. The filesystem and object-store implementations share the key
//! layout and watermark logic in this module so they stay interchangeable:
//!
//! ```text
//! <category>/<YYYY-MM-DD>/<location>.json     raw batch
//! <sub_path>/<table>.parquet                  materialized table
//! ```

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::BoxStream;
use std::collections::BTreeMap;
use wxlake_common::types::DATE_FORMAT;
use wxlake_common::{Record, Result, WxError};

pub mod local;
pub mod object_store;

pub use local::LocalDirectory;
pub use object_store::ObjectStoreDestination;

/// Raw batches read back from a destination: `(source identifier, records)`
pub type RawRecordStream = BoxStream<'static, Result<(String, Vec<Record>)>>;

/// Latest persisted calendar date per partition
pub type Watermarks = BTreeMap<String, NaiveDate>;

#[async_trait]
pub trait Destination: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Write one batch at `relative_path`, replacing any previous content
    async fn save_batch(&self, batch: &[Record], relative_path: &str) -> Result<()>;

    /// Latest date per partition; empty when nothing was persisted yet
    async fn last_persisted_dates(&self) -> Result<Watermarks>;

    /// Every `.json` batch below `sub_path`, in key order, read lazily
    async fn iterate_raw_records(&self, sub_path: &str) -> Result<RawRecordStream>;

    /// Store `table` as `<sub_path>/<table_name>.parquet`, replacing any previous file.
    /// Returns the relative key written.
    async fn materialize_table(
        &self,
        sub_path: &str,
        table_name: &str,
        table: &RecordBatch,
    ) -> Result<String>;

    /// Remove empty partitions left behind by a run; never fails
    async fn clean_up(&self);
}

/// `<category>/<YYYY-MM-DD>/<location>.json`
pub fn batch_key(category: &str, date: NaiveDate, location: &str) -> String {
    format!("{}/{}/{}.json", category, date.format(DATE_FORMAT), location)
}

/// `<sub_path>/<table>.parquet`, or `<table>.parquet` when `sub_path` is empty
pub fn table_key(sub_path: &str, table_name: &str) -> Result<String> {
    let file = format!("{}.parquet", table_name);
    let sub_path = normalize_sub_path(sub_path);
    let key = if sub_path.is_empty() { file } else { format!("{}/{}", sub_path, file) };
    validate_relative_key(&key)?;
    Ok(key)
}

/// Reject keys that could escape the destination root
pub fn validate_relative_key(key: &str) -> Result<()> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') {
        return Err(WxError::config(format!("Invalid relative path '{}'", key)));
    }
    if key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..") {
        return Err(WxError::config(format!("Invalid relative path '{}'", key)));
    }
    Ok(())
}

/// Trim separators and `.` so that `"./weather/"` and `"weather"` name the same prefix
pub fn normalize_sub_path(sub_path: &str) -> String {
    sub_path
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Compute watermarks from relative file keys.
///
/// Every ancestor directory whose name is a `YYYY-MM-DD` date contributes that
/// date to the partition named by the directories before it.
pub fn watermarks_from_keys<I, S>(keys: I) -> Watermarks
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut watermarks = Watermarks::new();

    for key in keys {
        let segments: Vec<&str> = key.as_ref().split('/').filter(|s| !s.is_empty()).collect();
        let Some((_file, dirs)) = segments.split_last() else {
            continue;
        };

        for (index, dir) in dirs.iter().enumerate().skip(1) {
            let Some(date) = parse_partition_date(dir) else {
                continue;
            };
            let partition = dirs[..index].join("/");
            watermarks
                .entry(partition)
                .and_modify(|latest| *latest = (*latest).max(date))
                .or_insert(date);
        }
    }

    watermarks
}

fn parse_partition_date(segment: &str) -> Option<NaiveDate> {
    if segment.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(segment, DATE_FORMAT).ok()
}

/// Serialize a batch as a pretty-printed JSON array
pub fn encode_batch(batch: &[Record]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(batch)?)
}

/// Parse a persisted batch; anything but an array of objects is a parse error
pub fn decode_batch(source: &str, bytes: &[u8]) -> Result<Vec<Record>> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| WxError::parse(format!("Batch {} is not valid JSON: {}", source, e)))?;

    let serde_json::Value::Array(items) = value else {
        return Err(WxError::parse(format!("Batch {} is not a JSON array", source)));
    };

    items
        .into_iter()
        .map(|item| match item {
            serde_json::Value::Object(record) => Ok(record),
            _ => Err(WxError::parse(format!("Batch {} holds a non-object record", source))),
        })
        .collect()
}

/// Keep `.json` keys under `prefix` and sort them
pub(crate) fn select_raw_keys(mut keys: Vec<String>, prefix: &str) -> Vec<String> {
    let prefix = normalize_sub_path(prefix);
    keys.retain(|key| {
        key.ends_with(".json")
            && (prefix.is_empty() || key == &prefix || key.starts_with(&format!("{}/", prefix)))
    });
    keys.sort();
    keys
}
