//! Run configuration
//!
//! Every entry point takes an explicit configuration struct built once at
//! startup. Environment lookups happen here and nowhere else; each struct
//! validates itself before any network call is made.

use crate::api::Endpoint;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use wxlake_common::{Result, Timestamp, WxError};

// ============================================================================
// Defaults
// ============================================================================

/// Default timeout for API and geocoding requests in seconds.
/// Can be overridden via OPENWEATHER_API_TIMEOUT_SECS.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// Default request budget per minute shared by every fetch loop of a run.
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;

pub const DEFAULT_HISTORY_URL: &str = "https://history.openweathermap.org/data/2.5/history/city";
pub const DEFAULT_AIR_POLLUTION_URL: &str =
    "https://api.openweathermap.org/data/2.5/air_pollution/history";
pub const DEFAULT_GEOCODING_URL: &str = "https://api.openweathermap.org/geo/1.0/direct";

pub const DEFAULT_S3_REGION: &str = "us-east-1";

/// Upload chunk size when streaming a staged Parquet file (8 MiB)
pub const DEFAULT_STAGING_CHUNK_BYTES: usize = 8 * 1024 * 1024;

/// Number of (location, category) pairs fetched at once
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Key stamped onto each record with the file it was read from
pub const DEFAULT_SOURCE_KEY: &str = "path";

pub const DEFAULT_RUN_ID_COLUMN: &str = "flattener_id";
pub const DEFAULT_MODIFIED_AT_COLUMN: &str = "modified_at";

// ============================================================================
// API
// ============================================================================

/// OpenWeather API access
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub secret_key: String,
    pub timeout_secs: u64,
    pub requests_per_minute: u32,
    pub history_url: String,
    pub air_pollution_url: String,
    pub geocoding_url: String,
}

impl ApiConfig {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            history_url: DEFAULT_HISTORY_URL.to_string(),
            air_pollution_url: DEFAULT_AIR_POLLUTION_URL.to_string(),
            geocoding_url: DEFAULT_GEOCODING_URL.to_string(),
        }
    }

    /// Load from `OPENWEATHER_*` environment variables
    ///
    /// `OPENWEATHER_SECRET_KEY` is required.
    pub fn from_env() -> Result<Self> {
        let secret_key = env::var("OPENWEATHER_SECRET_KEY").map_err(|_| {
            WxError::config("OPENWEATHER_SECRET_KEY must be set to call the OpenWeather API")
        })?;

        let mut config = Self::new(secret_key);

        if let Some(timeout) = parse_env("OPENWEATHER_API_TIMEOUT_SECS")? {
            config.timeout_secs = timeout;
        }
        if let Some(rpm) = parse_env("OPENWEATHER_REQUESTS_PER_MINUTE")? {
            config.requests_per_minute = rpm;
        }
        if let Ok(url) = env::var("OPENWEATHER_HISTORY_URL") {
            config.history_url = url;
        }
        if let Ok(url) = env::var("OPENWEATHER_AIR_POLLUTION_URL") {
            config.air_pollution_url = url;
        }
        if let Ok(url) = env::var("OPENWEATHER_GEOCODING_URL") {
            config.geocoding_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Point every endpoint at one base URL (mock servers)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.history_url = format!("{}/data/2.5/history/city", base);
        self.air_pollution_url = format!("{}/data/2.5/air_pollution/history", base);
        self.geocoding_url = format!("{}/geo/1.0/direct", base);
        self
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.secret_key.trim().is_empty() {
            return Err(WxError::config("OpenWeather secret key is empty"));
        }
        if self.timeout_secs == 0 {
            return Err(WxError::config("API timeout must be at least one second"));
        }
        if self.requests_per_minute == 0 {
            return Err(WxError::config("requests_per_minute must be greater than zero"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("secret_key", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("requests_per_minute", &self.requests_per_minute)
            .field("history_url", &self.history_url)
            .field("air_pollution_url", &self.air_pollution_url)
            .field("geocoding_url", &self.geocoding_url)
            .finish()
    }
}

// ============================================================================
// Object storage
// ============================================================================

/// S3-compatible object store settings
#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
    /// Directory for staged Parquet files; the system temp dir when unset
    pub staging_dir: Option<PathBuf>,
    pub staging_chunk_bytes: usize,
}

impl StorageConfig {
    /// Load from `S3_*` environment variables
    ///
    /// Bucket and both credentials are required; their absence is a
    /// configuration error.
    pub fn from_env() -> Result<Self> {
        let bucket = env::var("S3_BUCKET")
            .map_err(|_| WxError::config("S3_BUCKET must be set for the cloud destination"))?;
        let access_key = env::var("S3_ACCESS_KEY")
            .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
            .map_err(|_| {
                WxError::config("S3_ACCESS_KEY or AWS_ACCESS_KEY_ID must be set for the cloud destination")
            })?;
        let secret_key = env::var("S3_SECRET_KEY")
            .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
            .map_err(|_| {
                WxError::config(
                    "S3_SECRET_KEY or AWS_SECRET_ACCESS_KEY must be set for the cloud destination",
                )
            })?;

        let config = Self {
            endpoint: env::var("S3_ENDPOINT").ok(),
            region: env::var("S3_REGION").unwrap_or_else(|_| DEFAULT_S3_REGION.to_string()),
            bucket,
            access_key,
            secret_key,
            path_style: parse_env("S3_PATH_STYLE")?.unwrap_or(false),
            staging_dir: env::var("S3_STAGING_DIR").ok().map(PathBuf::from),
            staging_chunk_bytes: parse_env("S3_STAGING_CHUNK_BYTES")?
                .unwrap_or(DEFAULT_STAGING_CHUNK_BYTES),
        };

        config.validate()?;
        Ok(config)
    }

    /// Settings for a local MinIO server with its default credentials
    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: DEFAULT_S3_REGION.to_string(),
            bucket: bucket.into(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
            staging_dir: None,
            staging_chunk_bytes: DEFAULT_STAGING_CHUNK_BYTES,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(WxError::config("Bucket name is empty"));
        }
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(WxError::config("Object store credentials are empty"));
        }
        if self.staging_chunk_bytes == 0 {
            return Err(WxError::config("S3_STAGING_CHUNK_BYTES must be greater than zero"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("path_style", &self.path_style)
            .field("staging_dir", &self.staging_dir)
            .field("staging_chunk_bytes", &self.staging_chunk_bytes)
            .finish()
    }
}

// ============================================================================
// Ingestion run
// ============================================================================

/// One ingestion run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Explicit start; `None` resumes from the destinations' watermarks
    pub start: Option<Timestamp>,
    pub end: Timestamp,
    pub endpoints: Vec<Endpoint>,
    pub run_id: String,
    /// Captured once at run start and stamped onto every record
    pub ingested_at: Timestamp,
    pub concurrency: usize,
}

impl RunConfig {
    /// A run over every endpoint ending yesterday, with a fresh run id
    pub fn new(start: Option<Timestamp>) -> Self {
        let now = Timestamp::now();
        Self {
            start,
            end: default_end_date(now),
            endpoints: Endpoint::all().to_vec(),
            run_id: uuid::Uuid::new_v4().to_string(),
            ingested_at: now,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(WxError::config("No endpoints selected"));
        }
        if self.concurrency == 0 {
            return Err(WxError::config("Concurrency must be at least 1"));
        }
        if self.run_id.trim().is_empty() {
            return Err(WxError::config("Run identifier is empty"));
        }
        if let Some(start) = self.start {
            check_date_range(start, self.end)?;
        }
        Ok(())
    }
}

/// Yesterday at 23:59:59 relative to `now`
pub fn default_end_date(now: Timestamp) -> Timestamp {
    (now + Duration::days(-1)).end_of_day()
}

pub fn check_date_range(start: Timestamp, end: Timestamp) -> Result<()> {
    if start >= end {
        return Err(WxError::config(format!(
            "Start date {} must be before end date {}",
            start, end
        )));
    }
    Ok(())
}

// ============================================================================
// Flattening run
// ============================================================================

/// One flattening pass
#[derive(Debug, Clone)]
pub struct FlattenConfig {
    /// Raw sub-paths to read, one root table each
    pub sub_paths: Vec<String>,
    /// Where tables land on the target destination; empty means its root
    pub output_sub_path: String,
    /// Optional prefix for root table names (`<prefix><sub_path>`)
    pub table_prefix: String,
    /// Key under which each record is stamped with its source identifier
    pub source_key: String,
    /// Key paths concatenated into the row identifier
    pub id_paths: Vec<Vec<String>>,
    pub run_id: String,
    pub run_id_column: String,
    pub modified_at_column: String,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self {
            sub_paths: Endpoint::all().iter().map(|e| e.name().to_string()).collect(),
            output_sub_path: String::new(),
            table_prefix: String::new(),
            source_key: DEFAULT_SOURCE_KEY.to_string(),
            id_paths: vec![vec![DEFAULT_SOURCE_KEY.to_string()], vec!["dt".to_string()]],
            run_id: uuid::Uuid::new_v4().to_string(),
            run_id_column: DEFAULT_RUN_ID_COLUMN.to_string(),
            modified_at_column: DEFAULT_MODIFIED_AT_COLUMN.to_string(),
        }
    }
}

impl FlattenConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sub_paths.is_empty() {
            return Err(WxError::config("No sub-paths to flatten"));
        }
        if self.run_id_column == self.modified_at_column {
            return Err(WxError::config(format!(
                "Run id and modified-at columns must differ (both '{}')",
                self.run_id_column
            )));
        }
        if self.id_paths.iter().any(|p| p.is_empty()) {
            return Err(WxError::config("Id paths must not be empty"));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| WxError::config(format!("{} has an invalid value: '{}'", name, raw))),
        Err(_) => Ok(None),
    }
}
