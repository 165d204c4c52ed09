//! wxlake Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Incremental ingestion of OpenWeather history data and flattening of the
//! persisted batches into Parquet tables.
//!
//! # Pipeline
//!
//! - **Fetch**: a day-granularity cursor per (location, category) pair pulls
//!   history pages and writes one JSON batch per calendar day to every
//!   configured [`Destination`](destination::Destination).
//! - **Flatten**: batches are read back, split into a root table and child
//!   tables for nested lists, merged across files, and materialized as
//!   Parquet.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wxlake_ingest::api::OpenWeatherClient;
//! use wxlake_ingest::config::{ApiConfig, RunConfig};
//! use wxlake_ingest::destination::{Destination, LocalDirectory};
//! use wxlake_ingest::fetch::FetchEngine;
//! use wxlake_ingest::locations::LocationRegistry;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = OpenWeatherClient::new(ApiConfig::from_env()?)?;
//!     let local: Arc<dyn Destination> = Arc::new(LocalDirectory::new("./data/raw")?);
//!
//!     let mut registry = LocationRegistry::load("locations.json")?;
//!     let locations = registry.resolve(&client).await?;
//!
//!     let engine = FetchEngine::new(client, vec![local], RunConfig::new(None))?;
//!     engine.run(&locations).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod destination;
pub mod fetch;
pub mod flatten;
pub mod locations;
pub mod materialize;

// Re-export commonly used types
pub use cli::{Cli, Commands};
pub use wxlake_common::{Result, WxError};
