//! Subcommand handlers
//!
//! Each handler builds its configuration up front, validates it, and only
//! then touches the network.

use crate::api::{Endpoint, OpenWeatherClient};
use crate::cli::{FlattenArgs, IngestArgs, StoreChoice};
use crate::config::{default_end_date, ApiConfig, FlattenConfig, RunConfig, StorageConfig};
use crate::destination::{Destination, LocalDirectory, ObjectStoreDestination};
use crate::fetch::{FetchEngine, RunSummary};
use crate::flatten::{Flattener, MaterializedTable};
use crate::locations::LocationRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use wxlake_common::{Result, Timestamp, WxError};

/// `wxlake-ingest ingest`
pub async fn ingest(args: &IngestArgs) -> Result<RunSummary> {
    let endpoints = Endpoint::parse_selection(&args.endpoints)?;
    let now = Timestamp::now();
    let start = args.start_date.as_deref().map(parse_date).transpose()?;
    let end = match args.end_date.as_deref() {
        Some(end) => parse_date(end)?,
        None => default_end_date(now),
    };

    let run_config = RunConfig {
        start,
        end,
        endpoints,
        run_id: args.run_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        ingested_at: now,
        concurrency: args.concurrency,
    };
    run_config.validate()?;

    let api_config = ApiConfig::from_env()?;
    let local_dir = if args.destination.includes_local() {
        let dir = args.out_directory.as_ref().ok_or_else(|| {
            WxError::config("--out-directory is required for the local destination")
        })?;
        Some(dir)
    } else {
        None
    };
    let storage_config = if args.destination.includes_cloud() {
        Some(StorageConfig::from_env()?)
    } else {
        None
    };
    let mut registry = LocationRegistry::load(&args.locations_path)?;

    let mut destinations: Vec<Arc<dyn Destination>> = Vec::new();
    if let Some(config) = storage_config {
        destinations.push(Arc::new(ObjectStoreDestination::new(config, "").await?));
    }
    if let Some(dir) = local_dir {
        destinations.push(Arc::new(LocalDirectory::new(dir)?));
    }

    info!(
        run_id = %run_config.run_id,
        destinations = destinations.len(),
        locations = registry.locations().len(),
        "Configured ingestion run"
    );

    let client = OpenWeatherClient::new(api_config)?;
    let mut engine = FetchEngine::new(client.clone(), destinations, run_config)?;
    let start = engine.pin_start().await?;
    info!(start = %start, "Resolved start date");

    let locations = match registry.resolve(&client).await {
        Ok(locations) => locations,
        Err(e) => {
            engine.clean_up().await;
            return Err(e);
        }
    };

    engine.run(&locations).await
}

/// `wxlake-ingest flatten`
pub async fn flatten(args: &FlattenArgs) -> Result<Vec<MaterializedTable>> {
    let mut config = FlattenConfig {
        sub_paths: args.sub_paths.clone(),
        output_sub_path: args.output_sub_path.clone(),
        ..FlattenConfig::default()
    };
    if let Some(run_id) = &args.run_id {
        config.run_id = run_id.clone();
    }

    let flattener = Flattener::new(config)?;
    let source = open_store(args.source, args.raw_directory.as_ref(), "--raw-directory").await?;
    let target = open_store(args.target, args.out_directory.as_ref(), "--out-directory").await?;

    let result = flattener.run(source.as_ref(), target.as_ref()).await;
    futures::future::join(source.clean_up(), target.clean_up()).await;
    let tables = result?;

    info!(tables = tables.len(), "Flattening finished");
    Ok(tables)
}

async fn open_store(
    choice: StoreChoice,
    directory: Option<&PathBuf>,
    flag: &str,
) -> Result<Box<dyn Destination>> {
    match choice {
        StoreChoice::Local => {
            let dir = directory
                .ok_or_else(|| WxError::config(format!("{} is required for a local store", flag)))?;
            Ok(Box::new(LocalDirectory::new(dir)?))
        }
        StoreChoice::Cloud => {
            let config = StorageConfig::from_env()?;
            Ok(Box::new(ObjectStoreDestination::new(config, "").await?))
        }
    }
}

fn parse_date(value: &str) -> Result<Timestamp> {
    Timestamp::parse(value).map_err(|e| WxError::config(format!("Invalid date: {}", e)))
}
