//! Command-line definitions for the `wxlake-ingest` binary

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// wxlake - OpenWeather history ingestion and flattening
#[derive(Parser, Debug)]
#[command(name = "wxlake-ingest")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch history pages and persist them as daily batches
    Ingest(IngestArgs),

    /// Flatten persisted batches into Parquet tables
    Flatten(FlattenArgs),
}

/// Where batches are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DestinationChoice {
    Cloud,
    Local,
    Both,
}

impl DestinationChoice {
    pub fn includes_cloud(self) -> bool {
        matches!(self, DestinationChoice::Cloud | DestinationChoice::Both)
    }

    pub fn includes_local(self) -> bool {
        matches!(self, DestinationChoice::Local | DestinationChoice::Both)
    }
}

/// A single storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreChoice {
    Cloud,
    Local,
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    /// Locations registry (JSON array)
    #[arg(short, long)]
    pub locations_path: PathBuf,

    /// First instant to fetch (`YYYY-MM-DD HH:MM:SS`); resumes from stored data when omitted
    #[arg(short, long)]
    pub start_date: Option<String>,

    /// Exclusive end (`YYYY-MM-DD HH:MM:SS`); defaults to yesterday 23:59:59
    #[arg(short, long)]
    pub end_date: Option<String>,

    /// Destination selection
    #[arg(short, long, value_enum, default_value_t = DestinationChoice::Local)]
    pub destination: DestinationChoice,

    /// Output directory for the local destination
    #[arg(short, long)]
    pub out_directory: Option<PathBuf>,

    /// Endpoints to fetch: `all` or a list of `weather`, `air_pollution`
    #[arg(long, num_args = 1.., default_value = "all")]
    pub endpoints: Vec<String>,

    /// Run identifier stamped on every record (default: random UUID)
    #[arg(long)]
    pub run_id: Option<String>,

    /// Number of (location, endpoint) pairs fetched at once
    #[arg(long, default_value_t = crate::config::DEFAULT_CONCURRENCY)]
    pub concurrency: usize,
}

#[derive(Args, Debug, Clone)]
pub struct FlattenArgs {
    /// Where raw batches are read from
    #[arg(long, value_enum)]
    pub source: StoreChoice,

    /// Raw batch directory for a local source
    #[arg(long)]
    pub raw_directory: Option<PathBuf>,

    /// Where tables are written
    #[arg(long, value_enum)]
    pub target: StoreChoice,

    /// Output directory for a local target
    #[arg(short, long)]
    pub out_directory: Option<PathBuf>,

    /// Raw sub-paths to flatten, one root table each
    #[arg(long, num_args = 1.., default_values_t = ["weather".to_string(), "air_pollution".to_string()])]
    pub sub_paths: Vec<String>,

    /// Sub-path of the target receiving the tables
    #[arg(long, default_value = "")]
    pub output_sub_path: String,

    /// Identifier written to the provenance column (default: random UUID)
    #[arg(long)]
    pub run_id: Option<String>,
}
