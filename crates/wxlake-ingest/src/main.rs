//! wxlake Ingest - OpenWeather ingestion and flattening tool

use clap::Parser;
use std::process;
use tracing::{error, info};
use wxlake_common::logging::{init_logging, LogConfig, LogLevel};
use wxlake_ingest::{commands, Cli, Commands};

#[tokio::main]
async fn main() {
    // A missing .env file is fine; the variables may come from the environment
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("wxlake-ingest")
        .filter_directives("aws_smithy_runtime=warn,aws_sdk_s3=warn,hyper=warn")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    if let Err(e) = init_logging(&log_config) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn execute_command(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Ingest(args) => {
            let summary = commands::ingest(args).await?;
            info!(
                run_id = %summary.run_id,
                start = %summary.start,
                end = %summary.end,
                records = summary.total_records(),
                "Ingestion complete"
            );
        },
        Commands::Flatten(args) => {
            let tables = commands::flatten(args).await?;
            for table in &tables {
                info!(table = %table.name, rows = table.rows, key = %table.key, "Table materialized");
            }
        },
    }

    Ok(())
}
