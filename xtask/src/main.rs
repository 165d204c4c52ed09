//! Build automation tasks for wxlake
//!
//! Currently a single task: regenerating the CLI reference from the clap
//! definitions so it never drifts from the binary.

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for wxlake", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<wxlake_ingest::Cli>();

    let content = format!(
        r#"# wxlake-ingest CLI Reference

This reference is generated from the CLI source code. Last updated: {}.

## Overview

`wxlake-ingest` pulls hourly history from the OpenWeather weather and air
pollution APIs, stores one JSON batch per location and day, and flattens the
stored batches into Parquet tables.

## Quick Start

```bash
# First run: fetch an explicit range into a local lake
export OPENWEATHER_SECRET_KEY=...
wxlake-ingest ingest -l locations.json -s "2025-01-01 00:00:00" -o ./lake

# Later runs resume the day after the last stored date
wxlake-ingest ingest -l locations.json -o ./lake

# Flatten everything into Parquet tables
wxlake-ingest flatten --source local --raw-directory ./lake --target local -o ./tables
```

## Commands

{}

## Environment Variables

- `OPENWEATHER_SECRET_KEY` - API key (required for `ingest`)
- `OPENWEATHER_REQUESTS_PER_MINUTE` - Request budget (default: `60`)
- `OPENWEATHER_API_TIMEOUT_SECS` - Per-request timeout (default: `30`)
- `S3_BUCKET`, `S3_ACCESS_KEY`, `S3_SECRET_KEY` - Object store (required for `cloud`)
- `S3_ENDPOINT`, `S3_REGION`, `S3_PATH_STYLE` - Object store addressing
- `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_DIR` - Logging

## Locations File

```json
[
  {{"name": "Oslo", "country": "NO"}},
  {{"name": "Bergen", "lat": 60.39, "lon": 5.32}}
]
```

Entries without coordinates are geocoded on the first run and written back.

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
