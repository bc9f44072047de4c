//! Look up file groups by file name and/or checksum.
//!
//! Prints matching groups as pretty JSON on stdout. Read-only.
//!
//! # Usage
//!
//! ```bash
//! get-files --filename report.pdf
//! get-files --checksum 9f86d08 --dotenv /etc/eventum/ingest.env
//! ```

use anyhow::{Context, Result, bail};
use clap::Parser;
use eventum_core::GroupFilter;
use eventum_ingest::config::mongo_from_env;
use eventum_ingest::{GroupStore, MongoGroupStore};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "get-files")]
#[command(about = "Query file groups by file name and/or checksum")]
#[command(version)]
struct Args {
    /// Exact file name to match
    #[arg(long)]
    filename: Option<String>,

    /// Exact checksum to match
    #[arg(long)]
    checksum: Option<String>,

    /// Env file with MongoDB settings
    #[arg(long, default_value = ".env")]
    dotenv: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.dotenv.exists() {
        dotenvy::from_path(&args.dotenv)
            .with_context(|| format!("Failed to load {}", args.dotenv.display()))?;
    }

    // Logs go to stderr so stdout stays pure JSON
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let filter = GroupFilter {
        file_name: args.filename.filter(|s| !s.is_empty()),
        checksum: args.checksum.filter(|s| !s.is_empty()),
    };
    if filter.is_empty() {
        bail!("at least one of --filename or --checksum is required");
    }

    let store = MongoGroupStore::connect(&mongo_from_env())
        .await
        .context("Failed to connect to MongoDB")?;

    let groups = store.find(&filter).await.context("Query failed")?;
    tracing::info!("Found {} file groups", groups.len());

    println!("{}", serde_json::to_string_pretty(&groups)?);

    store.shutdown().await;
    Ok(())
}
