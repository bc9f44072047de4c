//! Eventum ingestion daemon.
//!
//! Consumes file events from Kafka, stages each one in Redis, and records it
//! in its MongoDB file group.
//!
//! # Usage
//!
//! ```bash
//! # Settings from the environment (or a .env file in the working directory)
//! eventum-ingest
//!
//! # Custom env file, no metrics server
//! eventum-ingest --dotenv /etc/eventum/ingest.env --metrics-port 0
//!
//! # Skip the replay of staged events left by a previous run
//! eventum-ingest --no-recovery
//! ```
//!
//! # Graceful Shutdown
//!
//! The daemon handles SIGINT (Ctrl+C) and SIGTERM for graceful shutdown:
//! 1. Finishes the in-flight message
//! 2. Commits acknowledged Kafka offsets
//! 3. Closes the MongoDB client
//! 4. Exits cleanly

use anyhow::{Context, Result};
use clap::Parser;
use eventum_core::metrics::{init_metrics, start_metrics_server};
use eventum_ingest::{
    Config, DeadLetterWriter, KafkaSource, MongoGroupStore, Pipeline, RedisStaging,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

/// Eventum ingestion daemon.
#[derive(Parser, Debug)]
#[command(name = "eventum-ingest")]
#[command(about = "Kafka to MongoDB file event ingestion daemon")]
#[command(version)]
struct Args {
    /// Env file loaded before reading configuration
    #[arg(long, default_value = ".env")]
    dotenv: PathBuf,

    /// Metrics HTTP server port (0 to disable, overrides EVENTUM_METRICS_PORT)
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Do not replay staged events at startup
    #[arg(long)]
    no_recovery: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load the env file before anything reads the environment
    let dotenv_loaded = args.dotenv.exists();
    if dotenv_loaded {
        dotenvy::from_path(&args.dotenv)
            .with_context(|| format!("Failed to load {}", args.dotenv.display()))?;
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse()?)
                .add_directive("eventum_ingest=debug".parse()?),
        )
        .init();

    tracing::info!("Eventum ingestion daemon starting...");
    if dotenv_loaded {
        tracing::info!("Loaded environment from {}", args.dotenv.display());
    }

    let mut config = Config::from_env().context("Invalid configuration")?;
    if let Some(port) = args.metrics_port {
        config.metrics_port = port;
    }
    if args.no_recovery {
        config.pipeline.recover_on_start = false;
    }

    // Initialize metrics
    if config.metrics_port > 0 {
        let metrics_handle = init_metrics();
        start_metrics_server(config.metrics_port, metrics_handle).await?;
    }

    // Set up graceful shutdown
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);

    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, stopping gracefully...");
        shutdown_clone.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    tracing::info!("Configuration:");
    tracing::info!("  Kafka: {} / {}", config.kafka.brokers, config.kafka.topic);
    tracing::info!("  Consumer group: {}", config.kafka.group_id);
    tracing::info!("  Redis: {} (db {})", config.redis.addr, config.redis.db);
    tracing::info!(
        "  MongoDB: {}.{}",
        config.mongo.database,
        config.mongo.collection
    );
    tracing::info!("  Retry attempts: {}", config.pipeline.retry.max_attempts);
    tracing::info!(
        "  Dead letter: {}",
        config
            .dead_letter_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "disabled".to_string())
    );
    tracing::info!("  Recovery: {}", config.pipeline.recover_on_start);

    // Connect backing stores
    let groups = MongoGroupStore::connect(&config.mongo)
        .await
        .context("Failed to connect to MongoDB")?;
    groups
        .ensure_schema()
        .await
        .context("Failed to prepare MongoDB collection")?;

    let staging = RedisStaging::connect(&config.redis)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", config.redis.addr))?;

    let mut source = KafkaSource::new(config.kafka.clone()).context("Failed to start Kafka consumer")?;

    let mut pipeline = Pipeline::new(
        Arc::new(staging),
        Arc::new(groups.clone()),
        config.pipeline.clone(),
    );
    if let Some(path) = &config.dead_letter_path {
        let writer = DeadLetterWriter::open(path)
            .with_context(|| format!("Failed to open dead-letter file {}", path.display()))?;
        pipeline = pipeline.with_dead_letter(writer);
    }

    // Run the consume loop
    tracing::info!("Starting ingestion...");
    let stats = pipeline.run(&mut source, &shutdown).await;

    // Shutdown sequence
    tracing::info!("Shutting down...");
    drop(pipeline);
    groups.shutdown().await;

    let stats = stats.context("Consume loop failed")?;

    // Print summary
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("SHUTDOWN COMPLETE");
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Messages received:    {}", stats.received);
    tracing::info!("Events persisted:     {}", stats.persisted);
    tracing::info!("  Groups created:     {}", stats.groups_created);
    tracing::info!("  Events appended:    {}", stats.events_appended);
    tracing::info!("  Duplicates:         {}", stats.duplicates);
    tracing::info!("Decode failures:      {}", stats.decode_failures);
    tracing::info!("Staging failures:     {}", stats.staging_failures);
    tracing::info!("Persist failures:     {}", stats.persist_failures);
    tracing::info!("Cleanup failures:     {}", stats.cleanup_failures);
    tracing::info!("Dead-lettered:        {}", stats.dead_lettered);
    tracing::info!(
        "Recovered at start:   {}/{}",
        stats.recovery.persisted,
        stats.recovery.found
    );

    Ok(())
}
