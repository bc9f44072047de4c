//! Eventum ingestion pipeline components.
//!
//! This crate consumes file events from a Kafka topic and records them in
//! MongoDB, grouped by `(file_name, checksum)`, with Redis as a write-ahead
//! staging buffer in between.
//!
//! # Modules
//!
//! - [`pipeline`] - The consume loop and startup recovery
//! - [`source`] - Message sources (Kafka, in-process channel)
//! - [`staging`] - Staging store (Redis, in-memory)
//! - [`groups`] - Durable group store (MongoDB, in-memory)
//! - [`config`] - Environment-driven configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Kafka topic    │  JSON events, consumer group, at-least-once
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  decode_event   │  Validates required fields, drops malformed payloads
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  Redis staging  │  Copy held until the event is durable
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  MongoDB groups │  Atomic append-or-create per (file_name, checksum)
//! └─────────────────┘
//! ```
//!
//! MongoDB is the source of truth. A staged copy that outlives its message
//! is replayed by startup recovery.

pub mod config;
pub mod dead_letter;
pub mod error;
pub mod groups;
pub mod pipeline;
pub mod retry;
pub mod source;
pub mod staging;

#[cfg(test)]
mod testing;

// Re-export commonly used types at crate root
pub use config::Config;
pub use error::{Error, Result};

pub use dead_letter::{DeadLetterRecord, DeadLetterWriter, FailedStage};
pub use groups::{AppendOutcome, GroupStore, InMemoryGroupStore, MongoConfig, MongoGroupStore};
pub use pipeline::{
    MessageOutcome, Pipeline, PipelineConfig, PipelineState, PipelineStats, RecoveryStats,
};
pub use retry::RetryPolicy;
pub use source::{
    AckToken, ChannelSource, KafkaConfig, KafkaSource, MessageSource, RawMessage, Received,
};
pub use staging::{InMemoryStaging, RedisConfig, RedisStaging, StagingStore};
