//! Core types, wire codec, and shared utilities for the Eventum ingestion pipeline.
//!
//! This crate provides:
//! - The [`Event`] and [`FileGroup`] data model
//! - Decoding and encoding of the JSON wire format consumed from Kafka
//! - Unambiguous staging keys ([`StagingKey`]) for the Redis write-ahead buffer
//! - Prometheus metrics helpers
//! - Shared error types

mod error;
mod event;
mod key;
pub mod metrics;

// ═══════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════

/// Default consumer group used when joining the event topic.
pub const DEFAULT_CONSUMER_GROUP: &str = "eventum-group";

/// Default MongoDB collection holding file groups.
pub const DEFAULT_FILE_COLLECTION: &str = "files";

pub use error::{Error, Result};
pub use event::{
    Event, EventType, FileGroup, FileKey, GroupFilter, decode_event, encode_event,
};
pub use key::{STAGING_KEY_PREFIX, StagingKey};
