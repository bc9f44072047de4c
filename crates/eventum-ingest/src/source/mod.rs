//! Message sources feeding the consume loop.
//!
//! # Available Sources
//!
//! - [`KafkaSource`] - Consumes the event topic through a Kafka consumer group
//! - [`ChannelSource`] - In-process channel, for tests and local feeding
//!
//! Delivery is at-least-once: a message is acknowledged only after it reaches
//! a terminal outcome, so a crash in between redelivers it.

mod channel;
mod kafka;

pub use channel::ChannelSource;
pub use kafka::{KafkaConfig, KafkaSource};

use crate::Result;
use async_trait::async_trait;

/// Position of a message in the log, handed back on acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckToken {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// A raw message read from the log.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub payload: Vec<u8>,
    pub token: AckToken,
}

/// Result of one read from a [`MessageSource`].
#[derive(Debug)]
pub enum Received {
    /// A message is available.
    Message(RawMessage),
    /// The poll interval elapsed with nothing to read.
    Idle,
    /// The source is exhausted and will never yield again.
    Closed,
}

/// An ordered, at-least-once stream of raw event payloads.
#[async_trait]
pub trait MessageSource: Send {
    /// Human-readable name for this source (used in logs).
    fn name(&self) -> &'static str;

    /// Read the next message, waiting at most one poll interval.
    ///
    /// An `Err` is a transport failure and ends the consume loop.
    async fn next_message(&mut self) -> Result<Received>;

    /// Mark a message as processed so its position may be committed.
    async fn ack(&mut self, token: &AckToken) -> Result<()>;

    /// Flush acknowledgments before the process exits.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
