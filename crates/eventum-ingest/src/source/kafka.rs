//! Kafka message source.
//!
//! Joins the configured consumer group with `auto.offset.reset=earliest`.
//! Offsets are stored only when a message is acknowledged
//! (`enable.auto.offset.store=false`) and committed by the background
//! auto-commit, plus one synchronous commit on close.

use super::{AckToken, MessageSource, RawMessage, Received};
use crate::{Error, Result};
use async_trait::async_trait;
use eventum_core::DEFAULT_CONSUMER_GROUP;
use rdkafka::ClientConfig;
use rdkafka::Message;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use std::time::Duration;

/// Configuration for the Kafka source.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Comma-separated bootstrap servers.
    pub brokers: String,

    /// Topic carrying event payloads.
    pub topic: String,

    /// Consumer group id.
    pub group_id: String,

    /// Longest a single read waits before reporting [`Received::Idle`].
    pub poll_interval: Duration,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            topic: "events".to_string(),
            group_id: DEFAULT_CONSUMER_GROUP.to_string(),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl KafkaConfig {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false");
        config
    }
}

/// Kafka consumer-group source.
pub struct KafkaSource {
    consumer: StreamConsumer,
    config: KafkaConfig,
}

impl KafkaSource {
    /// Create the consumer and subscribe to the topic.
    pub fn new(config: KafkaConfig) -> Result<Self> {
        let consumer: StreamConsumer = config
            .client_config()
            .create()
            .map_err(|e| Error::Transport(format!("failed to create Kafka consumer: {e}")))?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| Error::Transport(format!("failed to subscribe to {}: {e}", config.topic)))?;

        tracing::info!(
            brokers = %config.brokers,
            topic = %config.topic,
            group_id = %config.group_id,
            "Kafka consumer subscribed"
        );

        Ok(Self { consumer, config })
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    fn name(&self) -> &'static str {
        "kafka"
    }

    async fn next_message(&mut self) -> Result<Received> {
        let message = match tokio::time::timeout(self.config.poll_interval, self.consumer.recv()).await
        {
            Err(_) => return Ok(Received::Idle),
            Ok(Err(e)) => return Err(Error::Transport(format!("error reading Kafka message: {e}"))),
            Ok(Ok(message)) => message,
        };

        Ok(Received::Message(RawMessage {
            payload: message.payload().unwrap_or_default().to_vec(),
            token: AckToken {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
            },
        }))
    }

    async fn ack(&mut self, token: &AckToken) -> Result<()> {
        // The stored offset is the next one to consume.
        self.consumer
            .store_offset(&token.topic, token.partition, token.offset + 1)
            .map_err(|e| Error::Transport(format!("failed to store offset: {e}")))
    }

    async fn close(&mut self) -> Result<()> {
        self.consumer
            .commit_consumer_state(CommitMode::Sync)
            .map_err(|e| Error::Transport(format!("failed to commit offsets: {e}")))
    }
}
