//! In-process channel source.
//!
//! Payloads are numbered in send order on a single pseudo-partition. When
//! every sender is dropped and the buffer drains, the source reports
//! [`Received::Closed`].

use super::{AckToken, MessageSource, RawMessage, Received};
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

const CHANNEL_TOPIC: &str = "channel";

/// Channel-backed [`MessageSource`].
pub struct ChannelSource {
    receiver: mpsc::Receiver<Vec<u8>>,
    poll_interval: Duration,
    next_offset: i64,
    acked: Vec<i64>,
}

impl ChannelSource {
    /// Create a source and the sender feeding it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            sender,
            Self {
                receiver,
                poll_interval: Duration::from_millis(50),
                next_offset: 0,
                acked: Vec::new(),
            },
        )
    }

    /// A source that yields the given payloads, then closes.
    pub fn from_payloads<I, P>(payloads: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        let payloads: Vec<Vec<u8>> = payloads.into_iter().map(Into::into).collect();
        let (sender, source) = Self::channel(payloads.len());
        for payload in payloads {
            // Capacity matches the payload count.
            let _ = sender.try_send(payload);
        }
        source
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Offsets acknowledged so far, in acknowledgment order.
    pub fn acked(&self) -> &[i64] {
        &self.acked
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn next_message(&mut self) -> Result<Received> {
        match tokio::time::timeout(self.poll_interval, self.receiver.recv()).await {
            Err(_) => Ok(Received::Idle),
            Ok(None) => Ok(Received::Closed),
            Ok(Some(payload)) => {
                let offset = self.next_offset;
                self.next_offset += 1;
                Ok(Received::Message(RawMessage {
                    payload,
                    token: AckToken {
                        topic: CHANNEL_TOPIC.to_string(),
                        partition: 0,
                        offset,
                    },
                }))
            }
        }
    }

    async fn ack(&mut self, token: &AckToken) -> Result<()> {
        self.acked.push(token.offset);
        Ok(())
    }
}
