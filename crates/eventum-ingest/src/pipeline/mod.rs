//! The consume loop.
//!
//! ```text
//! [MessageSource] → decode → [StagingStore].put → [GroupStore].append_or_create
//!                                                          ↓
//!                                      [StagingStore].delete → ack → next
//! ```
//!
//! One worker processes one message at a time, start to finish, in receipt
//! order. Failures are contained per message:
//!
//! | failure            | effect                                            |
//! |--------------------|---------------------------------------------------|
//! | transport          | loop ends, error returned                         |
//! | decode             | logged, message dropped                           |
//! | staging (retried)  | logged, dead-lettered, message dropped            |
//! | persist (retried)  | logged, dead-lettered, staged copy left in place  |
//! | cleanup (retried)  | logged only, the event is already durable         |
//!
//! Shutdown is cooperative: the flag is checked between messages (and between
//! replayed events during startup recovery), so the in-flight message always
//! completes. The source's poll interval bounds how long an idle read delays
//! that check.

mod recovery;

pub use recovery::RecoveryStats;

use crate::dead_letter::{DeadLetterRecord, DeadLetterWriter, FailedStage};
use crate::groups::{AppendOutcome, GroupStore};
use crate::retry::RetryPolicy;
use crate::source::{MessageSource, Received};
use crate::staging::StagingStore;
use crate::{Error, Result};
use eventum_core::metrics::{increment, increment_labeled, set_gauge};
use eventum_core::{Event, StagingKey, decode_event};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

/// Pipeline behaviour knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Retry policy for staging, persist and cleanup calls.
    pub retry: RetryPolicy,

    /// Replay orphaned staged copies before consuming.
    pub recover_on_start: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            recover_on_start: true,
        }
    }
}

/// States of the consume loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Receiving,
    Decoding,
    Staging,
    Persisting,
    Cleanup,
    Error,
    ShutdownRequested,
    Terminated,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Receiving => "receiving",
            Self::Decoding => "decoding",
            Self::Staging => "staging",
            Self::Persisting => "persisting",
            Self::Cleanup => "cleanup",
            Self::Error => "error",
            Self::ShutdownRequested => "shutdown_requested",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Terminal outcome of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Durably recorded. `cleanup_failed` means the staged copy could not be
    /// deleted afterwards.
    Persisted {
        outcome: AppendOutcome,
        cleanup_failed: bool,
    },
    /// Payload was not a well-formed event.
    DecodeFailed,
    /// Event could not be staged; nothing was written anywhere.
    StagingFailed,
    /// Event was staged but could not be persisted; the staged copy remains.
    PersistFailed,
}

impl MessageOutcome {
    /// State the message failed in, if it failed before persistence.
    pub fn failed_in(&self) -> Option<PipelineState> {
        match self {
            Self::Persisted { .. } => None,
            Self::DecodeFailed => Some(PipelineState::Decoding),
            Self::StagingFailed => Some(PipelineState::Staging),
            Self::PersistFailed => Some(PipelineState::Persisting),
        }
    }
}

/// Counters for one run of the consume loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub received: usize,
    pub persisted: usize,
    pub groups_created: usize,
    pub events_appended: usize,
    pub duplicates: usize,
    pub decode_failures: usize,
    pub staging_failures: usize,
    pub persist_failures: usize,
    pub cleanup_failures: usize,
    pub dead_lettered: usize,
    pub recovery: RecoveryStats,
}

impl PipelineStats {
    fn record(&mut self, outcome: MessageOutcome) {
        match outcome {
            MessageOutcome::Persisted {
                outcome,
                cleanup_failed,
            } => {
                self.persisted += 1;
                match outcome {
                    AppendOutcome::Created => self.groups_created += 1,
                    AppendOutcome::Appended => self.events_appended += 1,
                    AppendOutcome::AlreadyPresent => self.duplicates += 1,
                }
                if cleanup_failed {
                    self.cleanup_failures += 1;
                }
            }
            MessageOutcome::DecodeFailed => self.decode_failures += 1,
            MessageOutcome::StagingFailed => self.staging_failures += 1,
            MessageOutcome::PersistFailed => self.persist_failures += 1,
        }
    }
}

/// The consume → stage → persist → cleanup orchestrator.
pub struct Pipeline {
    staging: Arc<dyn StagingStore>,
    groups: Arc<dyn GroupStore>,
    dead_letter: Option<DeadLetterWriter>,
    dead_lettered: AtomicUsize,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        staging: Arc<dyn StagingStore>,
        groups: Arc<dyn GroupStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            staging,
            groups,
            dead_letter: None,
            dead_lettered: AtomicUsize::new(0),
            config,
        }
    }

    /// Record events that exhaust their retries in this file.
    pub fn with_dead_letter(mut self, writer: DeadLetterWriter) -> Self {
        self.dead_letter = Some(writer);
        self
    }

    /// Run recovery (if enabled), then consume until shutdown, source
    /// exhaustion, or a transport error.
    pub async fn run<S>(&self, source: &mut S, shutdown: &AtomicBool) -> Result<PipelineStats>
    where
        S: MessageSource + ?Sized,
    {
        let mut stats = PipelineStats::default();
        let dead_lettered_before = self.dead_lettered.load(Ordering::Relaxed);

        if self.config.recover_on_start {
            match self.recover(shutdown).await {
                Ok(recovery) => stats.recovery = recovery,
                Err(e) => tracing::error!("Startup recovery failed, continuing: {}", e),
            }
        }

        set_gauge("ingest_running", 1.0);
        let mut state = PipelineState::Idle;
        if !shutdown.load(Ordering::SeqCst) {
            tracing::info!(source = source.name(), "Consuming...");
        }

        let result = loop {
            if shutdown.load(Ordering::SeqCst) {
                transition(&mut state, PipelineState::ShutdownRequested);
                tracing::info!("Shutdown requested, leaving consume loop");
                break Ok(());
            }

            transition(&mut state, PipelineState::Receiving);
            let message = match source.next_message().await {
                Ok(Received::Message(message)) => message,
                Ok(Received::Idle) => continue,
                Ok(Received::Closed) => {
                    tracing::info!(source = source.name(), "Source closed");
                    break Ok(());
                }
                Err(e) => {
                    tracing::error!("Error reading message: {}", e);
                    break Err(e);
                }
            };

            stats.received += 1;
            increment("ingest_events_received_total", 1);

            let outcome = self.handle_payload(&message.payload, &mut state).await;
            stats.record(outcome);
            if let Some(failed_in) = outcome.failed_in() {
                tracing::debug!(failed_in = %failed_in, offset = message.token.offset, "Message dropped");
            }

            if let Err(e) = source.ack(&message.token).await {
                tracing::warn!(
                    partition = message.token.partition,
                    offset = message.token.offset,
                    "Failed to acknowledge message: {}",
                    e
                );
            }
        };

        if let Err(e) = source.close().await {
            tracing::warn!("Failed to close source cleanly: {}", e);
        }
        set_gauge("ingest_running", 0.0);
        transition(&mut state, PipelineState::Terminated);
        stats.dead_lettered = self.dead_lettered.load(Ordering::Relaxed) - dead_lettered_before;

        result.map(|()| stats)
    }

    /// Take one raw payload through decode, stage, persist and cleanup.
    pub async fn process_payload(&self, payload: &[u8]) -> MessageOutcome {
        let mut state = PipelineState::Receiving;
        self.handle_payload(payload, &mut state).await
    }

    /// Stage, persist and clean up an already-decoded event.
    pub async fn process_event(&self, event: &Event) -> MessageOutcome {
        let mut state = PipelineState::Decoding;
        self.handle_event(event, &mut state).await
    }

    /// Leaves `state` at `Cleanup` on success and `Error` on failure.
    async fn handle_payload(&self, payload: &[u8], state: &mut PipelineState) -> MessageOutcome {
        let started = Instant::now();

        transition(state, PipelineState::Decoding);
        let event = match decode_event(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    payload = %String::from_utf8_lossy(payload),
                    "Error decoding message: {}",
                    e
                );
                increment_labeled("ingest_events_failed_total", "stage", "decode", 1);
                transition(state, PipelineState::Error);
                return MessageOutcome::DecodeFailed;
            }
        };

        let outcome = self.handle_event(&event, state).await;
        metrics::histogram!("ingest_event_duration_seconds").record(started.elapsed().as_secs_f64());
        outcome
    }

    async fn handle_event(&self, event: &Event, state: &mut PipelineState) -> MessageOutcome {
        let key = event.staging_key();

        transition(state, PipelineState::Staging);
        let staged = self
            .config
            .retry
            .run("staging_put", || self.staging.put(&key, event))
            .await;
        if let Err(e) = staged {
            tracing::error!(key = %key, "Error staging event: {}", e);
            increment_labeled("ingest_events_failed_total", "stage", "staging", 1);
            self.dead_letter(FailedStage::Staging, &key, event, &e);
            transition(state, PipelineState::Error);
            return MessageOutcome::StagingFailed;
        }

        transition(state, PipelineState::Persisting);
        let outcome = match self
            .config
            .retry
            .run("append_or_create", || self.groups.append_or_create(event))
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    key = %key,
                    "Error persisting event, staged copy left for recovery: {}",
                    e
                );
                increment_labeled("ingest_events_failed_total", "stage", "persist", 1);
                self.dead_letter(FailedStage::Persist, &key, event, &e);
                transition(state, PipelineState::Error);
                return MessageOutcome::PersistFailed;
            }
        };
        increment_labeled(
            "ingest_events_persisted_total",
            "outcome",
            outcome.as_str(),
            1,
        );

        transition(state, PipelineState::Cleanup);
        let cleanup_failed = match self
            .config
            .retry
            .run("staging_delete", || self.staging.delete(&key))
            .await
        {
            Ok(()) => false,
            Err(e) => {
                tracing::warn!(key = %key, "Error deleting staged event: {}", e);
                increment("staging_cleanup_errors_total", 1);
                true
            }
        };

        tracing::info!(
            outcome = %outcome,
            uuid = %event.uuid,
            "Successfully processed event: {}",
            event.event_name
        );

        MessageOutcome::Persisted {
            outcome,
            cleanup_failed,
        }
    }

    fn dead_letter(&self, stage: FailedStage, key: &StagingKey, event: &Event, error: &Error) {
        let Some(writer) = &self.dead_letter else {
            return;
        };
        let record = DeadLetterRecord::new(stage, key, event, error);
        match writer.write(&record) {
            Ok(()) => {
                self.dead_lettered.fetch_add(1, Ordering::Relaxed);
                increment("ingest_events_dead_lettered_total", 1);
            }
            Err(e) => tracing::error!(key = %key, "Failed to write dead-letter record: {}", e),
        }
    }
}

fn transition(state: &mut PipelineState, next: PipelineState) {
    if *state != next {
        tracing::trace!(from = %state, to = %next, "Pipeline state");
        *state = next;
    }
}
