//! Startup replay of orphaned staged copies.
//!
//! A staged copy that exists before the first message is read belongs to an
//! event whose persist attempt failed or was interrupted by a crash. Each one
//! is pushed through append-or-create again; because the group store skips
//! uuids it already holds, replaying an event that did reach the store is a
//! no-op. Copies that still fail stay staged for the next start.
//!
//! Staged copies carry the `save_datetime` assigned when they were decoded,
//! so replay runs in that order (key as tiebreak) to keep each group's
//! events in receipt order.

use super::Pipeline;
use crate::Result;
use eventum_core::metrics::increment;
use eventum_core::{Event, StagingKey};
use std::sync::atomic::{AtomicBool, Ordering};

/// Counters for one recovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Staged keys found.
    pub found: usize,
    /// Events persisted (or found already persisted) and cleared.
    pub persisted: usize,
    /// Events left staged because reading or persisting them failed.
    pub failed: usize,
    /// Persisted events whose staged copy could not be deleted.
    pub cleanup_failures: usize,
    /// Whether shutdown was requested before every staged event was replayed.
    pub interrupted: bool,
}

impl Pipeline {
    /// Replay every staged event into the group store.
    ///
    /// Stops between events once `shutdown` is set; whatever is left stays
    /// staged. Fails only if the staged keys cannot be listed.
    pub async fn recover(&self, shutdown: &AtomicBool) -> Result<RecoveryStats> {
        let keys = self.staging.keys().await?;
        let mut stats = RecoveryStats::default();

        if keys.is_empty() {
            tracing::info!("No staged events to recover");
            return Ok(stats);
        }

        let mut staged: Vec<(StagingKey, Event)> = Vec::with_capacity(keys.len());
        for key in keys {
            if shutdown.load(Ordering::SeqCst) {
                stats.interrupted = true;
                tracing::info!("Shutdown requested, stopping recovery");
                return Ok(stats);
            }
            match self.staging.get(&key).await {
                Ok(Some(event)) => staged.push((key, event)),
                // Deleted between listing and reading.
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(key = %key, "Unreadable staged event left in place: {}", e);
                    stats.found += 1;
                    stats.failed += 1;
                }
            }
        }
        staged.sort_by(|(ka, a), (kb, b)| {
            a.save_datetime
                .cmp(&b.save_datetime)
                .then_with(|| ka.cmp(kb))
        });

        stats.found += staged.len();
        tracing::info!("Recovering {} staged events", staged.len());
        increment("recovery_events_total", staged.len() as u64);

        for (key, event) in staged {
            if shutdown.load(Ordering::SeqCst) {
                stats.interrupted = true;
                tracing::info!("Shutdown requested, stopping recovery");
                break;
            }

            let persisted = self
                .config
                .retry
                .run("append_or_create", || self.groups.append_or_create(&event))
                .await;
            let outcome = match persisted {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(key = %key, "Recovery persist failed, event stays staged: {}", e);
                    stats.failed += 1;
                    continue;
                }
            };

            stats.persisted += 1;
            increment("recovery_events_persisted_total", 1);
            tracing::info!(key = %key, outcome = %outcome, "Recovered staged event");

            if let Err(e) = self.staging.delete(&key).await {
                tracing::warn!(key = %key, "Error deleting recovered staged event: {}", e);
                stats.cleanup_failures += 1;
            }
        }

        tracing::info!(
            "Recovery complete: {} persisted, {} failed",
            stats.persisted,
            stats.failed
        );
        Ok(stats)
    }
}
