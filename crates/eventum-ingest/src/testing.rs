//! Failure-injecting store wrappers for pipeline tests.
//!
//! Each wrapper delegates to an in-memory store and fails the next N calls of
//! one operation when armed.

use crate::groups::{AppendOutcome, GroupStore, InMemoryGroupStore};
use crate::staging::{InMemoryStaging, StagingStore};
use crate::{Error, Result};
use async_trait::async_trait;
use eventum_core::{Event, FileGroup, FileKey, GroupFilter, StagingKey, decode_event};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Build an event payload in the wire format.
pub fn payload(file_name: &str, checksum: &str, uuid: &str, emitted: &str) -> String {
    format!(
        r#"{{"event_name":"scan","description":"found a thing","file_name":"{file_name}","checksum":"{checksum}","event_type":"WARNING","emit_datetime":"{emitted}","uuid":"{uuid}"}}"#
    )
}

pub fn event(file_name: &str, checksum: &str, uuid: &str, emitted: &str) -> Event {
    decode_event(payload(file_name, checksum, uuid, emitted).as_bytes()).unwrap()
}

/// One injectable failure point.
#[derive(Debug, Default)]
pub struct FailPoint {
    remaining: AtomicU32,
    transient: AtomicBool,
    calls: AtomicU32,
}

impl FailPoint {
    /// Fail the next `count` calls.
    pub fn fail_next(&self, count: u32, transient: bool) {
        self.transient.store(transient, Ordering::SeqCst);
        self.remaining.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Count the call; `Some(transient)` when it should fail.
    fn trip(&self) -> Option<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|_| self.transient.load(Ordering::SeqCst))
    }
}

/// [`InMemoryStaging`] with injectable put, delete and keys failures.
#[derive(Debug, Default)]
pub struct FlakyStaging {
    pub inner: InMemoryStaging,
    pub put: FailPoint,
    pub delete: FailPoint,
    pub keys: FailPoint,
}

impl FlakyStaging {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

fn staging_failure(op: &str, transient: bool) -> Error {
    Error::Staging {
        message: format!("injected {op} failure"),
        transient,
    }
}

#[async_trait]
impl StagingStore for FlakyStaging {
    async fn put(&self, key: &StagingKey, event: &Event) -> Result<()> {
        if let Some(transient) = self.put.trip() {
            return Err(staging_failure("put", transient));
        }
        self.inner.put(key, event).await
    }

    async fn get(&self, key: &StagingKey) -> Result<Option<Event>> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &StagingKey) -> Result<()> {
        if let Some(transient) = self.delete.trip() {
            return Err(staging_failure("delete", transient));
        }
        self.inner.delete(key).await
    }

    async fn keys(&self) -> Result<Vec<StagingKey>> {
        if let Some(transient) = self.keys.trip() {
            return Err(staging_failure("keys", transient));
        }
        self.inner.keys().await
    }
}

/// [`InMemoryGroupStore`] with an injectable append failure.
#[derive(Debug, Default)]
pub struct FlakyGroups {
    pub inner: InMemoryGroupStore,
    pub append: FailPoint,
}

impl FlakyGroups {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl GroupStore for FlakyGroups {
    async fn append_or_create(&self, event: &Event) -> Result<AppendOutcome> {
        if let Some(transient) = self.append.trip() {
            return Err(Error::Persist {
                message: "injected append failure".to_string(),
                transient,
            });
        }
        self.inner.append_or_create(event).await
    }

    async fn get(&self, key: &FileKey) -> Result<Option<FileGroup>> {
        self.inner.get(key).await
    }

    async fn find(&self, filter: &GroupFilter) -> Result<Vec<FileGroup>> {
        self.inner.find(filter).await
    }
}
