//! Durable group store: one document per `(file_name, checksum)`.
//!
//! # Append-or-create
//!
//! [`GroupStore::append_or_create`] is a single store-side operation. It either
//! appends the event to the existing group or creates the group with the
//! event as its sole member. There is no read-then-write window, so concurrent
//! appends to the same group never overwrite each other.
//!
//! An event whose uuid is already recorded in its group is not appended again
//! ([`AppendOutcome::AlreadyPresent`]). Redelivered messages and recovery
//! replays are therefore harmless.
//!
//! - [`MongoGroupStore`] - MongoDB-backed store used in production
//! - [`InMemoryGroupStore`] - process-local store for tests

mod memory;
mod mongo;

pub use memory::InMemoryGroupStore;
pub use mongo::{MongoConfig, MongoGroupStore};

use crate::Result;
use async_trait::async_trait;
use eventum_core::{Event, FileGroup, FileKey, GroupFilter};
use std::fmt;

/// What append-or-create did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// No group existed; one was created with the event as its only member.
    Created,
    /// The event was appended to an existing group.
    Appended,
    /// The group already holds an event with this uuid; nothing changed.
    AlreadyPresent,
}

impl AppendOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Appended => "appended",
            Self::AlreadyPresent => "already_present",
        }
    }
}

impl fmt::Display for AppendOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistent store of file groups.
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Append the event to its file group, creating the group if needed.
    ///
    /// The stored copy gets a fresh `save_datetime`. A new group takes its
    /// `created_at` from the event's emission time in UTC.
    async fn append_or_create(&self, event: &Event) -> Result<AppendOutcome>;

    /// Fetch one group by identity.
    async fn get(&self, key: &FileKey) -> Result<Option<FileGroup>>;

    /// All groups matching the filter, ordered by file name then checksum.
    async fn find(&self, filter: &GroupFilter) -> Result<Vec<FileGroup>>;
}
