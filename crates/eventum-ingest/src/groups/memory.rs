//! In-memory group store for testing.
//!
//! Append-or-create runs entirely under the write lock, which gives it the
//! same atomicity the MongoDB conditional upsert has.

use super::{AppendOutcome, GroupStore};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use eventum_core::{Event, FileGroup, FileKey, GroupFilter};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::{PoisonError, RwLock};

/// Process-local [`GroupStore`].
#[derive(Debug, Default)]
pub struct InMemoryGroupStore {
    groups: RwLock<BTreeMap<FileKey, FileGroup>>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::Persist {
        message: "lock poisoned".to_string(),
        transient: false,
    }
}

impl InMemoryGroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of groups stored.
    pub fn group_count(&self) -> usize {
        self.groups.read().map(|g| g.len()).unwrap_or(0)
    }
}

#[async_trait]
impl GroupStore for InMemoryGroupStore {
    async fn append_or_create(&self, event: &Event) -> Result<AppendOutcome> {
        let mut event = event.clone();
        event.stamp_saved(Utc::now());

        let mut groups = self.groups.write().map_err(poison_err)?;
        let outcome = match groups.entry(event.file_key()) {
            Entry::Vacant(slot) => {
                slot.insert(FileGroup::new(event));
                AppendOutcome::Created
            }
            Entry::Occupied(mut slot) => {
                if slot.get_mut().append(event) {
                    AppendOutcome::Appended
                } else {
                    AppendOutcome::AlreadyPresent
                }
            }
        };
        drop(groups);
        Ok(outcome)
    }

    async fn get(&self, key: &FileKey) -> Result<Option<FileGroup>> {
        Ok(self.groups.read().map_err(poison_err)?.get(key).cloned())
    }

    async fn find(&self, filter: &GroupFilter) -> Result<Vec<FileGroup>> {
        let groups = self.groups.read().map_err(poison_err)?;
        Ok(groups
            .values()
            .filter(|g| filter.matches(g))
            .cloned()
            .collect())
    }
}
