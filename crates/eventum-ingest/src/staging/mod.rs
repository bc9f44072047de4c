//! Staging store: the volatile write-ahead buffer.
//!
//! Every decoded event is written here before the durable persist attempt and
//! deleted only after that attempt succeeds. A staged copy that survives a
//! restart marks an event whose durable outcome is unknown; startup recovery
//! replays those.
//!
//! - [`RedisStaging`] - Redis-backed store used in production
//! - [`InMemoryStaging`] - process-local store for tests

mod memory;
mod redis;

pub use self::memory::InMemoryStaging;
pub use self::redis::{RedisConfig, RedisStaging};

use crate::Result;
use async_trait::async_trait;
use eventum_core::{Event, StagingKey};

/// Key-value store holding staged events.
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Write the serialized event under `key`, overwriting any prior value.
    /// Entries never expire.
    async fn put(&self, key: &StagingKey, event: &Event) -> Result<()>;

    /// Read a staged event. `None` if nothing is staged under `key`.
    async fn get(&self, key: &StagingKey) -> Result<Option<Event>>;

    /// Remove a staged event. Deleting an absent key is not an error.
    async fn delete(&self, key: &StagingKey) -> Result<()>;

    /// List every staged key.
    async fn keys(&self) -> Result<Vec<StagingKey>>;
}
