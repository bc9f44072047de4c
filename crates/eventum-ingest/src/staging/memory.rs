//! In-memory staging store for testing.
//!
//! Values are kept serialized so a round trip exercises the same JSON shape
//! the Redis store writes.

use super::StagingStore;
use crate::{Error, Result};
use async_trait::async_trait;
use eventum_core::{Event, StagingKey};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Process-local [`StagingStore`].
#[derive(Debug, Default)]
pub struct InMemoryStaging {
    entries: RwLock<BTreeMap<StagingKey, String>>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::Staging {
        message: "lock poisoned".to_string(),
        transient: false,
    }
}

impl InMemoryStaging {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of staged entries.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &StagingKey) -> bool {
        self.entries
            .read()
            .map(|e| e.contains_key(key))
            .unwrap_or(false)
    }
}

#[async_trait]
impl StagingStore for InMemoryStaging {
    async fn put(&self, key: &StagingKey, event: &Event) -> Result<()> {
        let value = serde_json::to_string(event)?;
        self.entries
            .write()
            .map_err(poison_err)?
            .insert(key.clone(), value);
        Ok(())
    }

    async fn get(&self, key: &StagingKey) -> Result<Option<Event>> {
        let value = self.entries.read().map_err(poison_err)?.get(key).cloned();
        value
            .map(|v| serde_json::from_str(&v).map_err(Error::from))
            .transpose()
    }

    async fn delete(&self, key: &StagingKey) -> Result<()> {
        self.entries.write().map_err(poison_err)?.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<StagingKey>> {
        Ok(self.entries.read().map_err(poison_err)?.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventum_core::decode_event;

    fn sample_event() -> Event {
        decode_event(
            br#"{"event_name":"e","description":"d","file_name":"a.txt","checksum":"c1","event_type":"WARNING","emit_datetime":"2024-01-01T00:00:00+01:00","uuid":"u1"}"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryStaging::new();
        let event = sample_event();
        let key = event.staging_key();

        store.put(&key, &event).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(event.clone()));
        assert_eq!(store.keys().await.unwrap(), vec![key.clone()]);

        store.delete(&key).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_absent_is_ok() {
        let store = InMemoryStaging::new();
        let key = StagingKey::new("c", "f", "u");
        store.delete(&key).await.unwrap();
        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = InMemoryStaging::new();
        let mut event = sample_event();
        let key = event.staging_key();

        store.put(&key, &event).await.unwrap();
        event.description = "updated".to_string();
        store.put(&key, &event).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key).await.unwrap().unwrap().description, "updated");
    }
}
