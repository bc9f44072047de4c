//! Redis staging store.
//!
//! Values are the JSON-serialized [`Event`], written with plain `SET` (no
//! TTL). Keys live under [`STAGING_KEY_PREFIX`] so recovery can enumerate them
//! with `SCAN`, which does not block the server the way `KEYS` does.

use super::StagingStore;
use crate::{Error, Result};
use async_trait::async_trait;
use eventum_core::{Event, STAGING_KEY_PREFIX, StagingKey};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError};

/// Number of keys requested per `SCAN` round trip.
const SCAN_BATCH: usize = 500;

/// Connection settings for the staging store.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// `host:port` or a full `redis://` URL.
    pub addr: String,

    /// Logical database index.
    pub db: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: "localhost:6379".to_string(),
            db: 0,
        }
    }
}

impl RedisConfig {
    /// Connection URL for the redis client.
    ///
    /// A full URL in `addr` is used as is; `db` applies only to `host:port`.
    pub fn url(&self) -> String {
        if self.addr.contains("://") {
            self.addr.clone()
        } else {
            format!("redis://{}/{}", self.addr, self.db)
        }
    }
}

/// Redis-backed [`StagingStore`].
///
/// Holds one multiplexed, auto-reconnecting connection for the process
/// lifetime. Cloning the manager per call is cheap and shares the connection.
#[derive(Clone)]
pub struct RedisStaging {
    conn: ConnectionManager,
}

impl RedisStaging {
    /// Connect and verify the server answers `PING`.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url()).map_err(staging_err)?;
        let mut conn = ConnectionManager::new(client).await.map_err(staging_err)?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(staging_err)?;
        tracing::info!(addr = %config.addr, db = config.db, reply = %pong, "Connected to Redis");

        Ok(Self { conn })
    }
}

#[async_trait]
impl StagingStore for RedisStaging {
    async fn put(&self, key: &StagingKey, event: &Event) -> Result<()> {
        let value = serde_json::to_string(event)?;
        let mut conn = self.conn.clone();
        let _: () = conn.set(key.as_str(), value).await.map_err(staging_err)?;
        Ok(())
    }

    async fn get(&self, key: &StagingKey) -> Result<Option<Event>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key.as_str()).await.map_err(staging_err)?;
        value
            .map(|v| serde_json::from_str(&v).map_err(Error::from))
            .transpose()
    }

    async fn delete(&self, key: &StagingKey) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(key.as_str()).await.map_err(staging_err)?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<StagingKey>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{STAGING_KEY_PREFIX}*");
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(staging_err)?;

            for raw in batch {
                match StagingKey::parse(&raw) {
                    Ok(key) => keys.push(key),
                    Err(e) => tracing::warn!("Skipping foreign staging key: {}", e),
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once.
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

/// Map a redis error, flagging connection-level failures as transient.
fn staging_err(e: RedisError) -> Error {
    let transient = e.is_io_error()
        || e.is_timeout()
        || e.is_connection_dropped()
        || e.is_connection_refusal();
    Error::Staging {
        message: e.to_string(),
        transient,
    }
}
