//! MongoDB group store.
//!
//! # Document Shape
//!
//! ```text
//! {
//!   _id, file_name, checksum,
//!   uuid,          // first event's uuid
//!   events: [...], // embedded events, arrival order
//!   created_at     // first event's emit time, UTC
//! }
//! ```
//!
//! A unique index on `(file_name, checksum)` backs the one-group-per-file
//! invariant.
//!
//! # Upsert
//!
//! ```text
//! filter: { file_name, checksum, "events.uuid": { $ne: uuid } }
//! update: { $push: { events: event },
//!           $setOnInsert: { uuid, created_at } }
//! upsert: true
//! ```
//!
//! A matching group gets the event pushed atomically on the server. No match
//! means either no group exists (the upsert creates it) or the group already
//! holds this uuid. In the second case the insert trips the unique index, and
//! we check whether the uuid is present to tell it apart from a concurrent
//! creator winning the race, which is retried.

use super::{AppendOutcome, GroupStore};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use eventum_core::{DEFAULT_FILE_COLLECTION, Event, FileGroup, FileKey, GroupFilter};
use mongodb::bson::{self, Document, doc};
use mongodb::error::{ErrorKind, RETRYABLE_WRITE_ERROR, WriteFailure};
use mongodb::options::{ClientOptions, Credential, IndexOptions};
use mongodb::{Client, Collection, IndexModel};

/// Server error code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;

/// Upsert attempts before a persistent duplicate-key race is reported.
const MAX_UPSERT_ATTEMPTS: u32 = 3;

const UNIQUE_INDEX_NAME: &str = "file_name_checksum_unique";

/// Connection settings for the group store.
#[derive(Debug, Clone)]
pub struct MongoConfig {
    /// Connection string (e.g., "mongodb://localhost:27017").
    pub uri: String,

    /// Database name
    pub database: String,

    /// Collection holding file groups
    pub collection: String,

    /// Optional credentials; applied on top of the URI when set.
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "eventum".to_string(),
            collection: DEFAULT_FILE_COLLECTION.to_string(),
            username: None,
            password: None,
        }
    }
}

/// MongoDB-backed [`GroupStore`].
#[derive(Clone)]
pub struct MongoGroupStore {
    client: Client,
    collection: Collection<FileGroup>,
}

impl MongoGroupStore {
    /// Connect and ping the server.
    ///
    /// Does not touch the schema; call [`ensure_schema`](Self::ensure_schema)
    /// from writers.
    pub async fn connect(config: &MongoConfig) -> Result<Self> {
        let mut options = ClientOptions::parse(&config.uri)
            .await
            .map_err(persist_err)?;
        options.app_name = Some("eventum".to_string());
        if let Some(username) = &config.username {
            options.credential = Some(
                Credential::builder()
                    .username(username.clone())
                    .password(config.password.clone())
                    .build(),
            );
        }

        let client = Client::with_options(options).map_err(persist_err)?;
        let database = client.database(&config.database);
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(persist_err)?;

        tracing::info!(
            database = %config.database,
            collection = %config.collection,
            "Connected to MongoDB"
        );

        Ok(Self {
            collection: database.collection(&config.collection),
            client,
        })
    }

    /// Create the collection if missing and the unique `(file_name, checksum)` index.
    pub async fn ensure_schema(&self) -> Result<()> {
        let name = self.collection.name().to_string();
        let database = self.client.database(self.collection.namespace().db.as_str());

        let existing = database
            .list_collection_names()
            .await
            .map_err(persist_err)?;
        if !existing.contains(&name) {
            database.create_collection(&name).await.map_err(persist_err)?;
            tracing::info!("Created collection {}", name);
        }

        let index = IndexModel::builder()
            .keys(doc! { "file_name": 1, "checksum": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name(UNIQUE_INDEX_NAME.to_string())
                    .build(),
            )
            .build();
        self.collection
            .create_index(index)
            .await
            .map_err(persist_err)?;

        Ok(())
    }

    /// Disconnect, waiting for in-flight operations.
    pub async fn shutdown(self) {
        self.client.shutdown().await;
    }

    async fn contains_event(&self, event: &Event) -> Result<bool> {
        let count = self
            .collection
            .count_documents(doc! {
                "file_name": event.file_name.as_str(),
                "checksum": event.checksum.as_str(),
                "events.uuid": event.uuid.as_str(),
            })
            .await
            .map_err(persist_err)?;
        Ok(count > 0)
    }
}

#[async_trait]
impl GroupStore for MongoGroupStore {
    async fn append_or_create(&self, event: &Event) -> Result<AppendOutcome> {
        let mut event = event.clone();
        event.stamp_saved(Utc::now());

        let event_doc = bson::to_bson(&event).map_err(|e| Error::Serialization(e.to_string()))?;
        let created_at =
            bson::to_bson(&event.emitted_at_utc()).map_err(|e| Error::Serialization(e.to_string()))?;

        let filter = doc! {
            "file_name": event.file_name.as_str(),
            "checksum": event.checksum.as_str(),
            "events.uuid": { "$ne": event.uuid.as_str() },
        };
        let update = doc! {
            "$push": { "events": event_doc },
            "$setOnInsert": {
                "uuid": event.uuid.as_str(),
                "created_at": created_at,
            },
        };

        for attempt in 1..=MAX_UPSERT_ATTEMPTS {
            match self
                .collection
                .update_one(filter.clone(), update.clone())
                .upsert(true)
                .await
            {
                Ok(result) if result.upserted_id.is_some() => {
                    tracing::info!("New file added: {}, {}", event.file_name, event.checksum);
                    return Ok(AppendOutcome::Created);
                }
                Ok(_) => {
                    tracing::info!(
                        "Event added to existing file: {}, {}",
                        event.file_name,
                        event.checksum
                    );
                    return Ok(AppendOutcome::Appended);
                }
                Err(e) if is_duplicate_key(&e) => {
                    if self.contains_event(&event).await? {
                        tracing::debug!(
                            uuid = %event.uuid,
                            "Event already recorded for {}, {}",
                            event.file_name,
                            event.checksum
                        );
                        return Ok(AppendOutcome::AlreadyPresent);
                    }
                    tracing::debug!(attempt, "Concurrent group creation, retrying upsert");
                }
                Err(e) => return Err(persist_err(e)),
            }
        }

        Err(Error::Persist {
            message: format!(
                "upsert for {}, {} kept hitting the unique index",
                event.file_name, event.checksum
            ),
            transient: true,
        })
    }

    async fn get(&self, key: &FileKey) -> Result<Option<FileGroup>> {
        self.collection
            .find_one(doc! {
                "file_name": key.file_name.as_str(),
                "checksum": key.checksum.as_str(),
            })
            .await
            .map_err(persist_err)
    }

    async fn find(&self, filter: &GroupFilter) -> Result<Vec<FileGroup>> {
        let mut cursor = self
            .collection
            .find(filter_document(filter))
            .sort(doc! { "file_name": 1, "checksum": 1 })
            .await
            .map_err(persist_err)?;

        let mut groups = Vec::new();
        while cursor.advance().await.map_err(persist_err)? {
            groups.push(cursor.deserialize_current().map_err(persist_err)?);
        }
        Ok(groups)
    }
}

fn filter_document(filter: &GroupFilter) -> Document {
    let mut query = Document::new();
    if let Some(name) = &filter.file_name {
        query.insert("file_name", name.as_str());
    }
    if let Some(sum) = &filter.checksum {
        query.insert("checksum", sum.as_str());
    }
    query
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) => we.code == DUPLICATE_KEY,
        ErrorKind::Command(ce) => ce.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// Map a driver error, flagging network and server-selection failures as transient.
fn persist_err(e: mongodb::error::Error) -> Error {
    let transient = e.contains_label(RETRYABLE_WRITE_ERROR)
        || matches!(
            e.kind.as_ref(),
            ErrorKind::Io(_)
                | ErrorKind::ServerSelection { .. }
                | ErrorKind::ConnectionPoolCleared { .. }
        );
    Error::Persist {
        message: e.to_string(),
        transient,
    }
}
