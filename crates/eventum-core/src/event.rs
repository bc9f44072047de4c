//! Event data model and wire codec.
//!
//! Producers publish events as JSON objects on the event topic:
//!
//! ```json
//! {
//!   "event_name": "upload",
//!   "description": "file received",
//!   "file_name": "a.txt",
//!   "checksum": "c1",
//!   "event_type": "INFO",
//!   "emit_datetime": "2024-12-30T12:34:56Z",
//!   "uuid": "u1"
//! }
//! ```
//!
//! `save_datetime` is never taken from the producer. It is assigned when the
//! payload is decoded and re-assigned by the group store at write time.

use crate::error::{Error, Result};
use crate::key::StagingKey;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Info,
    Warning,
    Error,
    Critical,
}

impl EventType {
    /// Wire representation of the severity.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single occurrence report tied to a file.
///
/// This is the shape stored in Redis and embedded in MongoDB file groups.
/// It always carries `save_datetime`; use [`decode_event`] for producer
/// payloads, which lack it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_name: String,
    pub description: String,
    pub file_name: String,
    pub checksum: String,
    pub event_type: EventType,
    /// When the producer emitted the event, in the producer's time zone.
    pub emit_datetime: DateTime<FixedOffset>,
    /// When the event was durably saved. Never earlier than `emit_datetime`.
    pub save_datetime: DateTime<Utc>,
    /// Producer-assigned instance identifier. Trusted, not re-validated.
    pub uuid: String,
}

impl Event {
    /// The `(file_name, checksum)` identity this event groups under.
    pub fn file_key(&self) -> FileKey {
        FileKey::new(&self.file_name, &self.checksum)
    }

    /// The key under which this event is staged.
    pub fn staging_key(&self) -> StagingKey {
        StagingKey::for_event(self)
    }

    /// Emission time normalized to UTC.
    pub fn emitted_at_utc(&self) -> DateTime<Utc> {
        self.emit_datetime.with_timezone(&Utc)
    }

    /// Assign the save time.
    ///
    /// Clamped to the emission time so a producer clock running ahead of ours
    /// cannot break `emit_datetime <= save_datetime`.
    pub fn stamp_saved(&mut self, now: DateTime<Utc>) {
        self.save_datetime = now.max(self.emitted_at_utc());
    }
}

/// Producer payload: every event field except `save_datetime`.
#[derive(Deserialize)]
struct WireEvent {
    event_name: String,
    description: String,
    file_name: String,
    checksum: String,
    event_type: EventType,
    emit_datetime: DateTime<FixedOffset>,
    uuid: String,
}

#[derive(Serialize)]
struct WireEventRef<'a> {
    event_name: &'a str,
    description: &'a str,
    file_name: &'a str,
    checksum: &'a str,
    event_type: EventType,
    emit_datetime: &'a DateTime<FixedOffset>,
    uuid: &'a str,
}

/// Decode a producer payload into an [`Event`].
///
/// All wire fields are required, and `file_name`, `checksum` and `uuid` must be
/// non-empty because they form the staging key and the group identity.
///
/// # Errors
///
/// Returns [`Error::Json`] for malformed JSON, missing fields, unknown
/// severities or bad timestamps, and [`Error::InvalidField`] for empty
/// identity fields.
pub fn decode_event(payload: &[u8]) -> Result<Event> {
    let wire: WireEvent = serde_json::from_slice(payload)?;

    require_non_empty("file_name", &wire.file_name)?;
    require_non_empty("checksum", &wire.checksum)?;
    require_non_empty("uuid", &wire.uuid)?;

    let mut event = Event {
        event_name: wire.event_name,
        description: wire.description,
        file_name: wire.file_name,
        checksum: wire.checksum,
        event_type: wire.event_type,
        emit_datetime: wire.emit_datetime,
        save_datetime: DateTime::<Utc>::MIN_UTC,
        uuid: wire.uuid,
    };
    event.stamp_saved(Utc::now());
    Ok(event)
}

/// Encode an event in the producer wire format (without `save_datetime`).
pub fn encode_event(event: &Event) -> Result<Vec<u8>> {
    let wire = WireEventRef {
        event_name: &event.event_name,
        description: &event.description,
        file_name: &event.file_name,
        checksum: &event.checksum,
        event_type: event.event_type,
        emit_datetime: &event.emit_datetime,
        uuid: &event.uuid,
    };
    Ok(serde_json::to_vec(&wire)?)
}

fn require_non_empty(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidField {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Identity of a file group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileKey {
    pub file_name: String,
    pub checksum: String,
}

impl FileKey {
    pub fn new(file_name: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            checksum: checksum.into(),
        }
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.file_name, self.checksum)
    }
}

/// Durable aggregate of every event reported for one `(file_name, checksum)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileGroup {
    pub file_name: String,
    pub checksum: String,
    /// Instance identifier of the event that created the group.
    pub uuid: String,
    /// Events in arrival order. Append-only.
    pub events: Vec<Event>,
    /// Emission time of the first event, in UTC. Set once.
    pub created_at: DateTime<Utc>,
}

impl FileGroup {
    /// Start a group whose sole member is `event`.
    pub fn new(event: Event) -> Self {
        Self {
            file_name: event.file_name.clone(),
            checksum: event.checksum.clone(),
            uuid: event.uuid.clone(),
            created_at: event.emitted_at_utc(),
            events: vec![event],
        }
    }

    pub fn key(&self) -> FileKey {
        FileKey::new(&self.file_name, &self.checksum)
    }

    /// Whether an event with this instance identifier is already recorded.
    pub fn contains(&self, uuid: &str) -> bool {
        self.events.iter().any(|e| e.uuid == uuid)
    }

    /// Append `event` unless its uuid is already recorded.
    ///
    /// Returns `true` if the event was appended.
    pub fn append(&mut self, event: Event) -> bool {
        if self.contains(&event.uuid) {
            return false;
        }
        self.events.push(event);
        true
    }
}

/// Read-only query over stored file groups.
///
/// An empty filter matches every group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupFilter {
    pub file_name: Option<String>,
    pub checksum: Option<String>,
}

impl GroupFilter {
    pub fn is_empty(&self) -> bool {
        self.file_name.is_none() && self.checksum.is_none()
    }

    pub fn matches(&self, group: &FileGroup) -> bool {
        self.file_name
            .as_deref()
            .is_none_or(|name| name == group.file_name)
            && self
                .checksum
                .as_deref()
                .is_none_or(|sum| sum == group.checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO_A: &str = r#"{"event_name":"upload","description":"file received","file_name":"a.txt","checksum":"c1","event_type":"INFO","emit_datetime":"2024-01-01T00:00:00Z","uuid":"u1"}"#;

    #[test]
    fn test_decode_valid_payload() {
        let before = Utc::now();
        let event = decode_event(SCENARIO_A.as_bytes()).unwrap();

        assert_eq!(event.file_name, "a.txt");
        assert_eq!(event.checksum, "c1");
        assert_eq!(event.uuid, "u1");
        assert_eq!(event.event_type, EventType::Info);
        assert_eq!(
            event.emitted_at_utc(),
            "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert!(event.save_datetime >= before);
    }

    #[test]
    fn test_decode_missing_checksum() {
        let payload = r#"{"event_name":"upload","description":"","file_name":"a.txt","event_type":"INFO","emit_datetime":"2024-01-01T00:00:00Z","uuid":"u1"}"#;
        let err = decode_event(payload.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_decode_empty_identity_field() {
        let payload = SCENARIO_A.replace(r#""uuid":"u1""#, r#""uuid":"  ""#);
        let err = decode_event(payload.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidField { field: "uuid", .. }));
    }

    #[test]
    fn test_decode_unknown_severity() {
        let payload = SCENARIO_A.replace("INFO", "DEBUG");
        assert!(decode_event(payload.as_bytes()).is_err());
    }

    #[test]
    fn test_decode_bad_timestamp() {
        let payload = SCENARIO_A.replace("2024-01-01T00:00:00Z", "yesterday");
        assert!(decode_event(payload.as_bytes()).is_err());
    }

    #[test]
    fn test_decode_ignores_producer_save_datetime() {
        let payload = SCENARIO_A.replace(
            r#""uuid":"u1""#,
            r#""uuid":"u1","save_datetime":"1999-01-01T00:00:00Z""#,
        );
        let event = decode_event(payload.as_bytes()).unwrap();
        assert!(event.save_datetime.timestamp() > 946_684_800);
    }

    #[test]
    fn test_encode_then_decode_preserves_fields() {
        let payload = SCENARIO_A.replace("2024-01-01T00:00:00Z", "2024-12-30T12:34:56+02:00");
        let original = decode_event(payload.as_bytes()).unwrap();

        let encoded = encode_event(&original).unwrap();
        let before = Utc::now();
        let decoded = decode_event(&encoded).unwrap();

        assert_eq!(decoded.event_name, original.event_name);
        assert_eq!(decoded.description, original.description);
        assert_eq!(decoded.file_name, original.file_name);
        assert_eq!(decoded.checksum, original.checksum);
        assert_eq!(decoded.event_type, original.event_type);
        assert_eq!(decoded.emit_datetime, original.emit_datetime);
        assert_eq!(decoded.emit_datetime.offset(), original.emit_datetime.offset());
        assert_eq!(decoded.uuid, original.uuid);
        assert!(decoded.save_datetime >= before);
    }

    #[test]
    fn test_encode_omits_save_datetime() {
        let event = decode_event(SCENARIO_A.as_bytes()).unwrap();
        let encoded = String::from_utf8(encode_event(&event).unwrap()).unwrap();
        assert!(!encoded.contains("save_datetime"));
        assert!(encoded.contains(r#""event_type":"INFO""#));
    }

    #[test]
    fn test_stamp_saved_never_precedes_emission() {
        let payload = SCENARIO_A.replace("2024-01-01T00:00:00Z", "2999-01-01T00:00:00Z");
        let mut event = decode_event(payload.as_bytes()).unwrap();
        assert_eq!(event.save_datetime, event.emitted_at_utc());

        event.stamp_saved(Utc::now());
        assert!(event.save_datetime >= event.emitted_at_utc());
    }

    #[test]
    fn test_file_group_new_and_append() {
        let first = decode_event(SCENARIO_A.as_bytes()).unwrap();
        let mut group = FileGroup::new(first.clone());

        assert_eq!(group.uuid, "u1");
        assert_eq!(group.created_at, first.emitted_at_utc());
        assert_eq!(group.key(), FileKey::new("a.txt", "c1"));

        let mut second = first.clone();
        second.uuid = "u2".to_string();
        assert!(group.append(second));
        assert!(!group.append(first));
        assert_eq!(group.events.len(), 2);
        assert_eq!(group.created_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_group_filter_matches() {
        let group = FileGroup::new(decode_event(SCENARIO_A.as_bytes()).unwrap());

        assert!(GroupFilter::default().matches(&group));
        assert!(
            GroupFilter {
                file_name: Some("a.txt".to_string()),
                checksum: None,
            }
            .matches(&group)
        );
        assert!(
            !GroupFilter {
                file_name: Some("a.txt".to_string()),
                checksum: Some("other".to_string()),
            }
            .matches(&group)
        );
    }

    #[test]
    fn test_event_type_display() {
        assert_eq!(EventType::Critical.to_string(), "CRITICAL");
        assert_eq!(
            serde_json::to_string(&EventType::Warning).unwrap(),
            "\"WARNING\""
        );
    }
}
