//! Staging keys for the Redis write-ahead buffer.
//!
//! # Key Design
//!
//! ```text
//! eventum:staged:<len>:<checksum>|<len>:<file_name>|<len>:<uuid>
//! ```
//!
//! Each component is prefixed with its byte length, so no choice of
//! checksum, file name or uuid can make two different events share a key.
//! The fixed namespace prefix lets recovery enumerate staged copies with
//! `SCAN MATCH eventum:staged:*`.

use crate::error::{Error, Result};
use crate::event::Event;
use std::fmt;

/// Namespace shared by every staged copy.
pub const STAGING_KEY_PREFIX: &str = "eventum:staged:";

/// Key of one staged event instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StagingKey(String);

impl StagingKey {
    /// Build the key from its three components.
    pub fn new(checksum: &str, file_name: &str, uuid: &str) -> Self {
        let mut key = String::with_capacity(
            STAGING_KEY_PREFIX.len() + checksum.len() + file_name.len() + uuid.len() + 16,
        );
        key.push_str(STAGING_KEY_PREFIX);
        for (i, part) in [checksum, file_name, uuid].iter().enumerate() {
            if i > 0 {
                key.push('|');
            }
            key.push_str(&part.len().to_string());
            key.push(':');
            key.push_str(part);
        }
        Self(key)
    }

    /// Key for a decoded event.
    pub fn for_event(event: &Event) -> Self {
        Self::new(&event.checksum, &event.file_name, &event.uuid)
    }

    /// Validate a raw key read back from the store.
    pub fn parse(raw: &str) -> Result<Self> {
        Self::split(raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Components as `(checksum, file_name, uuid)`.
    pub fn components(&self) -> (&str, &str, &str) {
        // Construction guarantees the layout.
        Self::split(&self.0).unwrap_or(("", "", ""))
    }

    fn split(raw: &str) -> Result<(&str, &str, &str)> {
        let malformed = |reason: &str| Error::MalformedKey {
            key: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut rest = raw
            .strip_prefix(STAGING_KEY_PREFIX)
            .ok_or_else(|| malformed("missing namespace prefix"))?;

        let mut parts = [""; 3];
        for (i, slot) in parts.iter_mut().enumerate() {
            if i > 0 {
                rest = rest
                    .strip_prefix('|')
                    .ok_or_else(|| malformed("missing separator"))?;
            }
            let (len, tail) = rest
                .split_once(':')
                .ok_or_else(|| malformed("missing length prefix"))?;
            let len: usize = len.parse().map_err(|_| malformed("invalid length"))?;
            *slot = tail
                .get(..len)
                .ok_or_else(|| malformed("length exceeds key"))?;
            rest = &tail[len..];
        }

        if !rest.is_empty() {
            return Err(malformed("trailing data"));
        }
        Ok((parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for StagingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
