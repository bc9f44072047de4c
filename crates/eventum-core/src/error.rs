//! Error types for the Eventum data model.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding or validating events.
#[derive(Error, Debug)]
pub enum Error {
    /// Payload is not valid JSON or does not match the event schema
    /// (missing field, unknown severity, malformed timestamp).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A field parsed but holds an unusable value.
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// The name of the invalid field.
        field: &'static str,
        /// Description of what's wrong.
        reason: String,
    },

    /// A staging key does not follow the length-prefixed layout.
    #[error("malformed staging key '{key}': {reason}")]
    MalformedKey {
        /// The raw key as read from the store.
        key: String,
        /// Description of what's wrong.
        reason: String,
    },
}
