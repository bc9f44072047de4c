//! Error types for the ingestion pipeline.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum Error {
    /// Event decoding or key error from the data model.
    #[error(transparent)]
    Core(#[from] eventum_core::Error),

    /// The message source is unreachable or returned a protocol error.
    /// Fatal to the consume loop.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Staging store (Redis) error.
    #[error("Staging error: {message}")]
    Staging {
        message: String,
        /// Whether retrying the operation may succeed.
        transient: bool,
    },

    /// Durable group store (MongoDB) error.
    #[error("Persist error: {message}")]
    Persist {
        message: String,
        /// Whether retrying the operation may succeed.
        transient: bool,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether a retry of the failed operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Staging { transient, .. } | Self::Persist { transient, .. } => *transient,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
