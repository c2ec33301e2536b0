//! Error types for event handling.

use thiserror::Error;

/// Errors that can occur when decoding engine events.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The line was empty or whitespace only.
    #[error("empty event line")]
    Empty,

    /// The event payload is invalid.
    #[error("invalid event payload: {0}")]
    InvalidPayload(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::InvalidPayload(err.to_string())
    }
}
