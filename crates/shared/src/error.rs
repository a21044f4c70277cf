//! Shared error types.

use thiserror::Error;

/// Failure to make sense of an inbound frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON, lacks a `type` field, or a known message
    /// type is missing one of its required fields.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}
