//! Client error types.

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum ClientError {
    /// No open socket to send on. Nothing is queued.
    #[error("host is not open")]
    NotOpen,
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tungstenite::Error>,
    },
    #[error("timed out connecting to {url} after {timeout:?}")]
    ConnectTimeout { url: String, timeout: Duration },
    /// The match was closed while a resume was still connecting.
    #[error("connection was closed while connecting")]
    Closed,
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}
