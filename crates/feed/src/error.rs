//! Error types for the feed client.

use thiserror::Error;

/// Errors that can occur while ingesting the trade feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Transport-level failure (connect, read, write). Recovered locally
    /// via the reconnect schedule, never fatal to the process.
    #[error("transport error: {0}")]
    Transport(String),

    /// Credentials rejected or the auth acknowledgment was absent or
    /// malformed. Fatal: retrying with the same key cannot succeed.
    #[error("authentication error: {0}")]
    Auth(String),

    /// A message that could not be decoded. Dropped and counted, never
    /// interrupts the stream.
    #[error("parse error: {0}")]
    Parse(String),

    /// The server closed the connection.
    #[error("connection closed: {0}")]
    Closed(String),
}

impl FeedError {
    /// Returns true when the error must stop the ingestion loop instead of
    /// entering the reconnect schedule.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                Self::Closed("websocket closed".to_string())
            }
            other => Self::Transport(other.to_string()),
        }
    }
}
