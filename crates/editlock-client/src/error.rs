//! Error types for the lease authority client.

use thiserror::Error;

/// Raised inside the client only. `LeaseClient` and `SaveCoordinator` fold
/// these into typed outcomes before anything reaches a session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {path}")]
    UnexpectedStatus { status: u16, path: String },

    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("push channel error: {0}")]
    Channel(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Channel(err.to_string())
    }
}
