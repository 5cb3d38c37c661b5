//! SaveCoordinator: optimistic-concurrency saves and content fetches.

use editlock_core::{DocumentId, DocumentSnapshot, SaveOutcome, SaveTicket};

use crate::error::TransportError;
use crate::transport::{LockTransport, Method};
use crate::wire::{self, SaveRequest, SaveResponse};

pub struct SaveCoordinator<T> {
    transport: T,
}

impl<T: LockTransport> SaveCoordinator<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Persist `ticket.snapshot` under `ticket.version_token`. Never retried.
    pub async fn save(&self, document: &DocumentId, ticket: &SaveTicket) -> SaveOutcome {
        let path = wire::content_path(document);
        let request = SaveRequest {
            content: &ticket.snapshot,
            version_token: ticket.version_token,
        };
        let body = match serde_json::to_value(&request) {
            Ok(body) => body,
            Err(e) => return SaveOutcome::TransportError(e.to_string()),
        };
        let reply = match self.transport.call(Method::Put, &path, Some(body)).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(%document, "save request failed: {e}");
                return SaveOutcome::TransportError(e.to_string());
            }
        };
        match reply.status {
            200 | 201 => match wire::decode::<SaveResponse>(reply.body) {
                Ok(saved) => SaveOutcome::Saved {
                    new_version_token: saved.version_token,
                },
                Err(e) => SaveOutcome::TransportError(e.to_string()),
            },
            409 => SaveOutcome::VersionConflict,
            status => SaveOutcome::TransportError(
                TransportError::UnexpectedStatus { status, path }.to_string(),
            ),
        }
    }

    /// Load the server copy of `document`.
    pub async fn fetch(&self, document: &DocumentId) -> Result<DocumentSnapshot, TransportError> {
        let path = wire::content_path(document);
        let reply = self.transport.call(Method::Get, &path, None).await?;
        if reply.status != 200 {
            return Err(TransportError::UnexpectedStatus {
                status: reply.status,
                path,
            });
        }
        wire::decode(reply.body)
    }
}
