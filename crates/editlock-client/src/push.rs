//! Push channel: WebSocket subscription to lease events.
//!
//! Delivery is at-most-once and nothing is replayed after a disconnect, so
//! every (re)connect is reported as `Connected` and the event loop forces a
//! lease resync. Reconnects back off exponentially.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_util::sync::CancellationToken;

use editlock_core::PushEvent;

use crate::backoff::{BackoffPolicy, ReconnectBackoff};
use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushSignal {
    Connected,
    Disconnected,
    Event(PushEvent),
}

pub struct PushChannel {
    url: String,
    token: Option<String>,
    policy: BackoffPolicy,
    tx: mpsc::UnboundedSender<PushSignal>,
    cancel: CancellationToken,
}

impl PushChannel {
    pub fn new(
        url: impl Into<String>,
        tx: mpsc::UnboundedSender<PushSignal>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            url: url.into(),
            token: None,
            policy: BackoffPolicy::default(),
            tx,
            cancel,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Connect, listen, and reconnect until cancelled or the receiver is
    /// dropped.
    pub async fn run(&self) {
        let mut backoff = ReconnectBackoff::new(self.policy.clone());
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("push channel: cancellation requested, shutting down");
                    return;
                }
                result = self.connect_and_listen(&mut backoff) => {
                    match result {
                        Ok(()) => tracing::info!("push channel: connection closed"),
                        Err(e) => tracing::warn!(attempt = backoff.attempt(), "push channel: {e}"),
                    }
                }
            }
            if self.tx.is_closed() {
                return;
            }

            let delay = backoff.next_delay();
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {
                    tracing::info!(url = %self.url, delay_ms = delay.as_millis() as u64, "push channel: reconnecting");
                }
            }
        }
    }

    async fn connect_and_listen(
        &self,
        backoff: &mut ReconnectBackoff,
    ) -> Result<(), TransportError> {
        let request = self.request()?;
        let (ws_stream, _response) = tokio_tungstenite::connect_async(request).await?;
        backoff.reset();
        tracing::info!(url = %self.url, "push channel: connected");
        if self.tx.send(PushSignal::Connected).is_err() {
            return Ok(());
        }

        let (_write, mut read) = ws_stream.split();
        let result = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break Ok(()),
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(event) = parse_push_frame(&text) {
                            if self.tx.send(PushSignal::Event(event)).is_err() {
                                break Ok(());
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(e.into()),
                },
            }
        };
        let _ = self.tx.send(PushSignal::Disconnected);
        result
    }

    fn request(&self) -> Result<Request, TransportError> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(ref token) = self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| TransportError::Channel(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(request)
    }
}

/// Decode one text frame. Unknown event types and malformed frames are
/// logged and skipped.
pub fn parse_push_frame(text: &str) -> Option<PushEvent> {
    match serde_json::from_str::<PushEvent>(text) {
        Ok(event) => Some(event),
        Err(e) => {
            let kind = serde_json::from_str::<serde_json::Value>(text)
                .ok()
                .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_owned));
            match kind {
                Some(kind) => tracing::debug!(kind, "push channel: ignoring frame"),
                None => tracing::warn!("push channel: malformed frame: {e}"),
            }
            None
        }
    }
}
