//! LeaseClient: acquire, release, heartbeat, force-take and status calls
//! against the lease authority, normalized into typed outcomes.
//!
//! Network failures never escape as errors. Acquire and force-take fail
//! closed (`Unavailable`), heartbeat and status report `Unknown`, and
//! release is best-effort.

use std::collections::HashSet;

use chrono::Utc;
use tokio::sync::Mutex;

use editlock_core::{
    AcquireOutcome, DocumentId, ForceTakeOutcome, HeartbeatOutcome, Holder, Participant,
    PollOutcome,
};

use crate::error::TransportError;
use crate::transport::{LockTransport, Method, Reply};
use crate::wire::{self, LockBody};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// Already released for the current acquisition; no call made.
    Skipped,
    /// The call failed; the guard was reset so a later release may retry.
    Failed(String),
}

pub struct LeaseClient<T> {
    transport: T,
    me: Participant,
    /// Documents whose release was already issued since the last
    /// successful acquire or force-take.
    released: Mutex<HashSet<DocumentId>>,
}

impl<T: LockTransport> LeaseClient<T> {
    pub fn new(transport: T, me: Participant) -> Self {
        Self {
            transport,
            me,
            released: Mutex::new(HashSet::new()),
        }
    }

    pub fn participant(&self) -> &Participant {
        &self.me
    }

    pub async fn acquire(&self, document: &DocumentId) -> AcquireOutcome {
        let path = wire::lock_path(document);
        let reply = match self.transport.call(Method::Post, &path, None).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(%document, "acquire failed: {e}");
                return AcquireOutcome::Unavailable(e.to_string());
            }
        };
        match reply.status {
            200 | 201 => match self.granted_holder(reply) {
                Ok(holder) => {
                    self.arm_release(document).await;
                    AcquireOutcome::Acquired(holder)
                }
                Err(e) => AcquireOutcome::Unavailable(e.to_string()),
            },
            409 => {
                let holder = wire::decode::<LockBody>(reply.body)
                    .ok()
                    .and_then(|b| b.holder);
                match holder {
                    // The authority already has us as holder.
                    Some(holder) if holder.user_id == self.me.user_id => {
                        tracing::debug!(%document, "acquire conflict names us; treating as granted");
                        self.arm_release(document).await;
                        AcquireOutcome::Acquired(holder)
                    }
                    holder => AcquireOutcome::Denied(holder),
                }
            }
            status => AcquireOutcome::Unavailable(
                TransportError::UnexpectedStatus { status, path }.to_string(),
            ),
        }
    }

    /// Best-effort, at most once per acquisition.
    pub async fn release(&self, document: &DocumentId) -> ReleaseOutcome {
        if !self.released.lock().await.insert(document.clone()) {
            tracing::debug!(%document, "release already issued for this acquisition");
            return ReleaseOutcome::Skipped;
        }
        let path = wire::lock_path(document);
        let failure = match self.transport.call(Method::Delete, &path, None).await {
            Ok(reply) if reply.is_success() || reply.status == 404 => None,
            Ok(reply) => Some(
                TransportError::UnexpectedStatus {
                    status: reply.status,
                    path,
                }
                .to_string(),
            ),
            Err(e) => Some(e.to_string()),
        };
        match failure {
            None => {
                tracing::info!(%document, "edit lease released");
                ReleaseOutcome::Released
            }
            Some(reason) => {
                self.released.lock().await.remove(document);
                tracing::warn!(%document, %reason, "release failed; lease will expire on its own");
                ReleaseOutcome::Failed(reason)
            }
        }
    }

    pub async fn heartbeat(&self, document: &DocumentId) -> HeartbeatOutcome {
        let path = wire::heartbeat_path(document);
        match self.transport.call(Method::Post, &path, None).await {
            Ok(Reply { status: 200, .. }) => HeartbeatOutcome::Renewed,
            Ok(Reply { status: 409, .. }) => HeartbeatOutcome::Lost,
            Ok(Reply { status, .. }) => HeartbeatOutcome::Unknown(
                TransportError::UnexpectedStatus { status, path }.to_string(),
            ),
            Err(e) => HeartbeatOutcome::Unknown(e.to_string()),
        }
    }

    pub async fn force_take(&self, document: &DocumentId) -> ForceTakeOutcome {
        let path = wire::force_take_path(document);
        let reply = match self.transport.call(Method::Post, &path, None).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(%document, "force-take failed: {e}");
                return ForceTakeOutcome::Unavailable(e.to_string());
            }
        };
        match reply.status {
            200 | 201 => match self.granted_holder(reply) {
                Ok(holder) => {
                    self.arm_release(document).await;
                    ForceTakeOutcome::Taken(holder)
                }
                Err(e) => ForceTakeOutcome::Unavailable(e.to_string()),
            },
            403 | 409 => ForceTakeOutcome::Denied,
            status => ForceTakeOutcome::Unavailable(
                TransportError::UnexpectedStatus { status, path }.to_string(),
            ),
        }
    }

    /// Current holder snapshot, used by the fallback poll.
    pub async fn status(&self, document: &DocumentId) -> PollOutcome {
        let path = wire::lock_path(document);
        match self.transport.call(Method::Get, &path, None).await {
            Ok(Reply { status: 200, body }) => match wire::decode::<LockBody>(body) {
                Ok(lock) => PollOutcome::Holder(lock.holder),
                Err(e) => PollOutcome::Unknown(e.to_string()),
            },
            Ok(Reply { status: 404, .. }) => PollOutcome::Holder(None),
            Ok(Reply { status, .. }) => PollOutcome::Unknown(
                TransportError::UnexpectedStatus { status, path }.to_string(),
            ),
            Err(e) => PollOutcome::Unknown(e.to_string()),
        }
    }

    /// Holder named by a grant. An empty body means the grant is ours.
    fn granted_holder(&self, reply: Reply) -> Result<Holder, TransportError> {
        let body = match reply.body {
            Some(body) => wire::decode::<LockBody>(Some(body))?,
            None => LockBody::default(),
        };
        Ok(body
            .holder
            .unwrap_or_else(|| self.me.as_holder(Some(Utc::now()))))
    }

    async fn arm_release(&self, document: &DocumentId) {
        self.released.lock().await.remove(document);
    }
}
