use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SessionError;

// ─── Identity ─────────────────────────────────────────────────────

/// Opaque identifier of a shared document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque identifier of a participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ─── Participant & Role ───────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    /// May force-take a lease held by someone else.
    Elevated,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Elevated => "elevated",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "member" => Ok(Self::Member),
            "elevated" | "admin" => Ok(Self::Elevated),
            _ => Err(SessionError::UnknownRole(s.to_owned())),
        }
    }
}

/// The local user driving the edit sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub role: Role,
}

impl Participant {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: UserId::new(user_id),
            display_name: display_name.into(),
            role,
        }
    }

    /// Holder record describing this participant (used for optimistic local views).
    pub fn as_holder(&self, acquired_at: Option<DateTime<Utc>>) -> Holder {
        Holder {
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            acquired_at,
        }
    }
}

// ─── Lease ────────────────────────────────────────────────────────

/// Current owner of a document's edit lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
    pub user_id: UserId,
    #[serde(alias = "name")]
    pub display_name: String,
    #[serde(default)]
    pub acquired_at: Option<DateTime<Utc>>,
}

/// Exclusive edit ownership of one document as last observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub document_id: DocumentId,
    pub holder: Option<Holder>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaseStatus {
    Known,
    /// Last heartbeat or poll failed, or the view was invalidated.
    #[default]
    Unknown,
}

// ─── Push Channel ─────────────────────────────────────────────────

/// Notification delivered by the push channel (at-most-once).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    DocumentLocked {
        document_id: DocumentId,
        holder: Holder,
    },
    DocumentUnlocked {
        document_id: DocumentId,
    },
    DocumentForceTaken {
        document_id: DocumentId,
        holder: Holder,
    },
}

impl PushEvent {
    pub fn document_id(&self) -> &DocumentId {
        match self {
            Self::DocumentLocked { document_id, .. }
            | Self::DocumentUnlocked { document_id }
            | Self::DocumentForceTaken { document_id, .. } => document_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::DocumentLocked { .. } => "document_locked",
            Self::DocumentUnlocked { .. } => "document_unlocked",
            Self::DocumentForceTaken { .. } => "document_force_taken",
        }
    }
}

// ─── Protocol Outcomes ────────────────────────────────────────────

/// Normalized result of an acquire call. Anything that is not a clean
/// 200/409 is `Unavailable` and counts as not acquired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired(Holder),
    Denied(Option<Holder>),
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    Renewed,
    /// Lease expired or was taken; the cached view must be refreshed.
    Lost,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForceTakeOutcome {
    Taken(Holder),
    Denied,
    Unavailable(String),
}

/// Result of a `GET` lock snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Holder(Option<Holder>),
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { new_version_token: u64 },
    /// Server content changed since the presented version token.
    VersionConflict,
    TransportError(String),
}

/// Server copy of a document's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub content: String,
    pub version_token: u64,
}

// ─── Notices ──────────────────────────────────────────────────────

/// User-visible message produced by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    AcquireDenied { holder_name: Option<String> },
    TakenOver { holder_name: String },
    VersionConflict,
    SaveFailed { reason: String },
    Saved { version_token: u64 },
    LeaseStatusUnknown,
    ForceTakeDenied,
    QuitBlocked,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AcquireDenied {
                holder_name: Some(name),
            } => write!(f, "{name} is currently editing this document"),
            Self::AcquireDenied { holder_name: None } => {
                write!(f, "someone else is currently editing this document")
            }
            Self::TakenOver { holder_name } => write!(f, "editing taken over by {holder_name}"),
            Self::VersionConflict => write!(
                f,
                "document was modified elsewhere; reload before saving again"
            ),
            Self::SaveFailed { reason } => write!(f, "save failed: {reason}"),
            Self::Saved { version_token } => write!(f, "saved (version {version_token})"),
            Self::LeaseStatusUnknown => write!(f, "edit lock status unknown; retrying"),
            Self::ForceTakeDenied => write!(f, "force-take was refused by the server"),
            Self::QuitBlocked => write!(f, "quit cancelled; unsaved changes remain"),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────
