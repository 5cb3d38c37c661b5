//! Inputs consumed and commands emitted by the session registry.
//!
//! The core never performs IO. Every remote call is emitted as a
//! [`Command`]; the runtime executes it and feeds the typed result back as a
//! [`Completion`] carrying the same [`Generation`].

use crate::buffer::SaveTicket;
use crate::generation::Generation;
use crate::types::{
    AcquireOutcome, DocumentId, DocumentSnapshot, ForceTakeOutcome, HeartbeatOutcome, Notice,
    PollOutcome, PushEvent, SaveOutcome,
};

// ─── Prompts ─────────────────────────────────────────────────────────

/// Confirmation currently shown for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// Cancel pressed with unsaved changes.
    Discard,
    /// User idle past the threshold; auto-resolves at `deadline_ms`.
    Inactivity { deadline_ms: u64 },
    /// App quit requested with unsaved changes.
    Quit,
    /// Switching to `target` with unsaved changes.
    Navigate { target: DocumentId },
}

impl Prompt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discard => "discard",
            Self::Inactivity { .. } => "inactivity",
            Self::Quit => "quit",
            Self::Navigate { .. } => "navigate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactivityChoice {
    Save,
    Discard,
    Continue,
}

/// Answer to a quit or navigation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveChoice {
    Save,
    Discard,
    Stay,
}

// ─── Inputs ──────────────────────────────────────────────────────────

/// A user intent addressed to one document's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Enter,
    Edit(String),
    Save,
    Cancel,
    ConfirmDiscard,
    KeepEditing,
    Inactivity(InactivityChoice),
    Leave(LeaveChoice),
    ForceTake,
    /// Server copy fetched by the UI (after a version conflict, or while viewing).
    Reload(DocumentSnapshot),
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enter => "enter",
            Self::Edit(_) => "edit",
            Self::Save => "save",
            Self::Cancel => "cancel",
            Self::ConfirmDiscard => "confirm_discard",
            Self::KeepEditing => "keep_editing",
            Self::Inactivity(_) => "inactivity_choice",
            Self::Leave(_) => "leave_choice",
            Self::ForceTake => "force_take",
            Self::Reload(_) => "reload",
        }
    }
}

/// Typed result of a command, tagged with the generation it was issued under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Acquire {
        generation: Generation,
        outcome: AcquireOutcome,
    },
    Release {
        generation: Generation,
    },
    Heartbeat {
        generation: Generation,
        outcome: HeartbeatOutcome,
    },
    ForceTake {
        generation: Generation,
        outcome: ForceTakeOutcome,
    },
    Save {
        generation: Generation,
        ticket: SaveTicket,
        outcome: SaveOutcome,
    },
    /// `issued_at_ms` lets the registry drop a poll overtaken by fresher
    /// lease information.
    Poll {
        issued_at_ms: u64,
        outcome: PollOutcome,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Intent {
        document: DocumentId,
        intent: Intent,
    },
    Completion {
        document: DocumentId,
        completion: Completion,
    },
    Push(PushEvent),
    ChannelDown,
    ChannelUp,
    /// Raw user input (keyboard, pointer) not tied to an intent.
    Activity,
    Navigate {
        from: DocumentId,
        to: DocumentId,
    },
    QuitRequested,
}

// ─── Commands ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Acquire {
        document: DocumentId,
        generation: Generation,
    },
    Release {
        document: DocumentId,
        generation: Generation,
    },
    Heartbeat {
        document: DocumentId,
        generation: Generation,
    },
    ForceTake {
        document: DocumentId,
        generation: Generation,
    },
    Save {
        document: DocumentId,
        generation: Generation,
        ticket: SaveTicket,
    },
    Poll {
        document: DocumentId,
    },
    Notify {
        document: DocumentId,
        notice: Notice,
    },
    ShowPrompt {
        document: DocumentId,
        prompt: Prompt,
    },
    DismissPrompt {
        document: DocumentId,
    },
    /// The UI should now open `to`; the lease on `from` is gone.
    Navigate {
        from: DocumentId,
        to: DocumentId,
    },
    AllowQuit,
}

impl Command {
    /// Commands whose completion the runtime must feed back.
    pub fn expects_completion(&self) -> bool {
        matches!(
            self,
            Self::Acquire { .. }
                | Self::Release { .. }
                | Self::Heartbeat { .. }
                | Self::ForceTake { .. }
                | Self::Save { .. }
                | Self::Poll { .. }
        )
    }
}
