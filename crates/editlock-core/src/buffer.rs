//! Edit buffer: baseline vs local content, version token, and save
//! snapshots.
//!
//! `dirty` is never stored. It is always `local != baseline`.

use serde::{Deserialize, Serialize};

use crate::types::DocumentSnapshot;

/// Content captured when a save is issued. The baseline may only ever
/// advance to a ticket's snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveTicket {
    pub snapshot: String,
    pub version_token: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditBuffer {
    baseline: String,
    local: String,
    version_token: u64,
}

impl EditBuffer {
    pub fn new(snapshot: DocumentSnapshot) -> Self {
        Self {
            local: snapshot.content.clone(),
            baseline: snapshot.content,
            version_token: snapshot.version_token,
        }
    }

    pub fn baseline(&self) -> &str {
        &self.baseline
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn version_token(&self) -> u64 {
        self.version_token
    }

    pub fn is_dirty(&self) -> bool {
        self.local != self.baseline
    }

    /// Replace the local content with the editor's current text.
    pub fn edit(&mut self, content: impl Into<String>) {
        self.local = content.into();
    }

    /// Snapshot the local content for a save call.
    pub fn begin_save(&self) -> SaveTicket {
        SaveTicket {
            snapshot: self.local.clone(),
            version_token: self.version_token,
        }
    }

    /// Apply a successful save. Edits made after `ticket` was taken stay
    /// in `local`, so the buffer remains dirty if they differ.
    pub fn commit_save(&mut self, ticket: SaveTicket, new_version_token: u64) {
        self.baseline = ticket.snapshot;
        self.version_token = new_version_token;
    }

    /// Drop local edits.
    pub fn discard(&mut self) {
        self.local.clone_from(&self.baseline);
    }

    /// Adopt a fresh server copy as baseline, keeping local edits.
    pub fn rebase(&mut self, snapshot: DocumentSnapshot) {
        self.baseline = snapshot.content;
        self.version_token = snapshot.version_token;
    }

    /// Adopt a fresh server copy and drop local edits.
    pub fn reset(&mut self, snapshot: DocumentSnapshot) {
        self.rebase(snapshot);
        self.discard();
    }
}
