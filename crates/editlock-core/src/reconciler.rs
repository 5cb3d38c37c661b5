//! Lease reconciler: merges push events, fallback polls, local lease
//! results and explicit invalidation into one holder view per document.
//!
//! Rules:
//!
//! - `document_locked` / `document_force_taken` set the holder
//!   unconditionally: they carry the authority's truth at emission time.
//! - `document_unlocked` clears the holder unconditionally.
//! - A poll replaces the entry wholesale (full resync).
//! - After a channel gap every open document must be polled at once,
//!   since events emitted during the gap are never redelivered.
//!
//! The view is a cache. It can be briefly wrong and is repaired by the next
//! poll or event.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{DocumentId, Holder, LeaseStatus, PollOutcome, PushEvent, UserId};

// ─── View ────────────────────────────────────────────────────────────

/// Reconciled lease state of one document, as seen by the local user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseView {
    pub holder: Option<Holder>,
    pub status: LeaseStatus,
    pub is_held_by_me: bool,
    pub is_held_by_other: bool,
}

impl LeaseView {
    pub fn holder_name(&self) -> Option<&str> {
        self.holder.as_ref().map(|h| h.display_name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LeaseEntry {
    holder: Option<Holder>,
    status: LeaseStatus,
    updated_at_ms: u64,
}

impl LeaseEntry {
    fn unknown(now_ms: u64) -> Self {
        Self {
            holder: None,
            status: LeaseStatus::Unknown,
            updated_at_ms: now_ms,
        }
    }

    /// Replace holder/status; returns whether anything observable changed.
    fn set(&mut self, holder: Option<Holder>, status: LeaseStatus, now_ms: u64) -> bool {
        let changed = holder_key(&self.holder) != holder_key(&holder) || self.status != status;
        self.holder = holder;
        self.status = status;
        self.updated_at_ms = now_ms;
        changed
    }
}

fn holder_key(holder: &Option<Holder>) -> Option<&UserId> {
    holder.as_ref().map(|h| &h.user_id)
}

// ─── Reconciler ──────────────────────────────────────────────────────

#[derive(Debug)]
pub struct LeaseReconciler {
    me: UserId,
    entries: HashMap<DocumentId, LeaseEntry>,
    channel_connected: bool,
    disconnected_since_ms: Option<u64>,
}

impl LeaseReconciler {
    pub fn new(me: UserId) -> Self {
        Self {
            me,
            entries: HashMap::new(),
            channel_connected: false,
            disconnected_since_ms: None,
        }
    }

    /// Start tracking a document. Its status is `Unknown` until the first
    /// poll or event.
    pub fn open(&mut self, document: DocumentId, now_ms: u64) {
        self.entries
            .entry(document)
            .or_insert_with(|| LeaseEntry::unknown(now_ms));
    }

    pub fn close(&mut self, document: &DocumentId) {
        self.entries.remove(document);
    }

    pub fn is_open(&self, document: &DocumentId) -> bool {
        self.entries.contains_key(document)
    }

    pub fn open_documents(&self) -> Vec<DocumentId> {
        let mut docs: Vec<DocumentId> = self.entries.keys().cloned().collect();
        docs.sort();
        docs
    }

    pub fn is_channel_connected(&self) -> bool {
        self.channel_connected
    }

    /// Apply a push event. Returns `true` if the view of an open document
    /// changed; events for documents that are not open are ignored.
    pub fn apply_push(&mut self, event: &PushEvent, now_ms: u64) -> bool {
        let Some(entry) = self.entries.get_mut(event.document_id()) else {
            tracing::debug!(
                document = %event.document_id(),
                event = event.event_type(),
                "push event for closed document ignored"
            );
            return false;
        };
        match event {
            PushEvent::DocumentLocked { holder, .. }
            | PushEvent::DocumentForceTaken { holder, .. } => {
                entry.set(Some(holder.clone()), LeaseStatus::Known, now_ms)
            }
            PushEvent::DocumentUnlocked { .. } => entry.set(None, LeaseStatus::Known, now_ms),
        }
    }

    /// Apply a poll result: a known snapshot replaces the entry wholesale,
    /// a failed poll marks the status unknown and keeps the last holder
    /// for display.
    pub fn apply_poll(&mut self, document: &DocumentId, outcome: &PollOutcome, now_ms: u64) -> bool {
        let Some(entry) = self.entries.get_mut(document) else {
            return false;
        };
        match outcome {
            PollOutcome::Holder(holder) => entry.set(holder.clone(), LeaseStatus::Known, now_ms),
            PollOutcome::Unknown(reason) => {
                tracing::debug!(%document, %reason, "lease poll failed");
                let holder = entry.holder.clone();
                entry.set(holder, LeaseStatus::Unknown, now_ms)
            }
        }
    }

    /// Record the holder learned from a local acquire, force-take or
    /// release response.
    pub fn record_local(
        &mut self,
        document: &DocumentId,
        holder: Option<Holder>,
        now_ms: u64,
    ) -> bool {
        match self.entries.get_mut(document) {
            Some(entry) => entry.set(holder, LeaseStatus::Known, now_ms),
            None => false,
        }
    }

    /// Drop confidence in the cached view (heartbeat reported `Lost` or
    /// failed). The caller schedules an immediate poll.
    pub fn invalidate(&mut self, document: &DocumentId, now_ms: u64) -> bool {
        match self.entries.get_mut(document) {
            Some(entry) => {
                let holder = entry.holder.clone();
                entry.set(holder, LeaseStatus::Unknown, now_ms)
            }
            None => false,
        }
    }

    pub fn channel_disconnected(&mut self, now_ms: u64) {
        if self.channel_connected || self.disconnected_since_ms.is_none() {
            self.disconnected_since_ms = Some(now_ms);
        }
        self.channel_connected = false;
    }

    /// Mark the channel up. Returns the documents that must be polled
    /// immediately to repair state lost during the gap.
    pub fn channel_reconnected(&mut self, now_ms: u64) -> Vec<DocumentId> {
        let gap = self.disconnected_since_ms.take();
        self.channel_connected = true;
        if let Some(since) = gap {
            tracing::info!(
                gap_ms = now_ms.saturating_sub(since),
                documents = self.entries.len(),
                "push channel reconnected, forcing lease resync"
            );
        }
        self.open_documents()
    }

    pub fn view(&self, document: &DocumentId) -> Option<LeaseView> {
        self.entries.get(document).map(|entry| {
            let mine = entry.holder.as_ref().is_some_and(|h| h.user_id == self.me);
            LeaseView {
                holder: entry.holder.clone(),
                status: entry.status,
                is_held_by_me: mine,
                is_held_by_other: entry.holder.is_some() && !mine,
            }
        })
    }

    pub fn last_updated_ms(&self, document: &DocumentId) -> Option<u64> {
        self.entries.get(document).map(|e| e.updated_at_ms)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn holder(id: &str, name: &str) -> Holder {
        Holder {
            user_id: UserId::from(id),
            display_name: name.to_owned(),
            acquired_at: None,
        }
    }

    fn doc() -> DocumentId {
        DocumentId::from("doc-1")
    }

    fn reconciler() -> LeaseReconciler {
        let mut r = LeaseReconciler::new(UserId::from("me"));
        r.open(doc(), 0);
        r
    }

    #[test]
    fn new_entry_is_unknown() {
        let r = reconciler();
        let view = r.view(&doc()).expect("open");
        assert_eq!(view.status, LeaseStatus::Unknown);
        assert!(!view.is_held_by_me);
        assert!(!view.is_held_by_other);
    }

    #[test]
    fn locked_event_sets_other_holder() {
        let mut r = reconciler();
        let changed = r.apply_push(
            &PushEvent::DocumentLocked {
                document_id: doc(),
                holder: holder("u2", "Bea"),
            },
            10,
        );
        assert!(changed);
        let view = r.view(&doc()).expect("open");
        assert!(view.is_held_by_other);
        assert_eq!(view.holder_name(), Some("Bea"));
        assert_eq!(view.status, LeaseStatus::Known);
    }

    #[test]
    fn force_taken_replaces_holder_unconditionally() {
        let mut r = reconciler();
        r.record_local(&doc(), Some(holder("me", "Me")), 5);
        r.apply_push(
            &PushEvent::DocumentForceTaken {
                document_id: doc(),
                holder: holder("u3", "Cy"),
            },
            10,
        );
        let view = r.view(&doc()).expect("open");
        assert!(!view.is_held_by_me);
        assert_eq!(view.holder_name(), Some("Cy"));
    }

    #[test]
    fn unlocked_clears_holder() {
        let mut r = reconciler();
        r.record_local(&doc(), Some(holder("u2", "Bea")), 5);
        assert!(r.apply_push(&PushEvent::DocumentUnlocked { document_id: doc() }, 6));
        assert!(r.view(&doc()).expect("open").holder.is_none());
    }

    #[test]
    fn repeated_event_reports_no_change() {
        let mut r = reconciler();
        let ev = PushEvent::DocumentLocked {
            document_id: doc(),
            holder: holder("u2", "Bea"),
        };
        assert!(r.apply_push(&ev, 1));
        assert!(!r.apply_push(&ev, 2));
    }

    #[test]
    fn closed_documents_ignore_events() {
        let mut r = LeaseReconciler::new(UserId::from("me"));
        let changed = r.apply_push(
            &PushEvent::DocumentLocked {
                document_id: doc(),
                holder: holder("u2", "Bea"),
            },
            1,
        );
        assert!(!changed);
        assert!(r.view(&doc()).is_none());
    }

    #[test]
    fn poll_replaces_view_wholesale() {
        let mut r = reconciler();
        r.record_local(&doc(), Some(holder("u2", "Bea")), 1);
        r.apply_poll(&doc(), &PollOutcome::Holder(None), 2);
        let view = r.view(&doc()).expect("open");
        assert!(view.holder.is_none());
        assert_eq!(view.status, LeaseStatus::Known);
    }

    #[test]
    fn failed_poll_keeps_holder_but_marks_unknown() {
        let mut r = reconciler();
        r.record_local(&doc(), Some(holder("u2", "Bea")), 1);
        r.apply_poll(&doc(), &PollOutcome::Unknown("timeout".into()), 2);
        let view = r.view(&doc()).expect("open");
        assert_eq!(view.holder_name(), Some("Bea"));
        assert_eq!(view.status, LeaseStatus::Unknown);
    }

    #[test]
    fn invalidate_marks_unknown() {
        let mut r = reconciler();
        r.record_local(&doc(), Some(holder("me", "Me")), 1);
        assert!(r.invalidate(&doc(), 2));
        assert_eq!(r.view(&doc()).expect("open").status, LeaseStatus::Unknown);
    }

    #[test]
    fn reconnect_returns_every_open_document() {
        let mut r = reconciler();
        r.open(DocumentId::from("doc-0"), 0);
        r.channel_reconnected(0);
        r.channel_disconnected(100);
        assert!(!r.is_channel_connected());
        let docs = r.channel_reconnected(200);
        assert!(r.is_channel_connected());
        assert_eq!(docs, vec![DocumentId::from("doc-0"), doc()]);
    }

    #[test]
    fn missed_unlock_repaired_by_poll_after_reconnect() {
        let mut r = reconciler();
        r.apply_push(
            &PushEvent::DocumentLocked {
                document_id: doc(),
                holder: holder("u2", "Bea"),
            },
            1,
        );
        r.channel_disconnected(2);
        // document_unlocked emitted here is lost
        let to_poll = r.channel_reconnected(3);
        assert!(to_poll.contains(&doc()));
        r.apply_poll(&doc(), &PollOutcome::Holder(None), 4);
        assert!(r.view(&doc()).expect("open").holder.is_none());
    }

    #[test]
    fn never_two_holders_after_any_sequence() {
        let mut r = reconciler();
        let events = [
            PushEvent::DocumentLocked {
                document_id: doc(),
                holder: holder("u2", "Bea"),
            },
            PushEvent::DocumentForceTaken {
                document_id: doc(),
                holder: holder("u3", "Cy"),
            },
            PushEvent::DocumentUnlocked { document_id: doc() },
            PushEvent::DocumentLocked {
                document_id: doc(),
                holder: holder("me", "Me"),
            },
        ];
        for (i, ev) in events.iter().enumerate() {
            r.apply_push(ev, i as u64);
            let view = r.view(&doc()).expect("open");
            assert!(!(view.is_held_by_me && view.is_held_by_other));
        }
        assert!(r.view(&doc()).expect("open").is_held_by_me);
    }
}
