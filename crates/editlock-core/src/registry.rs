//! Session registry: the single owner of all per-document edit sessions.
//!
//! Holds the state shared across sessions (activity tracker, lease
//! reconciler, timing) and routes every [`Input`] to the session it
//! concerns. Quit is coordinated here because it spans every open document.

use std::collections::{BTreeMap, BTreeSet};

use crate::activity::ActivityTracker;
use crate::command::{Command, Completion, Input};
use crate::config::TimingConfig;
use crate::error::SessionError;
use crate::reconciler::{LeaseReconciler, LeaseView};
use crate::session::{EditSession, QuitProgress, SessionCtx};
use crate::types::{
    AcquireOutcome, DocumentId, DocumentSnapshot, ForceTakeOutcome, Notice, Participant,
    PollOutcome,
};

#[derive(Debug)]
pub struct SessionRegistry {
    me: Participant,
    config: TimingConfig,
    activity: ActivityTracker,
    reconciler: LeaseReconciler,
    sessions: BTreeMap<DocumentId, EditSession>,
    /// Documents an in-progress quit is still waiting on.
    quit: Option<BTreeSet<DocumentId>>,
}

impl SessionRegistry {
    pub fn new(me: Participant, config: TimingConfig, now_ms: u64) -> Self {
        let reconciler = LeaseReconciler::new(me.user_id.clone());
        Self {
            me,
            config,
            activity: ActivityTracker::new(now_ms),
            reconciler,
            sessions: BTreeMap::new(),
            quit: None,
        }
    }

    pub fn participant(&self) -> &Participant {
        &self.me
    }

    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    pub fn activity(&self) -> &ActivityTracker {
        &self.activity
    }

    pub fn session(&self, document: &DocumentId) -> Option<&EditSession> {
        self.sessions.get(document)
    }

    pub fn view(&self, document: &DocumentId) -> Option<LeaseView> {
        self.reconciler.view(document)
    }

    pub fn documents(&self) -> impl Iterator<Item = &DocumentId> {
        self.sessions.keys()
    }

    pub fn is_channel_connected(&self) -> bool {
        self.reconciler.is_channel_connected()
    }

    pub fn is_quitting(&self) -> bool {
        self.quit.is_some()
    }

    /// Earliest armed timer across all sessions.
    pub fn next_deadline(&self) -> Option<u64> {
        self.sessions
            .values()
            .filter_map(|s| s.timers().next_deadline())
            .min()
    }

    // ─── Lifecycle ───────────────────────────────────────────────────

    /// Open `document` in viewing mode and poll its lease.
    pub fn open(
        &mut self,
        document: DocumentId,
        snapshot: DocumentSnapshot,
        now_ms: u64,
    ) -> Vec<Command> {
        let mut out = Vec::new();
        if self.sessions.contains_key(&document) {
            tracing::debug!(%document, "document already open");
            return out;
        }
        self.reconciler.open(document.clone(), now_ms);
        let mut session = EditSession::new(document.clone(), snapshot);
        let mut ctx = SessionCtx {
            config: &self.config,
            me: &self.me,
            activity: &mut self.activity,
            reconciler: &mut self.reconciler,
            now_ms,
        };
        session.start(&mut ctx, &mut out);
        tracing::info!(%document, "document opened");
        self.sessions.insert(document, session);
        out
    }

    /// Close `document`, releasing its lease best-effort.
    pub fn close(&mut self, document: &DocumentId, now_ms: u64) -> Vec<Command> {
        let mut out = Vec::new();
        if let Some(mut session) = self.sessions.remove(document) {
            session.close(&mut out);
            self.reconciler.close(document);
            tracing::info!(%document, "document closed");
        }
        self.settle_quit(now_ms, &mut out);
        out
    }

    // ─── Inputs ──────────────────────────────────────────────────────

    pub fn handle(&mut self, input: Input, now_ms: u64) -> Result<Vec<Command>, SessionError> {
        let mut out = Vec::new();
        match input {
            Input::Intent { document, intent } => {
                self.activity.record(now_ms);
                let (session, mut ctx) = self
                    .split(&document, now_ms)
                    .ok_or_else(|| SessionError::UnknownDocument(document.clone()))?;
                session.handle_intent(intent, &mut ctx, &mut out)?;
            }
            Input::Completion {
                document,
                completion,
            } => match completion {
                Completion::Poll {
                    issued_at_ms,
                    outcome,
                } => self.apply_poll(&document, issued_at_ms, &outcome, now_ms, &mut out),
                completion => match self.split(&document, now_ms) {
                    Some((session, mut ctx)) => {
                        session.handle_completion(completion, &mut ctx, &mut out);
                    }
                    None => match completion {
                        Completion::Acquire {
                            generation,
                            outcome: AcquireOutcome::Acquired(_),
                        }
                        | Completion::ForceTake {
                            generation,
                            outcome: ForceTakeOutcome::Taken(_),
                        } => {
                            tracing::info!(%document, "lease granted after close; releasing");
                            out.push(Command::Release {
                                document,
                                generation,
                            });
                        }
                        completion => {
                            tracing::debug!(%document, ?completion, "completion for closed document");
                        }
                    },
                },
            },
            Input::Push(event) => {
                let document = event.document_id().clone();
                tracing::debug!(%document, event = event.event_type(), "push event");
                if self.reconciler.apply_push(&event, now_ms) {
                    self.lease_changed(&document, now_ms, &mut out);
                }
            }
            Input::ChannelDown => {
                tracing::warn!("push channel disconnected; relying on polling");
                self.reconciler.channel_disconnected(now_ms);
            }
            Input::ChannelUp => {
                for document in self.reconciler.channel_reconnected(now_ms) {
                    if let Some((session, ctx)) = self.split(&document, now_ms) {
                        session.force_poll(&ctx, &mut out);
                    }
                }
            }
            Input::Activity => self.activity.record(now_ms),
            Input::Navigate { from, to } => {
                self.activity.record(now_ms);
                let (session, mut ctx) = self
                    .split(&from, now_ms)
                    .ok_or_else(|| SessionError::UnknownDocument(from.clone()))?;
                session.navigate(to, &mut ctx, &mut out)?;
            }
            Input::QuitRequested => self.begin_quit(now_ms, &mut out),
        }
        self.settle_quit(now_ms, &mut out);
        Ok(out)
    }

    /// Start an app quit. Same as handling [`Input::QuitRequested`].
    pub fn request_quit(&mut self, now_ms: u64) -> Vec<Command> {
        let mut out = Vec::new();
        self.begin_quit(now_ms, &mut out);
        self.settle_quit(now_ms, &mut out);
        out
    }

    /// Fire every timer due at `now_ms`.
    pub fn tick(&mut self, now_ms: u64) -> Vec<Command> {
        let mut out = Vec::new();
        for session in self.sessions.values_mut() {
            let mut ctx = SessionCtx {
                config: &self.config,
                me: &self.me,
                activity: &mut self.activity,
                reconciler: &mut self.reconciler,
                now_ms,
            };
            session.on_timers(&mut ctx, &mut out);
        }
        self.settle_quit(now_ms, &mut out);
        out
    }

    // ─── Internals ───────────────────────────────────────────────────

    fn split(
        &mut self,
        document: &DocumentId,
        now_ms: u64,
    ) -> Option<(&mut EditSession, SessionCtx<'_>)> {
        let session = self.sessions.get_mut(document)?;
        let ctx = SessionCtx {
            config: &self.config,
            me: &self.me,
            activity: &mut self.activity,
            reconciler: &mut self.reconciler,
            now_ms,
        };
        Some((session, ctx))
    }

    /// Polls are stamped with the lease state's "as of" time, so a poll
    /// issued before fresher information arrived is dropped.
    fn apply_poll(
        &mut self,
        document: &DocumentId,
        issued_at_ms: u64,
        outcome: &PollOutcome,
        now_ms: u64,
        out: &mut Vec<Command>,
    ) {
        if self
            .reconciler
            .last_updated_ms(document)
            .is_some_and(|updated| issued_at_ms < updated)
        {
            tracing::debug!(%document, issued_at_ms, "dropping overtaken poll result");
            return;
        }
        if self.reconciler.apply_poll(document, outcome, issued_at_ms) {
            self.lease_changed(document, now_ms, out);
        }
    }

    fn lease_changed(&mut self, document: &DocumentId, now_ms: u64, out: &mut Vec<Command>) {
        if let Some((session, mut ctx)) = self.split(document, now_ms) {
            session.on_lease_view(&mut ctx, out);
        }
    }

    fn begin_quit(&mut self, now_ms: u64, out: &mut Vec<Command>) {
        if self.quit.is_some() {
            tracing::debug!("quit already in progress");
            return;
        }
        tracing::info!(documents = self.sessions.len(), "quit requested");
        let mut waiting = BTreeSet::new();
        for (document, session) in self.sessions.iter_mut() {
            let mut ctx = SessionCtx {
                config: &self.config,
                me: &self.me,
                activity: &mut self.activity,
                reconciler: &mut self.reconciler,
                now_ms,
            };
            session.request_quit(&mut ctx, out);
            if session.quit_progress() != QuitProgress::Done {
                waiting.insert(document.clone());
            }
        }
        self.quit = Some(waiting);
    }

    /// Allow the quit once every waited-on session is viewing (or closed);
    /// cancel it as soon as one of them returns to plain editing.
    fn settle_quit(&mut self, now_ms: u64, out: &mut Vec<Command>) {
        let Some(waiting) = self.quit.as_mut() else {
            return;
        };
        let mut blocker = None;
        waiting.retain(|document| {
            match self.sessions.get(document).map(EditSession::quit_progress) {
                None | Some(QuitProgress::Done) => false,
                Some(QuitProgress::Pending) => true,
                Some(QuitProgress::Blocked) => {
                    blocker.get_or_insert_with(|| document.clone());
                    true
                }
            }
        });

        if let Some(document) = blocker {
            tracing::info!(%document, "quit cancelled; document still has unsaved edits");
            let waiting = self.quit.take().unwrap_or_default();
            for other in waiting {
                if let Some((session, mut ctx)) = self.split(&other, now_ms) {
                    session.abandon_quit(&mut ctx, out);
                }
            }
            out.push(Command::Notify {
                document,
                notice: Notice::QuitBlocked,
            });
        } else if waiting.is_empty() {
            self.quit = None;
            tracing::info!("all sessions settled; quit allowed");
            out.push(Command::AllowQuit);
        }
    }
}
