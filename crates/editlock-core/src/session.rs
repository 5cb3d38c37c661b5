//! Edit session state machine for one document.
//!
//! Pure and deterministic: inputs arrive through the registry with the
//! current time, every remote call leaves as a [`Command`], and every
//! completion is checked against the session's [`Generation`] before it may
//! touch state. A session is in exactly one [`Phase`]; timers are re-synced
//! from the phase on every transition.

use serde::{Deserialize, Serialize};

use crate::activity::ActivityTracker;
use crate::buffer::{EditBuffer, SaveTicket};
use crate::command::{Command, Completion, InactivityChoice, Intent, LeaveChoice, Prompt};
use crate::config::TimingConfig;
use crate::error::SessionError;
use crate::generation::{Generation, GenerationCounter};
use crate::reconciler::LeaseReconciler;
use crate::scheduler::{TimerKind, TimerPlan, TimerSet};
use crate::types::{
    AcquireOutcome, DocumentId, DocumentSnapshot, ForceTakeOutcome, HeartbeatOutcome, Holder,
    LeaseStatus, Notice, Participant, Role, SaveOutcome,
};

// ─── Phase ───────────────────────────────────────────────────────────

/// Coarse mode exposed to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Viewing,
    Entering,
    Editing,
    Exiting,
}

/// Where a session goes once its lease has been released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AfterExit {
    View,
    Quit,
    Navigate(DocumentId),
}

/// Why the session stopped holding the lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseLoss {
    TakenBy(Holder),
    /// Expired, or lost without a known new holder.
    Lapsed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Viewing,
    Entering { force: bool },
    Editing,
    /// Lease lapsed; a silent re-acquire is in flight. `resume` is the
    /// prompt that was open when it lapsed.
    Reacquiring { resume: Option<Prompt> },
    Prompt(Prompt),
    /// A save is in flight. A loss observed meanwhile is applied after it
    /// completes.
    Saving {
        after: AfterExit,
        lost: Option<LeaseLoss>,
    },
    Exiting { after: AfterExit },
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewing => "viewing",
            Self::Entering { force: false } => "entering",
            Self::Entering { force: true } => "force-taking",
            Self::Editing => "editing",
            Self::Reacquiring { .. } => "reacquiring",
            Self::Prompt(_) => "prompting",
            Self::Saving { .. } => "saving",
            Self::Exiting { .. } => "exiting",
        }
    }

    /// Phases in which the session believes it holds the lease.
    fn holds_lease(&self) -> bool {
        matches!(self, Self::Editing | Self::Prompt(_) | Self::Saving { .. })
    }
}

/// How a session stands in an in-progress quit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitProgress {
    Pending,
    Done,
    Blocked,
}

enum PromptAnswer {
    Save,
    Discard,
    Stay,
}

// ─── Context ─────────────────────────────────────────────────────────

/// Registry-owned state a session reads and updates during one input.
pub(crate) struct SessionCtx<'a> {
    pub config: &'a TimingConfig,
    pub me: &'a Participant,
    pub activity: &'a mut ActivityTracker,
    pub reconciler: &'a mut LeaseReconciler,
    pub now_ms: u64,
}

// ─── Session ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EditSession {
    document: DocumentId,
    phase: Phase,
    buffer: EditBuffer,
    generation: GenerationCounter,
    timers: TimerSet,
    /// A quit arrived while entering; release once the acquire resolves.
    exit_on_grant: bool,
}

impl EditSession {
    pub fn new(document: DocumentId, snapshot: DocumentSnapshot) -> Self {
        Self {
            document,
            phase: Phase::Viewing,
            buffer: EditBuffer::new(snapshot),
            generation: GenerationCounter::new(),
            timers: TimerSet::new(),
            exit_on_grant: false,
        }
    }

    pub fn document(&self) -> &DocumentId {
        &self.document
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn mode(&self) -> Mode {
        match self.phase {
            Phase::Viewing => Mode::Viewing,
            Phase::Entering { .. } => Mode::Entering,
            Phase::Editing | Phase::Reacquiring { .. } | Phase::Prompt(_) | Phase::Saving { .. } => {
                Mode::Editing
            }
            Phase::Exiting { .. } => Mode::Exiting,
        }
    }

    /// Prompt currently shown, including one kept open across a re-acquire.
    pub fn prompt(&self) -> Option<&Prompt> {
        match &self.phase {
            Phase::Prompt(p) => Some(p),
            Phase::Reacquiring { resume } => resume.as_ref(),
            _ => None,
        }
    }

    pub fn buffer(&self) -> &EditBuffer {
        &self.buffer
    }

    pub fn is_dirty(&self) -> bool {
        self.buffer.is_dirty()
    }

    pub fn generation(&self) -> Generation {
        self.generation.current()
    }

    pub fn timers(&self) -> &TimerSet {
        &self.timers
    }

    pub(crate) fn start(&mut self, ctx: &mut SessionCtx<'_>, out: &mut Vec<Command>) {
        self.sync_timers(ctx);
        self.force_poll(ctx, out);
    }

    // ── Intents ────────────────────────────────────────────────────

    pub(crate) fn handle_intent(
        &mut self,
        intent: Intent,
        ctx: &mut SessionCtx<'_>,
        out: &mut Vec<Command>,
    ) -> Result<(), SessionError> {
        let name = intent.as_str();
        match (self.phase.clone(), intent) {
            (Phase::Viewing, Intent::Enter) => {
                let generation = self.generation.bump();
                self.set_phase(Phase::Entering { force: false }, ctx);
                out.push(Command::Acquire {
                    document: self.document.clone(),
                    generation,
                });
            }
            (Phase::Viewing, Intent::ForceTake) => {
                let held_by_other = ctx
                    .reconciler
                    .view(&self.document)
                    .is_some_and(|v| v.is_held_by_other);
                if !held_by_other || ctx.me.role != Role::Elevated {
                    return Err(SessionError::ForceTakeNotAllowed(self.document.clone()));
                }
                let generation = self.generation.bump();
                self.set_phase(Phase::Entering { force: true }, ctx);
                out.push(Command::ForceTake {
                    document: self.document.clone(),
                    generation,
                });
            }
            (Phase::Editing | Phase::Reacquiring { .. } | Phase::Saving { .. }, Intent::Edit(content)) => {
                self.buffer.edit(content);
            }
            (Phase::Editing, Intent::Save) => {
                if self.buffer.is_dirty() {
                    self.begin_save(AfterExit::View, ctx, out);
                } else {
                    self.begin_exit(AfterExit::View, ctx, out);
                }
            }
            (Phase::Editing | Phase::Reacquiring { resume: None }, Intent::Cancel) => {
                if self.buffer.is_dirty() {
                    self.enter_prompt(Prompt::Discard, ctx, out);
                } else {
                    self.begin_exit(AfterExit::View, ctx, out);
                }
            }
            (Phase::Viewing, Intent::Reload(snapshot)) => self.buffer.reset(snapshot),
            (Phase::Editing | Phase::Reacquiring { .. }, Intent::Reload(snapshot)) => {
                self.buffer.rebase(snapshot);
            }
            (Phase::Prompt(prompt), intent) => {
                let answer = Self::prompt_answer(&prompt, &intent).ok_or_else(|| self.invalid(name))?;
                self.answer_prompt(prompt, answer, false, ctx, out)?;
            }
            (Phase::Reacquiring { resume: Some(prompt) }, intent) => {
                let answer = Self::prompt_answer(&prompt, &intent).ok_or_else(|| self.invalid(name))?;
                self.answer_prompt(prompt, answer, true, ctx, out)?;
            }
            _ => return Err(self.invalid(name)),
        }
        Ok(())
    }

    fn prompt_answer(prompt: &Prompt, intent: &Intent) -> Option<PromptAnswer> {
        match (prompt, intent) {
            (Prompt::Discard, Intent::ConfirmDiscard) => Some(PromptAnswer::Discard),
            (Prompt::Discard, Intent::KeepEditing) => Some(PromptAnswer::Stay),
            (Prompt::Inactivity { .. }, Intent::Inactivity(choice)) => Some(match choice {
                InactivityChoice::Save => PromptAnswer::Save,
                InactivityChoice::Discard => PromptAnswer::Discard,
                InactivityChoice::Continue => PromptAnswer::Stay,
            }),
            (Prompt::Quit | Prompt::Navigate { .. }, Intent::Leave(choice)) => Some(match choice {
                LeaveChoice::Save => PromptAnswer::Save,
                LeaveChoice::Discard => PromptAnswer::Discard,
                LeaveChoice::Stay => PromptAnswer::Stay,
            }),
            _ => None,
        }
    }

    fn answer_prompt(
        &mut self,
        prompt: Prompt,
        answer: PromptAnswer,
        reacquiring: bool,
        ctx: &mut SessionCtx<'_>,
        out: &mut Vec<Command>,
    ) -> Result<(), SessionError> {
        let after = match &prompt {
            Prompt::Discard | Prompt::Inactivity { .. } => AfterExit::View,
            Prompt::Quit => AfterExit::Quit,
            Prompt::Navigate { target } => AfterExit::Navigate(target.clone()),
        };
        match answer {
            PromptAnswer::Save => {
                if reacquiring {
                    return Err(self.invalid("save"));
                }
                self.dismiss_prompt(out);
                if self.buffer.is_dirty() {
                    self.begin_save(after, ctx, out);
                } else {
                    self.begin_exit(after, ctx, out);
                }
            }
            PromptAnswer::Discard => {
                self.dismiss_prompt(out);
                self.buffer.discard();
                self.begin_exit(after, ctx, out);
            }
            PromptAnswer::Stay => {
                self.dismiss_prompt(out);
                if matches!(prompt, Prompt::Inactivity { .. }) {
                    ctx.activity.reset(ctx.now_ms);
                }
                let next = if reacquiring {
                    Phase::Reacquiring { resume: None }
                } else {
                    Phase::Editing
                };
                self.set_phase(next, ctx);
            }
        }
        Ok(())
    }

    /// Switch away from this document. Clean sessions release silently,
    /// dirty ones ask first.
    pub(crate) fn navigate(
        &mut self,
        to: DocumentId,
        ctx: &mut SessionCtx<'_>,
        out: &mut Vec<Command>,
    ) -> Result<(), SessionError> {
        match self.phase {
            Phase::Viewing => out.push(Command::Navigate {
                from: self.document.clone(),
                to,
            }),
            Phase::Editing | Phase::Reacquiring { resume: None } => {
                if self.buffer.is_dirty() {
                    self.enter_prompt(Prompt::Navigate { target: to }, ctx, out);
                } else {
                    self.begin_exit(AfterExit::Navigate(to), ctx, out);
                }
            }
            _ => return Err(self.invalid("navigate")),
        }
        Ok(())
    }

    // ── Completions ────────────────────────────────────────────────

    pub(crate) fn handle_completion(
        &mut self,
        completion: Completion,
        ctx: &mut SessionCtx<'_>,
        out: &mut Vec<Command>,
    ) {
        match completion {
            Completion::Acquire {
                generation,
                outcome,
            } => {
                if self.is_current(generation, "acquire") {
                    self.on_acquire(outcome, ctx, out);
                } else if let AcquireOutcome::Acquired(_) = outcome {
                    self.release_stale_grant(generation, out);
                }
            }
            Completion::Release { generation } => {
                if self.is_current(generation, "release") {
                    self.on_release(ctx, out);
                }
            }
            Completion::Heartbeat {
                generation,
                outcome,
            } => {
                if self.is_current(generation, "heartbeat") {
                    self.on_heartbeat(outcome, ctx, out);
                }
            }
            Completion::ForceTake {
                generation,
                outcome,
            } => {
                if self.is_current(generation, "force_take") {
                    self.on_force_take(outcome, ctx, out);
                } else if let ForceTakeOutcome::Taken(_) = outcome {
                    self.release_stale_grant(generation, out);
                }
            }
            Completion::Save {
                generation,
                ticket,
                outcome,
            } => {
                if self.is_current(generation, "save") {
                    self.on_save(ticket, outcome, ctx, out);
                } else if let SaveOutcome::Saved { new_version_token } = outcome {
                    tracing::info!(
                        document = %self.document,
                        new_version_token,
                        "save landed after the session moved on"
                    );
                }
            }
            // Polls are applied to the reconciler by the registry.
            Completion::Poll { .. } => {}
        }
    }

    fn is_current(&self, generation: Generation, what: &'static str) -> bool {
        if self.generation.is_current(generation) {
            return true;
        }
        tracing::debug!(
            document = %self.document,
            %generation,
            current = %self.generation.current(),
            what,
            "dropping stale completion"
        );
        false
    }

    /// A grant for an abandoned attempt still holds the lease at the
    /// authority; give it back unless a newer attempt wants it.
    fn release_stale_grant(&self, generation: Generation, out: &mut Vec<Command>) {
        if self.phase != Phase::Viewing {
            return;
        }
        tracing::info!(document = %self.document, %generation, "releasing lease granted after the attempt was abandoned");
        out.push(Command::Release {
            document: self.document.clone(),
            generation,
        });
    }

    fn on_acquire(&mut self, outcome: AcquireOutcome, ctx: &mut SessionCtx<'_>, out: &mut Vec<Command>) {
        // A 409 naming ourselves means the authority already has us as holder.
        let outcome = match outcome {
            AcquireOutcome::Denied(Some(holder)) if holder.user_id == ctx.me.user_id => {
                AcquireOutcome::Acquired(holder)
            }
            other => other,
        };
        match (self.phase.clone(), outcome) {
            (Phase::Entering { force: false }, AcquireOutcome::Acquired(holder)) => {
                ctx.reconciler
                    .record_local(&self.document, Some(holder), ctx.now_ms);
                tracing::info!(document = %self.document, "edit lease acquired");
                self.editing_or_exit(ctx, out);
            }
            (Phase::Entering { force: false }, AcquireOutcome::Denied(holder)) => {
                let holder_name = holder.as_ref().map(|h| h.display_name.clone());
                if holder.is_some() {
                    ctx.reconciler.record_local(&self.document, holder, ctx.now_ms);
                }
                tracing::info!(document = %self.document, holder = ?holder_name, "edit lease denied");
                self.enter_viewing(ctx);
                self.notify(Notice::AcquireDenied { holder_name }, out);
            }
            (Phase::Entering { force: false }, AcquireOutcome::Unavailable(reason)) => {
                tracing::warn!(document = %self.document, %reason, "acquire failed");
                self.enter_viewing(ctx);
                self.notify(Notice::LeaseStatusUnknown, out);
                self.force_poll(ctx, out);
            }
            (Phase::Reacquiring { resume }, AcquireOutcome::Acquired(holder)) => {
                ctx.reconciler
                    .record_local(&self.document, Some(holder), ctx.now_ms);
                tracing::info!(document = %self.document, "edit lease silently re-acquired");
                let next = match resume {
                    Some(prompt) => Phase::Prompt(prompt),
                    None => Phase::Editing,
                };
                self.set_phase(next, ctx);
            }
            (Phase::Reacquiring { .. }, AcquireOutcome::Denied(Some(holder))) => {
                ctx.reconciler
                    .record_local(&self.document, Some(holder.clone()), ctx.now_ms);
                self.lose_to(holder, ctx, out);
            }
            (Phase::Reacquiring { resume }, outcome) => {
                if let AcquireOutcome::Unavailable(reason) = &outcome {
                    tracing::warn!(document = %self.document, %reason, "re-acquire failed");
                    self.force_poll(ctx, out);
                }
                self.reacquire_failed(resume, ctx, out);
            }
            (phase, outcome) => {
                tracing::debug!(
                    document = %self.document,
                    phase = phase.as_str(),
                    ?outcome,
                    "acquire completion ignored"
                );
            }
        }
    }

    fn on_force_take(
        &mut self,
        outcome: ForceTakeOutcome,
        ctx: &mut SessionCtx<'_>,
        out: &mut Vec<Command>,
    ) {
        if self.phase != (Phase::Entering { force: true }) {
            tracing::debug!(document = %self.document, ?outcome, "force-take completion ignored");
            return;
        }
        match outcome {
            ForceTakeOutcome::Taken(holder) => {
                ctx.reconciler
                    .record_local(&self.document, Some(holder), ctx.now_ms);
                tracing::info!(document = %self.document, "edit lease force-taken");
                self.editing_or_exit(ctx, out);
            }
            ForceTakeOutcome::Denied => {
                self.enter_viewing(ctx);
                self.notify(Notice::ForceTakeDenied, out);
            }
            ForceTakeOutcome::Unavailable(reason) => {
                tracing::warn!(document = %self.document, %reason, "force-take failed");
                self.enter_viewing(ctx);
                self.notify(Notice::LeaseStatusUnknown, out);
                self.force_poll(ctx, out);
            }
        }
    }

    fn on_heartbeat(
        &mut self,
        outcome: HeartbeatOutcome,
        ctx: &mut SessionCtx<'_>,
        out: &mut Vec<Command>,
    ) {
        if !self.phase.holds_lease() {
            tracing::debug!(document = %self.document, ?outcome, "heartbeat completion ignored");
            return;
        }
        match outcome {
            HeartbeatOutcome::Renewed => {
                tracing::debug!(document = %self.document, "lease renewed");
            }
            HeartbeatOutcome::Lost => {
                tracing::info!(document = %self.document, "heartbeat reports lease lost");
                ctx.reconciler.invalidate(&self.document, ctx.now_ms);
                self.force_poll(ctx, out);
                self.lease_lost(LeaseLoss::Lapsed, ctx, out);
            }
            HeartbeatOutcome::Unknown(reason) => {
                tracing::warn!(document = %self.document, %reason, "heartbeat failed; lease status unknown");
                ctx.reconciler.invalidate(&self.document, ctx.now_ms);
                self.force_poll(ctx, out);
            }
        }
    }

    fn on_save(
        &mut self,
        ticket: SaveTicket,
        outcome: SaveOutcome,
        ctx: &mut SessionCtx<'_>,
        out: &mut Vec<Command>,
    ) {
        let Phase::Saving { after, lost } = self.phase.clone() else {
            tracing::debug!(document = %self.document, ?outcome, "save completion ignored");
            return;
        };
        let saved = match outcome {
            SaveOutcome::Saved { new_version_token } => {
                self.buffer.commit_save(ticket, new_version_token);
                tracing::info!(document = %self.document, new_version_token, "document saved");
                self.notify(
                    Notice::Saved {
                        version_token: new_version_token,
                    },
                    out,
                );
                true
            }
            SaveOutcome::VersionConflict => {
                tracing::warn!(
                    document = %self.document,
                    version_token = ticket.version_token,
                    "save rejected: version conflict"
                );
                self.notify(Notice::VersionConflict, out);
                false
            }
            SaveOutcome::TransportError(reason) => {
                tracing::warn!(document = %self.document, %reason, "save failed");
                self.notify(Notice::SaveFailed { reason }, out);
                false
            }
        };
        let finished = saved && !self.buffer.is_dirty();
        match lost {
            Some(LeaseLoss::TakenBy(holder)) => self.lose_to(holder, ctx, out),
            Some(LeaseLoss::Lapsed) if !finished => self.start_reacquire(None, ctx, out),
            _ if finished => self.begin_exit(after, ctx, out),
            _ => self.set_phase(Phase::Editing, ctx),
        }
    }

    fn on_release(&mut self, ctx: &mut SessionCtx<'_>, out: &mut Vec<Command>) {
        let Phase::Exiting { after } = self.phase.clone() else {
            tracing::debug!(document = %self.document, "release completion ignored");
            return;
        };
        if ctx
            .reconciler
            .view(&self.document)
            .is_some_and(|v| v.is_held_by_me)
        {
            ctx.reconciler.record_local(&self.document, None, ctx.now_ms);
        }
        tracing::info!(document = %self.document, "edit session closed");
        self.enter_viewing(ctx);
        if let AfterExit::Navigate(to) = after {
            out.push(Command::Navigate {
                from: self.document.clone(),
                to,
            });
        }
    }

    // ── Lease view ─────────────────────────────────────────────────

    /// React to a change of the reconciled lease view.
    pub(crate) fn on_lease_view(&mut self, ctx: &mut SessionCtx<'_>, out: &mut Vec<Command>) {
        if !self.phase.holds_lease() && !matches!(self.phase, Phase::Reacquiring { .. }) {
            return;
        }
        let Some(view) = ctx.reconciler.view(&self.document) else {
            return;
        };
        if view.is_held_by_other {
            if let Some(holder) = view.holder {
                self.lease_lost(LeaseLoss::TakenBy(holder), ctx, out);
            }
        } else if view.holder.is_none() && view.status == LeaseStatus::Known {
            self.lease_lost(LeaseLoss::Lapsed, ctx, out);
        }
    }

    fn lease_lost(&mut self, loss: LeaseLoss, ctx: &mut SessionCtx<'_>, out: &mut Vec<Command>) {
        match (self.phase.clone(), loss) {
            (Phase::Saving { after, lost }, loss) => {
                let lost = match (lost, loss) {
                    (Some(LeaseLoss::TakenBy(h)), LeaseLoss::Lapsed) => LeaseLoss::TakenBy(h),
                    (_, loss) => loss,
                };
                tracing::info!(document = %self.document, "lease lost during save; applying after it completes");
                self.phase = Phase::Saving {
                    after,
                    lost: Some(lost),
                };
            }
            (Phase::Editing | Phase::Prompt(_) | Phase::Reacquiring { .. }, LeaseLoss::TakenBy(holder)) => {
                self.lose_to(holder, ctx, out);
            }
            (Phase::Editing, LeaseLoss::Lapsed) => self.start_reacquire(None, ctx, out),
            (Phase::Prompt(prompt), LeaseLoss::Lapsed) => {
                self.start_reacquire(Some(prompt), ctx, out);
            }
            _ => {}
        }
    }

    fn start_reacquire(
        &mut self,
        resume: Option<Prompt>,
        ctx: &mut SessionCtx<'_>,
        out: &mut Vec<Command>,
    ) {
        let generation = self.generation.bump();
        tracing::info!(document = %self.document, %generation, "lease lapsed; re-acquiring");
        self.set_phase(Phase::Reacquiring { resume }, ctx);
        out.push(Command::Acquire {
            document: self.document.clone(),
            generation,
        });
    }

    fn reacquire_failed(
        &mut self,
        resume: Option<Prompt>,
        ctx: &mut SessionCtx<'_>,
        out: &mut Vec<Command>,
    ) {
        if self.buffer.is_dirty() {
            match resume {
                Some(prompt) => self.set_phase(Phase::Prompt(prompt), ctx),
                None => {
                    let deadline_ms = ctx.now_ms.saturating_add(ctx.config.inactivity_grace_ms);
                    self.enter_prompt(Prompt::Inactivity { deadline_ms }, ctx, out);
                }
            }
        } else {
            if resume.is_some() {
                self.dismiss_prompt(out);
            }
            self.enter_viewing(ctx);
        }
    }

    fn lose_to(&mut self, holder: Holder, ctx: &mut SessionCtx<'_>, out: &mut Vec<Command>) {
        tracing::info!(
            document = %self.document,
            holder = %holder.display_name,
            "edit lease taken over"
        );
        if self.prompt().is_some() {
            self.dismiss_prompt(out);
        }
        self.enter_viewing(ctx);
        self.notify(
            Notice::TakenOver {
                holder_name: holder.display_name,
            },
            out,
        );
    }

    // ── Timers ─────────────────────────────────────────────────────

    /// Fire every timer due at `ctx.now_ms`.
    pub(crate) fn on_timers(&mut self, ctx: &mut SessionCtx<'_>, out: &mut Vec<Command>) {
        for kind in self.timers.take_due(ctx.now_ms, ctx.config) {
            self.on_timer(kind, ctx, out);
        }
    }

    fn on_timer(&mut self, kind: TimerKind, ctx: &mut SessionCtx<'_>, out: &mut Vec<Command>) {
        let idle = ctx
            .activity
            .is_idle(ctx.now_ms, ctx.config.inactivity_threshold_ms);
        match kind {
            TimerKind::Heartbeat => {
                if !self.phase.holds_lease() {
                    return;
                }
                if idle {
                    tracing::debug!(document = %self.document, "heartbeat suppressed while idle");
                    return;
                }
                out.push(Command::Heartbeat {
                    document: self.document.clone(),
                    generation: self.generation.current(),
                });
            }
            TimerKind::IdleCheck => {
                if self.phase == Phase::Editing && idle {
                    let deadline_ms = ctx.now_ms.saturating_add(ctx.config.inactivity_grace_ms);
                    tracing::info!(document = %self.document, "user idle; prompting");
                    self.enter_prompt(Prompt::Inactivity { deadline_ms }, ctx, out);
                }
            }
            TimerKind::Poll => out.push(Command::Poll {
                document: self.document.clone(),
            }),
            TimerKind::InactivityGrace => {
                if !matches!(self.phase, Phase::Prompt(Prompt::Inactivity { .. })) {
                    return;
                }
                tracing::info!(
                    document = %self.document,
                    dirty = self.buffer.is_dirty(),
                    "inactivity prompt unanswered; auto-resolving"
                );
                self.dismiss_prompt(out);
                if self.buffer.is_dirty() {
                    self.begin_save(AfterExit::View, ctx, out);
                } else {
                    self.begin_exit(AfterExit::View, ctx, out);
                }
            }
        }
    }

    fn timer_plan(&self) -> TimerPlan {
        let poll_only = TimerPlan {
            poll: true,
            ..TimerPlan::NONE
        };
        let grace = |prompt: Option<&Prompt>| match prompt {
            Some(Prompt::Inactivity { deadline_ms }) => Some(*deadline_ms),
            _ => None,
        };
        match &self.phase {
            Phase::Viewing | Phase::Entering { .. } | Phase::Exiting { .. } => poll_only,
            Phase::Editing => TimerPlan {
                heartbeat: true,
                idle_check: true,
                poll: true,
                grace_deadline_ms: None,
            },
            Phase::Reacquiring { resume } => TimerPlan {
                heartbeat: true,
                idle_check: resume.is_none(),
                poll: true,
                grace_deadline_ms: grace(resume.as_ref()),
            },
            Phase::Prompt(prompt) => TimerPlan {
                heartbeat: true,
                idle_check: false,
                poll: true,
                grace_deadline_ms: grace(Some(prompt)),
            },
            Phase::Saving { .. } => TimerPlan {
                heartbeat: true,
                poll: true,
                ..TimerPlan::NONE
            },
        }
    }

    fn sync_timers(&mut self, ctx: &SessionCtx<'_>) {
        let plan = self.timer_plan();
        self.timers.sync(&plan, ctx.now_ms, ctx.config);
    }

    // ── Quit & close ───────────────────────────────────────────────

    /// Start quitting: dirty sessions ask, clean ones release.
    pub(crate) fn request_quit(&mut self, ctx: &mut SessionCtx<'_>, out: &mut Vec<Command>) {
        match self.phase {
            Phase::Reacquiring { .. } if self.buffer.is_dirty() => {
                if self.prompt().is_some() {
                    self.dismiss_prompt(out);
                }
                self.set_phase(
                    Phase::Reacquiring {
                        resume: Some(Prompt::Quit),
                    },
                    ctx,
                );
                out.push(Command::ShowPrompt {
                    document: self.document.clone(),
                    prompt: Prompt::Quit,
                });
            }
            Phase::Editing | Phase::Prompt(_) if self.buffer.is_dirty() => {
                if self.prompt().is_some() {
                    self.dismiss_prompt(out);
                }
                self.enter_prompt(Prompt::Quit, ctx, out);
            }
            Phase::Editing | Phase::Prompt(_) | Phase::Reacquiring { .. } => {
                if self.prompt().is_some() {
                    self.dismiss_prompt(out);
                }
                self.begin_exit(AfterExit::View, ctx, out);
            }
            Phase::Entering { .. } => {
                tracing::info!(document = %self.document, "quit while entering; waiting for the acquire");
                self.exit_on_grant = true;
            }
            // Saving finishes first; its outcome decides.
            Phase::Saving { .. } | Phase::Viewing | Phase::Exiting { .. } => {}
        }
    }

    pub(crate) fn quit_progress(&self) -> QuitProgress {
        match &self.phase {
            Phase::Viewing => QuitProgress::Done,
            Phase::Prompt(Prompt::Quit)
            | Phase::Reacquiring {
                resume: Some(Prompt::Quit),
            }
            | Phase::Saving { .. }
            | Phase::Exiting { .. } => QuitProgress::Pending,
            Phase::Entering { .. } if self.exit_on_grant => QuitProgress::Pending,
            _ => QuitProgress::Blocked,
        }
    }

    /// The quit was blocked elsewhere: close a still-open quit prompt.
    pub(crate) fn abandon_quit(&mut self, ctx: &mut SessionCtx<'_>, out: &mut Vec<Command>) {
        match self.phase {
            Phase::Prompt(Prompt::Quit) => {
                self.dismiss_prompt(out);
                self.set_phase(Phase::Editing, ctx);
            }
            Phase::Reacquiring {
                resume: Some(Prompt::Quit),
            } => {
                self.dismiss_prompt(out);
                self.set_phase(Phase::Reacquiring { resume: None }, ctx);
            }
            Phase::Entering { .. } => self.exit_on_grant = false,
            _ => {}
        }
    }

    /// Tear the session down: best-effort release, every timer disarmed,
    /// every in-flight completion invalidated.
    pub(crate) fn close(&mut self, out: &mut Vec<Command>) {
        if self.prompt().is_some() {
            self.dismiss_prompt(out);
        }
        if self.phase != Phase::Viewing {
            out.push(Command::Release {
                document: self.document.clone(),
                generation: self.generation.current(),
            });
        }
        self.generation.bump();
        self.timers.disarm_all();
        self.phase = Phase::Viewing;
    }

    /// Poll now and restart the fallback poll interval.
    pub(crate) fn force_poll(&mut self, ctx: &SessionCtx<'_>, out: &mut Vec<Command>) {
        out.push(Command::Poll {
            document: self.document.clone(),
        });
        self.timers.restart(TimerKind::Poll, ctx.now_ms, ctx.config);
    }

    // ── Transitions ────────────────────────────────────────────────

    fn set_phase(&mut self, phase: Phase, ctx: &SessionCtx<'_>) {
        tracing::debug!(
            document = %self.document,
            from = self.phase.as_str(),
            to = phase.as_str(),
            "session transition"
        );
        self.phase = phase;
        self.sync_timers(ctx);
    }

    fn enter_viewing(&mut self, ctx: &SessionCtx<'_>) {
        self.exit_on_grant = false;
        self.generation.bump();
        self.buffer.discard();
        self.set_phase(Phase::Viewing, ctx);
    }

    /// Lease granted: edit, or leave at once if a quit is waiting on it.
    fn editing_or_exit(&mut self, ctx: &SessionCtx<'_>, out: &mut Vec<Command>) {
        if std::mem::take(&mut self.exit_on_grant) {
            self.begin_exit(AfterExit::Quit, ctx, out);
        } else {
            self.set_phase(Phase::Editing, ctx);
        }
    }

    fn enter_prompt(&mut self, prompt: Prompt, ctx: &SessionCtx<'_>, out: &mut Vec<Command>) {
        self.set_phase(Phase::Prompt(prompt.clone()), ctx);
        out.push(Command::ShowPrompt {
            document: self.document.clone(),
            prompt,
        });
    }

    fn begin_save(&mut self, after: AfterExit, ctx: &SessionCtx<'_>, out: &mut Vec<Command>) {
        let ticket = self.buffer.begin_save();
        self.set_phase(Phase::Saving { after, lost: None }, ctx);
        out.push(Command::Save {
            document: self.document.clone(),
            generation: self.generation.current(),
            ticket,
        });
    }

    fn begin_exit(&mut self, after: AfterExit, ctx: &SessionCtx<'_>, out: &mut Vec<Command>) {
        self.set_phase(Phase::Exiting { after }, ctx);
        out.push(Command::Release {
            document: self.document.clone(),
            generation: self.generation.current(),
        });
    }

    fn dismiss_prompt(&self, out: &mut Vec<Command>) {
        out.push(Command::DismissPrompt {
            document: self.document.clone(),
        });
    }

    fn notify(&self, notice: Notice, out: &mut Vec<Command>) {
        out.push(Command::Notify {
            document: self.document.clone(),
            notice,
        });
    }

    fn invalid(&self, intent: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            document: self.document.clone(),
            phase: self.phase.as_str(),
            intent,
        }
    }
}
