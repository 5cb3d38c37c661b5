use editlock_core::{
    AcquireOutcome, Command, Completion, DocumentId, DocumentSnapshot, ForceTakeOutcome,
    Generation, HeartbeatOutcome, Holder, InactivityChoice, Input, Intent, LeaveChoice, Mode,
    Notice, Participant, Phase, PollOutcome, Prompt, PushEvent, Role, SaveOutcome, SaveTicket,
    SessionError, SessionRegistry, TimerKind, TimingConfig,
};

// ─── Harness ─────────────────────────────────────────────────────────

struct Harness {
    reg: SessionRegistry,
    now: u64,
}

impl Harness {
    fn new(role: Role) -> Self {
        Self {
            reg: SessionRegistry::new(
                Participant::new("u1", "Ann", role),
                TimingConfig::default(),
                0,
            ),
            now: 0,
        }
    }

    fn open(&mut self, id: &str, content: &str, version: u64) -> Vec<Command> {
        self.reg.open(
            doc(id),
            DocumentSnapshot {
                content: content.into(),
                version_token: version,
            },
            self.now,
        )
    }

    fn input(&mut self, input: Input) -> Vec<Command> {
        self.reg.handle(input, self.now).expect("input accepted")
    }

    fn intent(&mut self, id: &str, intent: Intent) -> Vec<Command> {
        self.input(Input::Intent {
            document: doc(id),
            intent,
        })
    }

    fn complete(&mut self, id: &str, completion: Completion) -> Vec<Command> {
        self.input(Input::Completion {
            document: doc(id),
            completion,
        })
    }

    fn advance_to(&mut self, now: u64) -> Vec<Command> {
        self.now = now;
        self.reg.tick(now)
    }

    fn mode(&self, id: &str) -> Mode {
        self.reg.session(&doc(id)).expect("session open").mode()
    }

    fn phase(&self, id: &str) -> Phase {
        self.reg.session(&doc(id)).expect("session open").phase().clone()
    }

    fn generation(&self, id: &str) -> Generation {
        self.reg.session(&doc(id)).expect("session open").generation()
    }

    /// Open, enter and acquire `id`; returns the acquisition generation.
    fn editing(&mut self, id: &str, content: &str, version: u64) -> Generation {
        self.open(id, content, version);
        let out = self.intent(id, Intent::Enter);
        let generation = acquire_generation(&out);
        self.complete(
            id,
            Completion::Acquire {
                generation,
                outcome: AcquireOutcome::Acquired(ann()),
            },
        );
        assert_eq!(self.mode(id), Mode::Editing);
        generation
    }
}

fn doc(id: &str) -> DocumentId {
    DocumentId::new(id)
}

fn ann() -> Holder {
    Holder {
        user_id: "u1".into(),
        display_name: "Ann".into(),
        acquired_at: None,
    }
}

fn bea() -> Holder {
    Holder {
        user_id: "u2".into(),
        display_name: "Bea".into(),
        acquired_at: None,
    }
}

fn acquire_generation(out: &[Command]) -> Generation {
    out.iter()
        .find_map(|c| match c {
            Command::Acquire { generation, .. } => Some(*generation),
            _ => None,
        })
        .expect("acquire issued")
}

fn save_ticket(out: &[Command]) -> (Generation, SaveTicket) {
    out.iter()
        .find_map(|c| match c {
            Command::Save {
                generation, ticket, ..
            } => Some((*generation, ticket.clone())),
            _ => None,
        })
        .expect("save issued")
}

fn release_generation(out: &[Command], id: &str) -> Generation {
    out.iter()
        .find_map(|c| match c {
            Command::Release {
                document,
                generation,
            } if document.as_str() == id => Some(*generation),
            _ => None,
        })
        .expect("release issued")
}

fn has_release(out: &[Command]) -> bool {
    out.iter().any(|c| matches!(c, Command::Release { .. }))
}

fn notices(out: &[Command]) -> Vec<Notice> {
    out.iter()
        .filter_map(|c| match c {
            Command::Notify { notice, .. } => Some(notice.clone()),
            _ => None,
        })
        .collect()
}

// ─── Scenarios ───────────────────────────────────────────────────────

#[test]
fn scenario_a_acquire_edit_save() {
    let mut h = Harness::new(Role::Member);
    let generation = h.editing("d1", "draft", 5);

    h.intent("d1", Intent::Edit("final".into()));
    let out = h.intent("d1", Intent::Save);
    let (save_gen, ticket) = save_ticket(&out);
    assert_eq!(save_gen, generation);
    assert_eq!(ticket.snapshot, "final");
    assert_eq!(ticket.version_token, 5);

    let out = h.complete(
        "d1",
        Completion::Save {
            generation,
            ticket,
            outcome: SaveOutcome::Saved {
                new_version_token: 6,
            },
        },
    );
    assert_eq!(notices(&out), vec![Notice::Saved { version_token: 6 }]);
    let session = h.reg.session(&doc("d1")).expect("session");
    assert_eq!(session.buffer().baseline(), "final");
    assert_eq!(session.buffer().version_token(), 6);
    assert!(!session.is_dirty());

    let release = release_generation(&out, "d1");
    h.complete("d1", Completion::Release { generation: release });
    assert_eq!(h.mode("d1"), Mode::Viewing);
}

#[test]
fn scenario_b_acquire_denied_names_holder() {
    let mut h = Harness::new(Role::Member);
    h.open("d1", "text", 1);
    let out = h.intent("d1", Intent::Enter);
    let generation = acquire_generation(&out);

    let out = h.complete(
        "d1",
        Completion::Acquire {
            generation,
            outcome: AcquireOutcome::Denied(Some(bea())),
        },
    );
    assert_eq!(
        notices(&out),
        vec![Notice::AcquireDenied {
            holder_name: Some("Bea".into())
        }]
    );
    assert_eq!(h.mode("d1"), Mode::Viewing);
    let view = h.reg.view(&doc("d1")).expect("view");
    assert!(view.is_held_by_other);
    assert_eq!(view.holder_name(), Some("Bea"));
}

#[test]
fn scenario_c_unanswered_inactivity_prompt_autosaves() {
    let mut h = Harness::new(Role::Member);
    let generation = h.editing("d1", "text", 1);
    h.now = 2_000;
    h.intent("d1", Intent::Edit("text + more".into()));

    let out = h.advance_to(302_000);
    assert!(out.contains(&Command::ShowPrompt {
        document: doc("d1"),
        prompt: Prompt::Inactivity {
            deadline_ms: 362_000
        },
    }));
    assert!(
        !out.iter().any(|c| matches!(c, Command::Heartbeat { .. })),
        "heartbeat must be suppressed once idle"
    );

    let out = h.advance_to(362_000);
    assert!(out.contains(&Command::DismissPrompt { document: doc("d1") }));
    let (save_gen, ticket) = save_ticket(&out);
    assert_eq!(save_gen, generation);
    assert_eq!(ticket.snapshot, "text + more");

    let out = h.complete(
        "d1",
        Completion::Save {
            generation,
            ticket,
            outcome: SaveOutcome::Saved {
                new_version_token: 2,
            },
        },
    );
    let release = release_generation(&out, "d1");
    h.complete("d1", Completion::Release { generation: release });
    assert_eq!(h.mode("d1"), Mode::Viewing);
    assert_eq!(
        h.reg.session(&doc("d1")).expect("session").buffer().baseline(),
        "text + more"
    );
}

#[test]
fn unanswered_clean_inactivity_prompt_discards_and_releases() {
    let mut h = Harness::new(Role::Member);
    h.editing("d1", "text", 1);
    h.advance_to(300_000);
    assert!(matches!(h.phase("d1"), Phase::Prompt(Prompt::Inactivity { .. })));

    let out = h.advance_to(360_000);
    assert!(has_release(&out));
    assert!(!out.iter().any(|c| matches!(c, Command::Save { .. })));
    assert_eq!(h.mode("d1"), Mode::Exiting);
}

#[test]
fn scenario_d_force_taken_while_clean_goes_straight_to_viewing() {
    let mut h = Harness::new(Role::Member);
    let generation = h.editing("d1", "text", 1);

    h.now = 5_000;
    let out = h.input(Input::Push(PushEvent::DocumentForceTaken {
        document_id: doc("d1"),
        holder: bea(),
    }));
    assert_eq!(
        notices(&out),
        vec![Notice::TakenOver {
            holder_name: "Bea".into()
        }]
    );
    assert!(!out.iter().any(|c| matches!(c, Command::ShowPrompt { .. })));
    assert!(!has_release(&out), "the lease is no longer ours to release");
    assert_eq!(h.mode("d1"), Mode::Viewing);

    // A heartbeat issued before the takeover must not resurrect the session.
    let out = h.complete(
        "d1",
        Completion::Heartbeat {
            generation,
            outcome: HeartbeatOutcome::Renewed,
        },
    );
    assert!(out.is_empty());
    assert_eq!(h.mode("d1"), Mode::Viewing);
}

#[test]
fn scenario_e_version_conflict_keeps_edits() {
    let mut h = Harness::new(Role::Member);
    let generation = h.editing("d1", "base", 3);
    h.intent("d1", Intent::Edit("mine".into()));
    let out = h.intent("d1", Intent::Save);
    let (_, ticket) = save_ticket(&out);

    let out = h.complete(
        "d1",
        Completion::Save {
            generation,
            ticket,
            outcome: SaveOutcome::VersionConflict,
        },
    );
    assert_eq!(notices(&out), vec![Notice::VersionConflict]);
    assert!(!has_release(&out));
    assert_eq!(h.phase("d1"), Phase::Editing);
    let session = h.reg.session(&doc("d1")).expect("session");
    assert!(session.is_dirty());
    assert_eq!(session.buffer().local(), "mine");
    assert_eq!(session.buffer().baseline(), "base");

    h.intent(
        "d1",
        Intent::Reload(DocumentSnapshot {
            content: "theirs".into(),
            version_token: 4,
        }),
    );
    let session = h.reg.session(&doc("d1")).expect("session");
    assert_eq!(session.buffer().local(), "mine");
    assert_eq!(session.buffer().version_token(), 4);
}

#[test]
fn reconnect_forces_poll_that_repairs_missed_unlock() {
    let mut h = Harness::new(Role::Member);
    h.open("d1", "text", 1);
    h.now = 1_000;
    h.input(Input::Push(PushEvent::DocumentLocked {
        document_id: doc("d1"),
        holder: bea(),
    }));
    h.now = 2_000;
    h.input(Input::ChannelDown);
    assert!(!h.reg.is_channel_connected());

    // Bea releases while the channel is down; the unlock is never delivered.
    h.now = 9_000;
    let out = h.input(Input::ChannelUp);
    assert_eq!(out, vec![Command::Poll { document: doc("d1") }]);
    let poll_deadline = h
        .reg
        .session(&doc("d1"))
        .expect("session")
        .timers()
        .deadline(TimerKind::Poll);
    assert_eq!(poll_deadline, Some(39_000));

    h.now = 9_200;
    h.complete(
        "d1",
        Completion::Poll {
            issued_at_ms: 9_000,
            outcome: PollOutcome::Holder(None),
        },
    );
    let view = h.reg.view(&doc("d1")).expect("view");
    assert!(view.holder.is_none());
    assert!(!view.is_held_by_other);
}

// ─── Concurrency & generations ───────────────────────────────────────

#[test]
fn edit_during_save_keeps_session_dirty() {
    let mut h = Harness::new(Role::Member);
    let generation = h.editing("d1", "a", 1);
    h.intent("d1", Intent::Edit("ab".into()));
    let out = h.intent("d1", Intent::Save);
    let (_, ticket) = save_ticket(&out);
    h.intent("d1", Intent::Edit("abc".into()));

    let out = h.complete(
        "d1",
        Completion::Save {
            generation,
            ticket,
            outcome: SaveOutcome::Saved {
                new_version_token: 2,
            },
        },
    );
    assert!(!has_release(&out));
    assert_eq!(h.phase("d1"), Phase::Editing);
    let session = h.reg.session(&doc("d1")).expect("session");
    assert_eq!(session.buffer().baseline(), "ab");
    assert!(session.is_dirty());
}

#[test]
fn force_take_mid_save_applies_after_save_completes() {
    let mut h = Harness::new(Role::Member);
    let generation = h.editing("d1", "a", 1);
    h.intent("d1", Intent::Edit("ab".into()));
    let out = h.intent("d1", Intent::Save);
    let (_, ticket) = save_ticket(&out);

    let out = h.input(Input::Push(PushEvent::DocumentForceTaken {
        document_id: doc("d1"),
        holder: bea(),
    }));
    assert!(notices(&out).is_empty());
    assert!(matches!(h.phase("d1"), Phase::Saving { .. }));

    let out = h.complete(
        "d1",
        Completion::Save {
            generation,
            ticket,
            outcome: SaveOutcome::Saved {
                new_version_token: 2,
            },
        },
    );
    assert_eq!(
        notices(&out),
        vec![
            Notice::Saved { version_token: 2 },
            Notice::TakenOver {
                holder_name: "Bea".into()
            },
        ]
    );
    assert_eq!(h.mode("d1"), Mode::Viewing);
}

#[test]
fn stale_acquire_after_cancel_is_dropped() {
    let mut h = Harness::new(Role::Member);
    h.open("d1", "text", 1);
    let out = h.intent("d1", Intent::Enter);
    let first = acquire_generation(&out);
    h.complete(
        "d1",
        Completion::Acquire {
            generation: first,
            outcome: AcquireOutcome::Unavailable("timeout".into()),
        },
    );
    assert_eq!(h.mode("d1"), Mode::Viewing);

    let out = h.intent("d1", Intent::Enter);
    let second = acquire_generation(&out);
    assert!(second > first);

    // A late duplicate of the first acquire arrives.
    let out = h.complete(
        "d1",
        Completion::Acquire {
            generation: first,
            outcome: AcquireOutcome::Acquired(ann()),
        },
    );
    assert!(out.is_empty());
    assert_eq!(h.mode("d1"), Mode::Entering);
}

#[test]
fn heartbeat_lost_reacquires_silently() {
    let mut h = Harness::new(Role::Member);
    let generation = h.editing("d1", "text", 1);
    h.intent("d1", Intent::Edit("dirty".into()));

    let out = h.complete(
        "d1",
        Completion::Heartbeat {
            generation,
            outcome: HeartbeatOutcome::Lost,
        },
    );
    assert!(out.contains(&Command::Poll { document: doc("d1") }));
    let retry = acquire_generation(&out);
    assert!(retry > generation);
    assert_eq!(h.phase("d1"), Phase::Reacquiring { resume: None });
    assert_eq!(h.mode("d1"), Mode::Editing);

    h.complete(
        "d1",
        Completion::Acquire {
            generation: retry,
            outcome: AcquireOutcome::Acquired(ann()),
        },
    );
    assert_eq!(h.phase("d1"), Phase::Editing);
    assert!(h.reg.session(&doc("d1")).expect("session").is_dirty());
}

#[test]
fn failed_reacquire_while_dirty_prompts() {
    let mut h = Harness::new(Role::Member);
    let generation = h.editing("d1", "text", 1);
    h.intent("d1", Intent::Edit("dirty".into()));
    let out = h.complete(
        "d1",
        Completion::Heartbeat {
            generation,
            outcome: HeartbeatOutcome::Lost,
        },
    );
    let retry = acquire_generation(&out);

    let out = h.complete(
        "d1",
        Completion::Acquire {
            generation: retry,
            outcome: AcquireOutcome::Denied(None),
        },
    );
    assert!(out.iter().any(|c| matches!(
        c,
        Command::ShowPrompt {
            prompt: Prompt::Inactivity { .. },
            ..
        }
    )));
}

#[test]
fn reacquire_denied_by_other_holder_shows_takeover() {
    let mut h = Harness::new(Role::Member);
    let generation = h.editing("d1", "text", 1);
    let out = h.complete(
        "d1",
        Completion::Heartbeat {
            generation,
            outcome: HeartbeatOutcome::Lost,
        },
    );
    let retry = acquire_generation(&out);
    let out = h.complete(
        "d1",
        Completion::Acquire {
            generation: retry,
            outcome: AcquireOutcome::Denied(Some(bea())),
        },
    );
    assert_eq!(
        notices(&out),
        vec![Notice::TakenOver {
            holder_name: "Bea".into()
        }]
    );
    assert_eq!(h.mode("d1"), Mode::Viewing);
}

// ─── Timers ──────────────────────────────────────────────────────────

#[test]
fn heartbeat_sent_while_active() {
    let mut h = Harness::new(Role::Member);
    let generation = h.editing("d1", "text", 1);
    let out = h.advance_to(60_000);
    assert!(out.contains(&Command::Heartbeat {
        document: doc("d1"),
        generation,
    }));
}

#[test]
fn timers_torn_down_on_every_exit_path() {
    let mut h = Harness::new(Role::Member);

    // Cancel while clean.
    let generation = h.editing("d1", "text", 1);
    let armed = h.reg.session(&doc("d1")).expect("session").timers().armed();
    assert_eq!(
        armed,
        vec![TimerKind::Heartbeat, TimerKind::IdleCheck, TimerKind::Poll]
    );
    h.intent("d1", Intent::Cancel);
    h.complete("d1", Completion::Release { generation });
    let armed = h.reg.session(&doc("d1")).expect("session").timers().armed();
    assert_eq!(armed, vec![TimerKind::Poll]);

    // Taken over.
    h.editing("d2", "text", 1);
    h.input(Input::Push(PushEvent::DocumentLocked {
        document_id: doc("d2"),
        holder: bea(),
    }));
    let armed = h.reg.session(&doc("d2")).expect("session").timers().armed();
    assert_eq!(armed, vec![TimerKind::Poll]);

    // Closed.
    h.editing("d3", "text", 1);
    let out = h.reg.close(&doc("d3"), h.now);
    assert!(has_release(&out));
    assert!(h.reg.session(&doc("d3")).is_none());
    h.reg.close(&doc("d1"), h.now);
    h.reg.close(&doc("d2"), h.now);
    assert_eq!(h.reg.next_deadline(), None);
}

#[test]
fn continue_resets_idle_clock() {
    let mut h = Harness::new(Role::Member);
    h.editing("d1", "text", 1);
    h.advance_to(300_000);
    assert!(matches!(h.phase("d1"), Phase::Prompt(Prompt::Inactivity { .. })));

    let out = h.intent("d1", Intent::Inactivity(InactivityChoice::Continue));
    assert!(out.contains(&Command::DismissPrompt { document: doc("d1") }));
    assert_eq!(h.phase("d1"), Phase::Editing);
    assert_eq!(h.reg.activity().last_activity_ms(), 300_000);
    assert!(
        !h.reg
            .session(&doc("d1"))
            .expect("session")
            .timers()
            .is_armed(TimerKind::InactivityGrace)
    );
}

// ─── Prompts, navigation, quit ───────────────────────────────────────

#[test]
fn cancel_dirty_asks_before_discarding() {
    let mut h = Harness::new(Role::Member);
    let generation = h.editing("d1", "text", 1);
    h.intent("d1", Intent::Edit("changed".into()));

    let out = h.intent("d1", Intent::Cancel);
    assert_eq!(
        out,
        vec![Command::ShowPrompt {
            document: doc("d1"),
            prompt: Prompt::Discard,
        }]
    );
    h.intent("d1", Intent::KeepEditing);
    assert_eq!(h.phase("d1"), Phase::Editing);
    assert!(h.reg.session(&doc("d1")).expect("session").is_dirty());

    h.intent("d1", Intent::Cancel);
    let out = h.intent("d1", Intent::ConfirmDiscard);
    assert_eq!(release_generation(&out, "d1"), generation);
    let session = h.reg.session(&doc("d1")).expect("session");
    assert_eq!(session.buffer().local(), "text");
}

#[test]
fn save_rejected_while_viewing() {
    let mut h = Harness::new(Role::Member);
    h.open("d1", "text", 1);
    let err = h
        .reg
        .handle(
            Input::Intent {
                document: doc("d1"),
                intent: Intent::Save,
            },
            0,
        )
        .expect_err("save needs the lease");
    assert!(matches!(err, SessionError::InvalidTransition { .. }));
}

#[test]
fn navigate_clean_releases_then_switches() {
    let mut h = Harness::new(Role::Member);
    let generation = h.editing("d1", "text", 1);
    let out = h.input(Input::Navigate {
        from: doc("d1"),
        to: doc("d2"),
    });
    assert_eq!(release_generation(&out, "d1"), generation);

    let out = h.complete("d1", Completion::Release { generation });
    assert_eq!(
        out,
        vec![Command::Navigate {
            from: doc("d1"),
            to: doc("d2"),
        }]
    );
}

#[test]
fn navigate_dirty_prompts_and_saves_first() {
    let mut h = Harness::new(Role::Member);
    let generation = h.editing("d1", "text", 1);
    h.intent("d1", Intent::Edit("changed".into()));
    let out = h.input(Input::Navigate {
        from: doc("d1"),
        to: doc("d2"),
    });
    assert!(out.contains(&Command::ShowPrompt {
        document: doc("d1"),
        prompt: Prompt::Navigate { target: doc("d2") },
    }));

    let out = h.intent("d1", Intent::Leave(LeaveChoice::Save));
    let (_, ticket) = save_ticket(&out);
    let out = h.complete(
        "d1",
        Completion::Save {
            generation,
            ticket,
            outcome: SaveOutcome::Saved {
                new_version_token: 2,
            },
        },
    );
    assert!(has_release(&out));
    let out = h.complete("d1", Completion::Release { generation });
    assert!(out.contains(&Command::Navigate {
        from: doc("d1"),
        to: doc("d2"),
    }));
}

#[test]
fn quit_waits_for_dirty_sessions_and_releases_clean_ones() {
    let mut h = Harness::new(Role::Member);
    let g1 = h.editing("d1", "clean", 1);
    let g2 = h.editing("d2", "text", 1);
    h.intent("d2", Intent::Edit("dirty".into()));

    let out = h.input(Input::QuitRequested);
    assert_eq!(release_generation(&out, "d1"), g1);
    assert!(out.contains(&Command::ShowPrompt {
        document: doc("d2"),
        prompt: Prompt::Quit,
    }));
    assert!(!out.contains(&Command::AllowQuit));

    let out = h.complete("d1", Completion::Release { generation: g1 });
    assert!(!out.contains(&Command::AllowQuit));

    let out = h.intent("d2", Intent::Leave(LeaveChoice::Discard));
    assert_eq!(release_generation(&out, "d2"), g2);
    // Release failures still complete, so quitting never hangs on them.
    let out = h.complete("d2", Completion::Release { generation: g2 });
    assert!(out.contains(&Command::AllowQuit));
    assert!(!h.reg.is_quitting());
}

#[test]
fn staying_at_quit_prompt_blocks_quit() {
    let mut h = Harness::new(Role::Member);
    h.editing("d1", "text", 1);
    h.intent("d1", Intent::Edit("dirty".into()));
    h.input(Input::QuitRequested);

    let out = h.intent("d1", Intent::Leave(LeaveChoice::Stay));
    assert!(notices(&out).contains(&Notice::QuitBlocked));
    assert!(!out.contains(&Command::AllowQuit));
    assert_eq!(h.phase("d1"), Phase::Editing);
    assert!(!h.reg.is_quitting());
}

#[test]
fn failed_save_during_quit_blocks_quit() {
    let mut h = Harness::new(Role::Member);
    let generation = h.editing("d1", "text", 1);
    h.intent("d1", Intent::Edit("dirty".into()));
    h.input(Input::QuitRequested);
    let out = h.intent("d1", Intent::Leave(LeaveChoice::Save));
    let (_, ticket) = save_ticket(&out);

    let out = h.complete(
        "d1",
        Completion::Save {
            generation,
            ticket,
            outcome: SaveOutcome::TransportError("503".into()),
        },
    );
    let notices = notices(&out);
    assert!(notices.contains(&Notice::SaveFailed {
        reason: "503".into()
    }));
    assert!(notices.contains(&Notice::QuitBlocked));
    assert!(h.reg.session(&doc("d1")).expect("session").is_dirty());
}

#[test]
fn quit_while_entering_releases_once_granted() {
    let mut h = Harness::new(Role::Member);
    h.open("d1", "text", 1);
    let out = h.intent("d1", Intent::Enter);
    let generation = acquire_generation(&out);

    let out = h.input(Input::QuitRequested);
    assert!(!has_release(&out));
    assert!(!out.contains(&Command::AllowQuit));
    assert_eq!(h.mode("d1"), Mode::Entering);

    let out = h.complete(
        "d1",
        Completion::Acquire {
            generation,
            outcome: AcquireOutcome::Acquired(ann()),
        },
    );
    assert_eq!(release_generation(&out, "d1"), generation);
    assert!(!out.contains(&Command::AllowQuit));

    let out = h.complete("d1", Completion::Release { generation });
    assert!(out.contains(&Command::AllowQuit));
    assert_eq!(h.mode("d1"), Mode::Viewing);
}

#[test]
fn quit_while_entering_allows_once_denied() {
    let mut h = Harness::new(Role::Member);
    h.open("d1", "text", 1);
    let generation = acquire_generation(&h.intent("d1", Intent::Enter));
    h.input(Input::QuitRequested);

    let out = h.complete(
        "d1",
        Completion::Acquire {
            generation,
            outcome: AcquireOutcome::Denied(Some(bea())),
        },
    );
    assert!(!has_release(&out));
    assert!(out.contains(&Command::AllowQuit));
}

#[test]
fn grant_after_close_is_released() {
    let mut h = Harness::new(Role::Member);
    h.open("d1", "text", 1);
    let generation = acquire_generation(&h.intent("d1", Intent::Enter));
    h.reg.close(&doc("d1"), h.now);

    let out = h.complete(
        "d1",
        Completion::Acquire {
            generation,
            outcome: AcquireOutcome::Acquired(ann()),
        },
    );
    assert_eq!(
        out,
        vec![Command::Release {
            document: doc("d1"),
            generation,
        }]
    );

    // Refusals for a closed document need no follow-up.
    let out = h.complete(
        "d1",
        Completion::Acquire {
            generation,
            outcome: AcquireOutcome::Denied(Some(bea())),
        },
    );
    assert!(out.is_empty());
}

#[test]
fn quit_over_discard_prompt_dismisses_it_first() {
    let mut h = Harness::new(Role::Member);
    h.editing("d1", "text", 1);
    h.intent("d1", Intent::Edit("dirty".into()));
    let out = h.intent("d1", Intent::Cancel);
    assert!(out.contains(&Command::ShowPrompt {
        document: doc("d1"),
        prompt: Prompt::Discard,
    }));

    let out = h.input(Input::QuitRequested);
    let dismissed = out
        .iter()
        .position(|c| *c == Command::DismissPrompt { document: doc("d1") })
        .expect("discard prompt dismissed");
    let shown = out
        .iter()
        .position(|c| {
            *c == Command::ShowPrompt {
                document: doc("d1"),
                prompt: Prompt::Quit,
            }
        })
        .expect("quit prompt shown");
    assert!(dismissed < shown);
    assert_eq!(h.phase("d1"), Phase::Prompt(Prompt::Quit));
}

// ─── Force-take ──────────────────────────────────────────────────────

fn held_by_bea(h: &mut Harness) {
    h.open("d1", "text", 1);
    h.input(Input::Push(PushEvent::DocumentLocked {
        document_id: doc("d1"),
        holder: bea(),
    }));
}

#[test]
fn force_take_requires_elevated_role() {
    let mut h = Harness::new(Role::Member);
    held_by_bea(&mut h);
    let err = h
        .reg
        .handle(
            Input::Intent {
                document: doc("d1"),
                intent: Intent::ForceTake,
            },
            0,
        )
        .expect_err("member cannot force-take");
    assert_eq!(err, SessionError::ForceTakeNotAllowed(doc("d1")));
}

#[test]
fn force_take_requires_another_holder() {
    let mut h = Harness::new(Role::Elevated);
    h.open("d1", "text", 1);
    let err = h
        .reg
        .handle(
            Input::Intent {
                document: doc("d1"),
                intent: Intent::ForceTake,
            },
            0,
        )
        .expect_err("nothing to take");
    assert_eq!(err, SessionError::ForceTakeNotAllowed(doc("d1")));
}

#[test]
fn elevated_force_take_enters_editing() {
    let mut h = Harness::new(Role::Elevated);
    held_by_bea(&mut h);
    let out = h.intent("d1", Intent::ForceTake);
    let generation = h.generation("d1");
    assert!(out.contains(&Command::ForceTake {
        document: doc("d1"),
        generation,
    }));

    h.complete(
        "d1",
        Completion::ForceTake {
            generation,
            outcome: ForceTakeOutcome::Taken(ann()),
        },
    );
    assert_eq!(h.mode("d1"), Mode::Editing);
    let view = h.reg.view(&doc("d1")).expect("view");
    assert!(view.is_held_by_me);
}
