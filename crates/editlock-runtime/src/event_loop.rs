//! Edit event loop: owns the session registry and executes its commands.
//!
//! Every remote command runs as its own task and reports back through one
//! channel, so the registry is only ever touched from this loop. Timers are
//! driven by sleeping until the registry's next deadline.

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use editlock_client::{LeaseClient, LockTransport, PushChannel, PushSignal, SaveCoordinator, TransportError};
use editlock_core::{
    Command, Completion, DocumentId, DocumentSnapshot, Input, Intent, LeaveChoice, Participant,
    Prompt, SessionRegistry, TimingConfig,
};

use crate::cli::EditOpts;
use crate::console::{self, ConsoleCommand};

/// Time allowed for in-flight releases when exiting.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Run an interactive edit session until the user quits.
pub async fn run_edit(opts: EditOpts) -> anyhow::Result<()> {
    let config = opts.timing.to_config();
    config.validate()?;
    let transport = opts.server.transport()?;
    let me = opts.identity.participant();
    tracing::info!(user = %me.user_id, role = %me.role, document = %opts.document, "edit session starting");

    let mut event_loop = EventLoop::new(me, config, transport, DocumentId::new(opts.document));
    if let Some(url) = opts.push_url {
        event_loop.attach_push(url, opts.server.token.clone());
    }
    event_loop.run().await
}

pub(crate) fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

// ─── Events ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) enum FetchPurpose {
    /// Open the fetched document, closing `from` first.
    Open { from: Option<DocumentId> },
    Reload,
}

#[derive(Debug)]
pub(crate) enum LoopEvent {
    Completion {
        document: DocumentId,
        completion: Completion,
    },
    Fetched {
        document: DocumentId,
        purpose: FetchPurpose,
        result: Result<DocumentSnapshot, TransportError>,
    },
    Line(String),
    Eof,
    Signal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Exit,
}

// ─── Loop ────────────────────────────────────────────────────────────

pub(crate) struct EventLoop<T> {
    registry: SessionRegistry,
    lease: Arc<LeaseClient<T>>,
    save: Arc<SaveCoordinator<T>>,
    /// Document the console is focused on.
    current: DocumentId,
    tx: mpsc::UnboundedSender<LoopEvent>,
    rx: mpsc::UnboundedReceiver<LoopEvent>,
    tasks: JoinSet<()>,
    push: Option<PushHandle>,
    signals: u32,
}

struct PushHandle {
    rx: mpsc::UnboundedReceiver<PushSignal>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl<T: LockTransport + Clone + 'static> EventLoop<T> {
    pub(crate) fn new(
        me: Participant,
        config: TimingConfig,
        transport: T,
        document: DocumentId,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            registry: SessionRegistry::new(me.clone(), config, now_ms()),
            lease: Arc::new(LeaseClient::new(transport.clone(), me)),
            save: Arc::new(SaveCoordinator::new(transport)),
            current: document,
            tx,
            rx,
            tasks: JoinSet::new(),
            push: None,
            signals: 0,
        }
    }

    pub(crate) fn attach_push(&mut self, url: String, token: Option<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let mut channel = PushChannel::new(url, tx, cancel.clone());
        if let Some(token) = token {
            channel = channel.with_token(token);
        }
        let task = tokio::spawn(async move { channel.run().await });
        self.push = Some(PushHandle { rx, cancel, task });
    }

    pub(crate) async fn run(mut self) -> anyhow::Result<()> {
        self.open_initial().await?;
        spawn_stdin_reader(self.tx.clone());
        spawn_signal_listener(self.tx.clone());
        println!("{}", console::HELP);

        loop {
            let deadline = self.registry.next_deadline();
            let flow = tokio::select! {
                Some(event) = self.rx.recv() => self.on_event(event),
                signal = recv_push(self.push.as_mut()) => match signal {
                    Some(signal) => self.on_push(signal),
                    None => {
                        tracing::warn!("push channel stopped; relying on polling");
                        self.push = None;
                        Flow::Continue
                    }
                },
                () = sleep_until_deadline(deadline) => {
                    let commands = self.registry.tick(now_ms());
                    self.execute(commands)
                }
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("command task failed: {e}");
                    }
                    Flow::Continue
                }
            };
            if flow == Flow::Exit {
                break;
            }
        }

        self.finish().await;
        Ok(())
    }

    async fn open_initial(&mut self) -> anyhow::Result<()> {
        let document = self.current.clone();
        let snapshot = self.save.fetch(&document).await?;
        println!("[{document}] opened at version {}", snapshot.version_token);
        let commands = self.registry.open(document, snapshot, now_ms());
        self.execute(commands);
        Ok(())
    }

    /// Release everything still held and wait briefly for the calls.
    async fn finish(&mut self) {
        let now = now_ms();
        let documents: Vec<DocumentId> = self.registry.documents().cloned().collect();
        for document in documents {
            let commands = self.registry.close(&document, now);
            self.execute(commands);
        }
        if let Some(push) = self.push.take() {
            push.cancel.cancel();
            let _ = tokio::time::timeout(SHUTDOWN_GRACE, push.task).await;
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, self.drain()).await.is_err() {
            tracing::warn!("in-flight requests abandoned at exit");
        }
        tracing::info!("edit session stopped");
    }

    /// Wait for in-flight calls. Their completions still reach the registry
    /// so a grant that lands after close is released.
    async fn drain(&mut self) {
        loop {
            while let Ok(event) = self.rx.try_recv() {
                self.on_closing_event(event);
            }
            if self.tasks.is_empty() {
                break;
            }
            tokio::select! {
                Some(event) = self.rx.recv() => self.on_closing_event(event),
                Some(joined) = self.tasks.join_next() => {
                    if let Err(e) = joined {
                        tracing::error!("command task failed: {e}");
                    }
                }
            }
        }
    }

    fn on_closing_event(&mut self, event: LoopEvent) {
        let LoopEvent::Completion {
            document,
            completion,
        } = event
        else {
            return;
        };
        match self.registry.handle(Input::Completion { document, completion }, now_ms()) {
            Ok(commands) => {
                self.execute(commands);
            }
            Err(e) => tracing::debug!("completion at exit rejected: {e}"),
        }
    }

    // ─── Event handling ──────────────────────────────────────────────

    pub(crate) fn on_event(&mut self, event: LoopEvent) -> Flow {
        match event {
            LoopEvent::Completion {
                document,
                completion,
            } => self.apply(Input::Completion {
                document,
                completion,
            }),
            LoopEvent::Fetched {
                document,
                purpose,
                result,
            } => self.on_fetched(document, purpose, result),
            LoopEvent::Line(line) => self.on_line(&line),
            LoopEvent::Eof => self.on_eof(),
            LoopEvent::Signal => {
                self.signals += 1;
                if self.signals > 1 {
                    tracing::warn!("second interrupt; exiting without waiting for saves");
                    return Flow::Exit;
                }
                println!("quit requested; interrupt again to exit immediately");
                self.apply(Input::QuitRequested)
            }
        }
    }

    fn on_push(&mut self, signal: PushSignal) -> Flow {
        let input = match signal {
            PushSignal::Connected => Input::ChannelUp,
            PushSignal::Disconnected => Input::ChannelDown,
            PushSignal::Event(event) => Input::Push(event),
        };
        self.apply(input)
    }

    fn on_line(&mut self, line: &str) -> Flow {
        if line.trim().is_empty() {
            return Flow::Continue;
        }
        let command = match console::parse_line(line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                return Flow::Continue;
            }
        };
        self.apply(Input::Activity);

        let current = self.current.clone();
        match command {
            ConsoleCommand::Help => {
                println!("{}", console::HELP);
                Flow::Continue
            }
            ConsoleCommand::Status => {
                if let Some(session) = self.registry.session(&current) {
                    let view = self.registry.view(&current);
                    println!("{}", console::render_status(session, view.as_ref()));
                }
                Flow::Continue
            }
            ConsoleCommand::Quit => self.apply(Input::QuitRequested),
            ConsoleCommand::Reload => {
                self.spawn_fetch(current, FetchPurpose::Reload);
                Flow::Continue
            }
            ConsoleCommand::Switch(to) if to == current => {
                println!("[{to}] already open");
                Flow::Continue
            }
            ConsoleCommand::Switch(to) => self.apply(Input::Navigate { from: current, to }),
            command => {
                let Some(session) = self.registry.session(&current) else {
                    return Flow::Continue;
                };
                let intent =
                    console::to_intent(&command, session.prompt(), session.buffer().local());
                match intent {
                    Some(intent) => self.apply(Input::Intent {
                        document: current,
                        intent,
                    }),
                    None => Flow::Continue,
                }
            }
        }
    }

    /// Stdin closed: quit, saving anything a quit prompt would ask about.
    fn on_eof(&mut self) -> Flow {
        tracing::info!("stdin closed; quitting");
        if self.apply(Input::QuitRequested) == Flow::Exit {
            return Flow::Exit;
        }
        let prompted: Vec<DocumentId> = self
            .registry
            .documents()
            .filter(|d| {
                self.registry
                    .session(d)
                    .is_some_and(|s| s.prompt() == Some(&Prompt::Quit))
            })
            .cloned()
            .collect();
        for document in prompted {
            let flow = self.apply(Input::Intent {
                document,
                intent: Intent::Leave(LeaveChoice::Save),
            });
            if flow == Flow::Exit {
                return flow;
            }
        }
        Flow::Continue
    }

    fn on_fetched(
        &mut self,
        document: DocumentId,
        purpose: FetchPurpose,
        result: Result<DocumentSnapshot, TransportError>,
    ) -> Flow {
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(%document, "fetch failed: {e}");
                println!("[{document}] could not load document: {e}");
                return Flow::Continue;
            }
        };
        match purpose {
            FetchPurpose::Open { from } => {
                let now = now_ms();
                if let Some(from) = from {
                    let commands = self.registry.close(&from, now);
                    if self.execute(commands) == Flow::Exit {
                        return Flow::Exit;
                    }
                }
                println!("[{document}] opened at version {}", snapshot.version_token);
                let commands = self.registry.open(document.clone(), snapshot, now);
                self.current = document;
                self.execute(commands)
            }
            FetchPurpose::Reload => self.apply(Input::Intent {
                document,
                intent: Intent::Reload(snapshot),
            }),
        }
    }

    /// Feed one input to the registry and execute what it emits.
    fn apply(&mut self, input: Input) -> Flow {
        let before = self.current_phase();
        let flow = match self.registry.handle(input, now_ms()) {
            Ok(commands) => self.execute(commands),
            Err(e) => {
                tracing::debug!("input rejected: {e}");
                println!("{e}");
                Flow::Continue
            }
        };
        let after = self.current_phase();
        if after != before {
            if let Some(phase) = after {
                println!("[{}] {phase}", self.current);
            }
        }
        flow
    }

    fn current_phase(&self) -> Option<&'static str> {
        self.registry
            .session(&self.current)
            .map(|s| s.phase().as_str())
    }

    // ─── Command execution ───────────────────────────────────────────

    pub(crate) fn execute(&mut self, commands: Vec<Command>) -> Flow {
        let mut flow = Flow::Continue;
        for command in commands {
            tracing::debug!(?command, "executing");
            match command {
                Command::Acquire {
                    document,
                    generation,
                } => {
                    let lease = Arc::clone(&self.lease);
                    self.spawn(document, move |document| async move {
                        let outcome = lease.acquire(&document).await;
                        Completion::Acquire {
                            generation,
                            outcome,
                        }
                    });
                }
                Command::Release {
                    document,
                    generation,
                } => {
                    let lease = Arc::clone(&self.lease);
                    self.spawn(document, move |document| async move {
                        lease.release(&document).await;
                        Completion::Release { generation }
                    });
                }
                Command::Heartbeat {
                    document,
                    generation,
                } => {
                    let lease = Arc::clone(&self.lease);
                    self.spawn(document, move |document| async move {
                        let outcome = lease.heartbeat(&document).await;
                        Completion::Heartbeat {
                            generation,
                            outcome,
                        }
                    });
                }
                Command::ForceTake {
                    document,
                    generation,
                } => {
                    let lease = Arc::clone(&self.lease);
                    self.spawn(document, move |document| async move {
                        let outcome = lease.force_take(&document).await;
                        Completion::ForceTake {
                            generation,
                            outcome,
                        }
                    });
                }
                Command::Save {
                    document,
                    generation,
                    ticket,
                } => {
                    let save = Arc::clone(&self.save);
                    self.spawn(document, move |document| async move {
                        let outcome = save.save(&document, &ticket).await;
                        Completion::Save {
                            generation,
                            ticket,
                            outcome,
                        }
                    });
                }
                Command::Poll { document } => {
                    let lease = Arc::clone(&self.lease);
                    let issued_at_ms = now_ms();
                    self.spawn(document, move |document| async move {
                        let outcome = lease.status(&document).await;
                        Completion::Poll {
                            issued_at_ms,
                            outcome,
                        }
                    });
                }
                Command::Notify { document, notice } => println!("[{document}] {notice}"),
                Command::ShowPrompt { document, prompt } => {
                    println!("{}", console::render_prompt(&document, &prompt));
                }
                Command::DismissPrompt { document } => {
                    tracing::debug!(%document, "prompt dismissed");
                }
                Command::Navigate { from, to } => {
                    self.spawn_fetch(to, FetchPurpose::Open { from: Some(from) });
                }
                Command::AllowQuit => flow = Flow::Exit,
            }
        }
        flow
    }

    fn spawn<F, Fut>(&mut self, document: DocumentId, task: F)
    where
        F: FnOnce(DocumentId) -> Fut,
        Fut: Future<Output = Completion> + Send + 'static,
    {
        let tx = self.tx.clone();
        let fut = task(document.clone());
        self.tasks.spawn(async move {
            let completion = fut.await;
            let _ = tx.send(LoopEvent::Completion {
                document,
                completion,
            });
        });
    }

    fn spawn_fetch(&mut self, document: DocumentId, purpose: FetchPurpose) {
        let save = Arc::clone(&self.save);
        let tx = self.tx.clone();
        self.tasks.spawn(async move {
            let result = save.fetch(&document).await;
            let _ = tx.send(LoopEvent::Fetched {
                document,
                purpose,
                result,
            });
        });
    }
}

// ─── Sources ─────────────────────────────────────────────────────────

async fn recv_push(push: Option<&mut PushHandle>) -> Option<PushSignal> {
    match push {
        Some(push) => push.rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline_ms: Option<u64>) {
    match deadline_ms {
        Some(at) => tokio::time::sleep(Duration::from_millis(at.saturating_sub(now_ms()))).await,
        None => std::future::pending().await,
    }
}

/// Stdin is read on a plain thread; a blocking read would otherwise hold
/// up runtime shutdown.
fn spawn_stdin_reader(tx: mpsc::UnboundedSender<LoopEvent>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(LoopEvent::Line(line)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!("stdin read failed: {e}");
                    break;
                }
            }
        }
        let _ = tx.send(LoopEvent::Eof);
    });
}

fn spawn_signal_listener(tx: mpsc::UnboundedSender<LoopEvent>) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = shutdown_signal().await {
                tracing::warn!("signal handler unavailable: {e}");
                return;
            }
            if tx.send(LoopEvent::Signal).is_err() {
                return;
            }
        }
    });
}

/// Wait for ctrl-c or SIGTERM.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("received ctrl-c");
            }
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("received ctrl-c");
    }
    Ok(())
}
