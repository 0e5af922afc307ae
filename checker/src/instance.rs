//! A checker instance: one configured checker bound to a host.
//!
//! All mutable state (run token, armed timer, diagnostic collection) lives in
//! an actor task and is touched only while handling one command at a time.
//! Timers, checker processes, and document lookups run in their own tasks and
//! report back through the command channel, so their results are always
//! checked against the current run token before anything is written.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use url::Url;

use crate::host::{DiagnosticCollection, DocumentEvent, Host, TextDocument};
use crate::placement::{self, Target};
use crate::runner::ProcessRunner;
use crate::scheduler::{RunScheduler, TimerSeq};
use crate::types::{
    CheckerConfig, CheckerEvent, Diagnostic, DiagnosticsByFile, RawDiagnostic, RunToken,
};

const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Work for the actor. Disposal is not an input: it ends the run loop.
enum Input {
    Trigger(Arc<dyn TextDocument>),
    TimerElapsed {
        seq: TimerSeq,
        document: Arc<dyn TextDocument>,
    },
    RunFinished {
        token: RunToken,
        document: Arc<dyn TextDocument>,
        output: DiagnosticsByFile,
    },
    RunFailed {
        token: RunToken,
        error: String,
    },
    /// The run task itself died; logged, never shown to the user.
    RunAborted {
        token: RunToken,
    },
    FilePlaced {
        token: RunToken,
        uri: Url,
        diagnostics: Vec<Diagnostic>,
    },
}

enum Command {
    Input(Input),
    Dispose(oneshot::Sender<()>),
}

impl From<Input> for Command {
    fn from(input: Input) -> Self {
        Command::Input(input)
    }
}

/// Handle to a running checker instance.
///
/// Dropping the handle unsubscribes from document events; the actor then
/// tears itself down once in-flight work has drained. Prefer
/// [`CheckerInstance::dispose`], which waits for the teardown.
pub struct CheckerInstance {
    config: Arc<CheckerConfig>,
    commands: mpsc::Sender<Command>,
    listener: JoinHandle<()>,
}

impl CheckerInstance {
    /// Spawn the actor and subscribe to the host's document events.
    ///
    /// Must be called from within a tokio runtime. If the host already has an
    /// eligible active document, a run is scheduled for it right away.
    pub fn start<H: Host>(
        config: CheckerConfig,
        delay: Duration,
        host: Arc<H>,
        events: mpsc::Sender<CheckerEvent>,
    ) -> Self {
        let config = Arc::new(config);
        let (commands, receiver) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        let actor = Actor {
            name: config.display_name().to_string(),
            config: Arc::clone(&config),
            delay,
            collection: host.create_collection(config.display_name()),
            host: Arc::clone(&host),
            scheduler: RunScheduler::new(),
            timer: None,
            commands: commands.downgrade(),
            events,
        };
        tokio::spawn(actor.run(receiver));

        let listener = tokio::spawn(listen(
            host.subscribe(),
            Arc::clone(&config),
            commands.downgrade(),
        ));

        if let Some(document) = host.active_document()
            && config.handles(document.language_id())
            && commands.try_send(Input::Trigger(document).into()).is_err()
        {
            tracing::warn!(checker = %config.display_name(), "Could not schedule initial run");
        }

        Self {
            config,
            commands,
            listener,
        }
    }

    #[must_use]
    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.config.display_name()
    }

    /// Schedule a debounced run for `document` if its language is handled.
    pub async fn trigger(&self, document: Arc<dyn TextDocument>) {
        if !self.config.handles(document.language_id()) {
            return;
        }
        if self.commands.send(Input::Trigger(document).into()).await.is_err() {
            tracing::debug!(checker = %self.name(), "Trigger after teardown ignored");
        }
    }

    /// Unsubscribe, invalidate any in-flight run, and dispose the collection.
    ///
    /// Returns once the actor has finished tearing down; nothing is written to
    /// the collection afterwards.
    pub async fn dispose(self) {
        self.listener.abort();
        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Command::Dispose(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

impl Drop for CheckerInstance {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Forward eligible document events to the actor.
async fn listen(
    mut events: broadcast::Receiver<DocumentEvent>,
    config: Arc<CheckerConfig>,
    commands: mpsc::WeakSender<Command>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let document = event.document();
                if !config.handles(document.language_id()) {
                    continue;
                }
                let Some(tx) = commands.upgrade() else { break };
                if tx
                    .send(Input::Trigger(Arc::clone(document)).into())
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(
                    checker = %config.display_name(),
                    skipped,
                    "Document event listener lagged"
                );
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

struct Actor<H: Host> {
    name: String,
    config: Arc<CheckerConfig>,
    delay: Duration,
    host: Arc<H>,
    collection: Arc<dyn DiagnosticCollection>,
    scheduler: RunScheduler,
    timer: Option<JoinHandle<()>>,
    /// Weak so that the actor alone never keeps its own channel open.
    commands: mpsc::WeakSender<Command>,
    events: mpsc::Sender<CheckerEvent>,
}

impl<H: Host> Actor<H> {
    async fn run(mut self, mut receiver: mpsc::Receiver<Command>) {
        while let Some(command) = receiver.recv().await {
            match command {
                Command::Input(input) => self.handle(input),
                Command::Dispose(done) => {
                    self.teardown();
                    let _ = done.send(());
                    return;
                }
            }
        }
        self.teardown();
    }

    fn handle(&mut self, input: Input) {
        match input {
            Input::Trigger(document) => self.arm(document),
            Input::TimerElapsed { seq, document } => self.start_run(seq, document),
            Input::RunFinished {
                token,
                document,
                output,
            } => self.place_all(token, &document, output),
            Input::RunFailed { token, error } => self.run_failed(token, error),
            Input::RunAborted { token } => {
                self.scheduler.abandon(token);
                self.emit(CheckerEvent::RunFailed {
                    checker: self.name.clone(),
                    token,
                    error: "run task aborted".to_string(),
                });
            }
            Input::FilePlaced {
                token,
                uri,
                diagnostics,
            } => self.publish(token, &uri, diagnostics),
        }
    }

    /// (Re)arm the debounce timer; the previous timer, if any, is cancelled.
    fn arm(&mut self, document: Arc<dyn TextDocument>) {
        let Some(seq) = self.scheduler.arm() else {
            return;
        };
        if let Some(previous) = self.timer.take() {
            previous.abort();
        }
        let commands = self.commands.clone();
        let delay = self.delay;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(Input::TimerElapsed { seq, document }.into()).await;
            }
        }));
    }

    fn start_run(&mut self, seq: TimerSeq, document: Arc<dyn TextDocument>) {
        let Some(token) = self.scheduler.fire(seq) else {
            tracing::trace!(checker = %self.name, "Superseded timer ignored");
            return;
        };
        self.timer = None;
        self.collection.clear();

        let text = document.text();
        tracing::debug!(
            checker = %self.name,
            %token,
            uri = %document.uri(),
            "Starting checker run"
        );
        self.emit(CheckerEvent::RunStarted {
            checker: self.name.clone(),
            token,
            uri: document.uri().clone(),
        });

        let config = Arc::clone(&self.config);
        let host = Arc::clone(&self.host);
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let job = tokio::spawn(async move {
                ProcessRunner::new(&config, host.workspace_root())
                    .run(&text)
                    .await
            });
            let command = match job.await {
                Ok(Ok(output)) => Input::RunFinished {
                    token,
                    document,
                    output,
                },
                Ok(Err(error)) => Input::RunFailed {
                    token,
                    error: error.to_string(),
                },
                Err(join_error) => {
                    tracing::error!(%token, "Checker run task failed: {join_error}");
                    Input::RunAborted { token }
                }
            };
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(command.into()).await;
            }
        });
    }

    fn run_failed(&mut self, token: RunToken, error: String) {
        self.scheduler.abandon(token);
        tracing::warn!(checker = %self.name, %token, "Checker run failed: {error}");
        self.host
            .show_warning(&format!("Checker {} received error: {error}", self.name));
        self.emit(CheckerEvent::RunFailed {
            checker: self.name.clone(),
            token,
            error,
        });
    }

    /// Fan a finished run's output out to one placement task per file.
    fn place_all(
        &mut self,
        token: RunToken,
        document: &Arc<dyn TextDocument>,
        output: DiagnosticsByFile,
    ) {
        if !self.scheduler.is_current(token) {
            tracing::debug!(checker = %self.name, %token, "Discarding stale checker output");
            self.emit(CheckerEvent::RunDiscarded {
                checker: self.name.clone(),
                token,
            });
            return;
        }

        if self.scheduler.expect_files(token, output.file_count()) {
            self.settled(token);
            return;
        }

        for (path, raw) in output {
            match placement::resolve_target(&path, document.uri(), self.host.workspace_root()) {
                Ok(target) => self.spawn_placement(token, target, raw),
                Err(e) => {
                    tracing::warn!(checker = %self.name, "Skipping diagnostics: {e}");
                    if self.scheduler.file_done(token) {
                        self.settled(token);
                    }
                }
            }
        }
    }

    fn spawn_placement(&self, token: RunToken, target: Target, raw: Vec<RawDiagnostic>) {
        let host = Arc::clone(&self.host);
        let source = self.name.clone();
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let document = match host.open_document(&target.uri).await {
                Ok(document) => Some(document),
                Err(e) => {
                    tracing::debug!("Publishing point diagnostics: {e}");
                    None
                }
            };
            let diagnostics = placement::place(&raw, &source, &target, document.as_deref());
            if let Some(tx) = commands.upgrade() {
                let _ = tx
                    .send(
                        Input::FilePlaced {
                            token,
                            uri: target.uri,
                            diagnostics,
                        }
                        .into(),
                    )
                    .await;
            }
        });
    }

    /// Write one file's diagnostics, unless the run was superseded meanwhile.
    fn publish(&mut self, token: RunToken, uri: &Url, diagnostics: Vec<Diagnostic>) {
        if !self.scheduler.is_current(token) {
            tracing::trace!(checker = %self.name, %token, %uri, "Dropping superseded placement");
            return;
        }
        let count = diagnostics.len();
        self.collection.set(uri, diagnostics);
        self.emit(CheckerEvent::Published {
            checker: self.name.clone(),
            uri: uri.clone(),
            count,
        });
        if self.scheduler.file_done(token) {
            self.settled(token);
        }
    }

    fn settled(&self, token: RunToken) {
        tracing::debug!(checker = %self.name, %token, "Checker run settled");
        self.emit(CheckerEvent::RunSettled {
            checker: self.name.clone(),
            token,
        });
    }

    fn teardown(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.scheduler.dispose();
        self.collection.dispose();
        tracing::debug!(checker = %self.name, "Checker instance disposed");
    }

    fn emit(&self, event: CheckerEvent) {
        if self.events.try_send(event).is_err() {
            tracing::trace!(checker = %self.name, "Checker event dropped");
        }
    }
}
