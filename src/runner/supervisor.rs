//! The supervisor side: spawn one worker, route its messages, and settle the
//! result from its exit message.

use std::sync::Arc;

use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use super::error::{RunnerError, RunnerResult};
use super::launch::{rewrite_debug_args, InnerConfiguration, WorkerLaunch};
use super::spawner::{ProcessSpawner, SpawnedWorker, WorkerSpawner};
use crate::codec::{deserialize_value, SerializedValue};
use crate::config::{DebugSettings, Settings};
use crate::logger::{HostSession, ScopedLoggerManager};
use crate::protocol::{
    CommunicationManager, Direction, Envelope, EnvelopeReader, LifecycleMessage, ManagerList,
    Outbox, ProtocolError, ProtocolResult, EXIT_KIND,
};
use crate::terminal::{Terminal, TerminalSink, TerminalSinkManager};

/// How a launched worker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Succeeded,
    /// The task reported an error.
    TaskFailed,
    /// The worker ended without an exit message.
    Crashed,
    /// Processing stopped on a protocol violation.
    ProtocolViolation,
    /// The worker could not be started or observed.
    Failed,
}

impl ExitOutcome {
    fn of(result: &RunnerResult<()>) -> Self {
        match result {
            Ok(()) => Self::Succeeded,
            Err(RunnerError::Task(_)) => Self::TaskFailed,
            Err(RunnerError::ExitedBeforeExitMessage { .. }) => Self::Crashed,
            Err(RunnerError::Protocol(_)) => Self::ProtocolViolation,
            Err(_) => Self::Failed,
        }
    }
}

/// Lifecycle of a [`RunnerSupervisor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Spawned,
    Exited(ExitOutcome),
}

/// Enforces the exit-message rules on the worker's stream.
#[derive(Debug, Default)]
pub struct ExitTracker {
    exit: Option<SerializedValue>,
    protocol_violation: bool,
}

impl ExitTracker {
    /// Inspect one envelope from the worker.
    ///
    /// Returns the envelope when it should be dispatched, or `None` for the
    /// exit message. A second exit message, or anything after the exit
    /// message, is a protocol violation.
    pub fn observe(&mut self, envelope: Envelope) -> ProtocolResult<Option<Envelope>> {
        if envelope.is(EXIT_KIND) {
            if self.exit.is_some() {
                return Err(ProtocolError::DuplicateExit);
            }
            let LifecycleMessage::Exit {
                error,
                protocol_violation,
            } = envelope.decode()?;
            self.exit = Some(error);
            self.protocol_violation = protocol_violation;
            return Ok(None);
        }
        if self.exit.is_some() {
            return Err(ProtocolError::MessageAfterExit(envelope.kind().to_string()));
        }
        Ok(Some(envelope))
    }

    pub fn has_exited(&self) -> bool {
        self.exit.is_some()
    }

    /// Result of the run once the worker has terminated with `code`.
    pub fn settle(&self, code: Option<i32>) -> RunnerResult<()> {
        match &self.exit {
            None => Err(RunnerError::ExitedBeforeExitMessage { code }),
            Some(value) if self.protocol_violation => Err(RunnerError::Protocol(
                ProtocolError::WorkerAborted(deserialize_value(value).into_task_error()),
            )),
            Some(SerializedValue::Undefined | SerializedValue::Null) => Ok(()),
            Some(value) => Err(RunnerError::Task(deserialize_value(value).into_task_error())),
        }
    }
}

/// Runs one task in a worker and waits for its result.
///
/// # Example
///
/// ```ignore
/// let spawner = Arc::new(ProcessSpawner::new("ferry-worker"));
/// let mut runner = RunnerSupervisor::new(spawner, Arc::new(StdioSink::new()), Some(session));
/// runner.launch("compile", &CompileConfig { target: "lib".into() }).await?;
/// ```
pub struct RunnerSupervisor {
    id: Uuid,
    spawner: Arc<dyn WorkerSpawner>,
    root_sink: Arc<dyn TerminalSink>,
    sinks: Arc<TerminalSinkManager>,
    managers: ManagerList,
    runtime_args: Vec<String>,
    debug_flags: Vec<String>,
    state: RunnerState,
}

impl RunnerSupervisor {
    /// A runner with the terminal-sink and scoped-logger managers.
    ///
    /// Without a `session`, every logger request is answered with an error.
    pub fn new(
        spawner: Arc<dyn WorkerSpawner>,
        root_sink: Arc<dyn TerminalSink>,
        session: Option<Arc<dyn HostSession>>,
    ) -> Self {
        let sinks = Arc::new(TerminalSinkManager::new());
        let loggers = Arc::new(ScopedLoggerManager::new(Arc::clone(&sinks), session));
        let mut managers = ManagerList::new();
        managers.push(sinks.clone());
        managers.push(loggers);
        Self {
            id: Uuid::new_v4(),
            spawner,
            root_sink,
            sinks,
            managers,
            runtime_args: Vec::new(),
            debug_flags: DebugSettings::default().flags,
            state: RunnerState::Idle,
        }
    }

    /// A runner spawning the worker binary found through `settings`.
    pub fn from_settings(
        settings: &Settings,
        root_sink: Arc<dyn TerminalSink>,
        session: Option<Arc<dyn HostSession>>,
    ) -> RunnerResult<Self> {
        let spawner = ProcessSpawner::from_settings(settings)?;
        let runner = Self::new(Arc::new(spawner), root_sink, session)
            .with_runtime_args(settings.worker_args()?)
            .with_debug_flags(settings.debug.flags.clone());
        Ok(runner)
    }

    /// Arguments passed to the worker ahead of the launch arguments.
    pub fn with_runtime_args(mut self, args: Vec<String>) -> Self {
        self.runtime_args = args;
        self
    }

    /// Runtime flags that open a debugger port; each gets a fresh port.
    pub fn with_debug_flags(mut self, flags: Vec<String>) -> Self {
        self.debug_flags = flags;
        self
    }

    /// Register an additional manager before launch.
    ///
    /// Managers are consulted in registration order after the built-in ones.
    pub fn register_manager(
        &mut self,
        manager: Arc<dyn CommunicationManager>,
    ) -> RunnerResult<()> {
        if self.state != RunnerState::Idle {
            return Err(RunnerError::AlreadyLaunched);
        }
        self.managers.register(manager)?;
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn sinks(&self) -> &Arc<TerminalSinkManager> {
        &self.sinks
    }

    /// Run `task` in a new worker and wait for it to finish.
    ///
    /// Resolves once the worker has exited and its exit message has been
    /// processed. A runner launches at most once.
    ///
    /// # Errors
    ///
    /// - [`RunnerError::Task`] with the task's own error.
    /// - [`RunnerError::ExitedBeforeExitMessage`] if the worker crashed.
    /// - [`RunnerError::Protocol`] if the worker broke the protocol; the
    ///   worker is killed.
    pub async fn launch<C>(&mut self, task: &str, config: &C) -> RunnerResult<()>
    where
        C: Serialize + ?Sized,
    {
        if self.state != RunnerState::Idle {
            return Err(RunnerError::AlreadyLaunched);
        }
        let config = serde_json::to_value(config).map_err(RunnerError::InvalidConfiguration)?;

        let span = tracing::info_span!("runner", id = %self.id, task = %task);
        let result = self.start(task, config).instrument(span).await;
        self.state = RunnerState::Exited(ExitOutcome::of(&result));
        result
    }

    async fn start(&mut self, task: &str, config: serde_json::Value) -> RunnerResult<()> {
        let root_sink_id = self.sinks.register_sink(Arc::clone(&self.root_sink));
        let inner = InnerConfiguration::new(root_sink_id, self.root_sink.capabilities());

        let (runtime_args, debug_port) =
            rewrite_debug_args(&self.runtime_args, &self.debug_flags)?;
        if let Some(port) = debug_port {
            Terminal::new(Arc::clone(&self.root_sink))
                .write_line(&format!("Worker with debugger bound to port {}", port));
        }

        let launch = WorkerLaunch {
            task: task.to_string(),
            inner,
            config,
            runtime_args,
        };
        let worker = self.spawner.spawn(&launch).await?;
        self.state = RunnerState::Spawned;
        tracing::info!("worker spawned");

        self.supervise(worker).await
    }

    async fn supervise(&self, worker: SpawnedWorker) -> RunnerResult<()> {
        let SpawnedWorker {
            reader,
            writer,
            mut process,
        } = worker;
        let (outbox, writer_task) = Outbox::spawn_writer(writer);
        self.managers.attach(&outbox);

        let mut frames = EnvelopeReader::new(reader, "worker");
        let mut tracker = ExitTracker::default();

        if let Err(err) = self.route(&mut frames, &mut tracker, &outbox).await {
            tracing::error!(error = %err, "stopping worker after protocol violation");
            outbox.close();
            writer_task.abort();
            process.kill();
            let _ = process.wait().await;
            return Err(err.into());
        }

        let code = process.wait().await?;
        outbox.close();
        match code {
            Some(0) => tracing::info!(exit_received = tracker.has_exited(), "worker exited"),
            code => tracing::warn!(
                code = ?code,
                exit_received = tracker.has_exited(),
                "worker exited abnormally"
            ),
        }
        tracker.settle(code)
    }

    /// Dispatch worker envelopes until the worker closes its output.
    async fn route<R>(
        &self,
        frames: &mut EnvelopeReader<R>,
        tracker: &mut ExitTracker,
        outbox: &Outbox,
    ) -> ProtocolResult<()>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        while let Some(envelope) = frames.next_envelope().await? {
            match tracker.observe(envelope)? {
                Some(envelope) => self.managers.dispatch(Direction::FromWorker, envelope)?,
                // Nothing more is sent once the worker has reported.
                None => outbox.close(),
            }
        }
        Ok(())
    }
}
