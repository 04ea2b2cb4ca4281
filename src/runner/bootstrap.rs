//! The worker side: parse launch arguments, build the task, run it, and
//! report the result with exactly one exit message.

use std::any::Any;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};

use super::error::BootstrapError;
use super::launch::LaunchArgs;
use super::task::{TaskRegistry, WorkerContext};
use crate::codec::{SerializedValue, TaskError};
use crate::logger::ScopedLoggerManager;
use crate::protocol::{
    ChannelError, CommunicationManager, Direction, Envelope, EnvelopeReader, LifecycleMessage,
    ManagerList, Outbox, ProtocolError, ProtocolResult,
};
use crate::terminal::{Terminal, TerminalSinkManager};

/// Exit status after the exit message was delivered.
pub const EXIT_REPORTED: u8 = 0;

/// Exit status after a bootstrap or protocol failure.
pub const EXIT_FAILURE: u8 = 1;

/// Exit status when the exit message itself could not be delivered.
pub const EXIT_CHANNEL_FAILURE: u8 = 2;

/// Grace period for the runtime to stop once the task has finished.
///
/// The stdin reader may be parked in a blocking read that never returns.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// Communication managers of one worker.
pub struct WorkerEndpoint {
    sinks: Arc<TerminalSinkManager>,
    loggers: Arc<ScopedLoggerManager>,
    managers: ManagerList,
}

impl WorkerEndpoint {
    /// An endpoint with the terminal-sink and scoped-logger managers.
    pub fn new() -> Self {
        let sinks = Arc::new(TerminalSinkManager::new());
        let loggers = Arc::new(ScopedLoggerManager::new(Arc::clone(&sinks), None));
        let mut managers = ManagerList::new();
        managers.push(sinks.clone());
        managers.push(loggers.clone());
        Self {
            sinks,
            loggers,
            managers,
        }
    }

    /// Register an additional manager; it sees only envelopes the
    /// built-in managers do not claim.
    pub fn register_manager(
        &mut self,
        manager: Arc<dyn CommunicationManager>,
    ) -> ProtocolResult<()> {
        self.managers.register(manager)
    }

    fn dispatch(&self, envelope: Envelope) -> ProtocolResult<()> {
        self.managers.dispatch(Direction::FromSupervisor, envelope)
    }
}

impl Default for WorkerEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Error, Debug)]
enum WorkerFailure {
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Task(TaskError),

    #[error(transparent)]
    Protocol(ProtocolError),
}

impl WorkerFailure {
    fn to_task_error(&self) -> TaskError {
        match self {
            Self::Task(err) => err.clone(),
            other => TaskError::from_error(other),
        }
    }
}

/// Entry point of a worker binary.
///
/// Reads launch arguments from the command line and speaks the protocol over
/// stdin and stdout. Tracing must be configured to write to stderr, since
/// stdout carries the protocol.
pub fn main(registry: TaskRegistry) -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("ferry-worker: failed to start runtime: {}", err);
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = runtime.block_on(run_worker(
        &registry,
        &args,
        tokio::io::stdin(),
        tokio::io::stdout(),
    ));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    ExitCode::from(code)
}

/// Run one worker over the given streams and return its exit status.
pub async fn run_worker<R, W>(registry: &TaskRegistry, args: &[String], reader: R, writer: W) -> u8
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    run_worker_with(registry, WorkerEndpoint::new(), args, reader, writer).await
}

/// Like [`run_worker`], with a caller-provided endpoint.
pub async fn run_worker_with<R, W>(
    registry: &TaskRegistry,
    endpoint: WorkerEndpoint,
    args: &[String],
    reader: R,
    writer: W,
) -> u8
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let endpoint = Arc::new(endpoint);
    let (outbox, writer_task) = Outbox::spawn_writer(writer);
    endpoint.managers.attach(&outbox);

    let mut listener = None;
    let outcome = execute(registry, &endpoint, args, reader, &mut listener).await;

    if let Some(listener) = listener {
        listener.abort();
    }

    let error = match &outcome {
        Ok(()) => SerializedValue::Undefined,
        Err(failure) => SerializedValue::from_error(&failure.to_task_error()),
    };
    let protocol_violation = matches!(outcome, Err(WorkerFailure::Protocol(_)));
    let queued = Envelope::encode(&LifecycleMessage::Exit {
        error,
        protocol_violation,
    })
        .and_then(|exit| outbox.send_final(exit));
    outbox.close();

    let flushed = match writer_task.await {
        Ok(result) => result,
        Err(err) => Err(ChannelError::WriteFailed(std::io::Error::other(err.to_string()))),
    };
    if let Err(err) = queued.and(flushed) {
        eprintln!("ferry-worker: failed to deliver exit message: {}", err);
        return EXIT_CHANNEL_FAILURE;
    }

    match outcome {
        Ok(()) | Err(WorkerFailure::Task(_)) => EXIT_REPORTED,
        Err(failure) => {
            eprintln!("ferry-worker: {}", failure);
            EXIT_FAILURE
        }
    }
}

async fn execute<R>(
    registry: &TaskRegistry,
    endpoint: &Arc<WorkerEndpoint>,
    args: &[String],
    reader: R,
    listener: &mut Option<JoinHandle<()>>,
) -> Result<(), WorkerFailure>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let launch = LaunchArgs::parse(args)?;
    if !launch.runtime_args.is_empty() {
        tracing::debug!(args = ?launch.runtime_args, "worker runtime arguments");
    }

    let capabilities = launch.inner.capabilities();
    endpoint.loggers.set_capabilities(capabilities.clone());
    let root = endpoint
        .sinks
        .create_proxy_sink(launch.inner.root_sink_id, capabilities)
        .map_err(BootstrapError::from)?;

    let context = WorkerContext::new(
        Terminal::new(root),
        Arc::clone(&endpoint.loggers),
        launch.inner.clone(),
    );
    let mut task = registry.instantiate(&launch.task, context, launch.config)?;
    tracing::debug!(task = %launch.task, "worker task constructed");

    let (fatal_tx, mut fatal_rx) = oneshot::channel();
    *listener = Some(tokio::spawn(listen(Arc::clone(endpoint), reader, fatal_tx)));

    let mut running = tokio::spawn(async move { task.run().await });
    tokio::select! {
        joined = &mut running => match joined {
            Ok(result) => result.map_err(WorkerFailure::Task),
            Err(err) => Err(WorkerFailure::Task(join_failure(err))),
        },
        Ok(err) = &mut fatal_rx => {
            running.abort();
            Err(WorkerFailure::Protocol(err))
        }
    }
}

/// Route supervisor envelopes until the stream ends or a handler fails.
async fn listen<R>(endpoint: Arc<WorkerEndpoint>, reader: R, fatal: oneshot::Sender<ProtocolError>)
where
    R: AsyncRead + Unpin,
{
    let mut frames = EnvelopeReader::new(reader, "supervisor");
    loop {
        let routed = match frames.next_envelope().await {
            Ok(Some(envelope)) => endpoint.dispatch(envelope),
            Ok(None) => {
                tracing::debug!("supervisor closed the channel");
                return;
            }
            Err(err) => Err(err),
        };
        if let Err(err) = routed {
            tracing::error!(error = %err, "protocol violation from supervisor");
            let _ = fatal.send(err);
            return;
        }
    }
}

fn join_failure(err: JoinError) -> TaskError {
    if err.is_panic() {
        let message = panic_message(err.into_panic());
        TaskError::new(format!("task panicked: {}", message))
    } else {
        TaskError::new("task was cancelled").without_stack()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
