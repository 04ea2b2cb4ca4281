//! Ways of starting a worker: a real child process or an in-process task.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use super::bootstrap;
use super::error::{RunnerError, RunnerResult};
use super::launch::WorkerLaunch;
use super::task::TaskRegistry;
use crate::config::Settings;

/// Buffer size of each direction of an in-process channel.
const IN_PROCESS_BUFFER: usize = 64 * 1024;

/// A started worker whose termination can be observed.
#[async_trait]
pub trait WorkerProcess: Send {
    /// Wait for termination. `None` means no exit code was reported,
    /// e.g. the process was killed by a signal.
    async fn wait(&mut self) -> RunnerResult<Option<i32>>;

    /// Request termination without waiting for it.
    fn kill(&mut self);
}

/// The supervisor's end of a started worker.
pub struct SpawnedWorker {
    /// Worker output, carrying the protocol.
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    /// Worker input, carrying the protocol.
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    pub process: Box<dyn WorkerProcess>,
}

/// Starts workers for a [`RunnerSupervisor`](super::RunnerSupervisor).
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    async fn spawn(&self, launch: &WorkerLaunch) -> RunnerResult<SpawnedWorker>;
}

/// Spawns the worker binary as a child process.
///
/// The child's stdin and stdout carry the protocol; stderr is inherited so
/// worker diagnostics reach the user. The child is killed if its handle is
/// dropped.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: PathBuf,
}

impl ProcessSpawner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Locate the worker binary from settings.
    pub fn from_settings(settings: &Settings) -> RunnerResult<Self> {
        settings.worker_path().map(Self::new).ok_or_else(|| {
            RunnerError::WorkerNotFound(
                "set worker.path in config or install ferry-worker on PATH".to_string(),
            )
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl WorkerSpawner for ProcessSpawner {
    async fn spawn(&self, launch: &WorkerLaunch) -> RunnerResult<SpawnedWorker> {
        let mut child = Command::new(&self.program)
            .args(launch.to_args()?)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(RunnerError::SpawnFailed)?;

        let stdin = child.stdin.take().ok_or_else(|| not_captured("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| not_captured("stdout"))?;

        tracing::debug!(
            program = %self.program.display(),
            pid = child.id(),
            task = %launch.task,
            "spawned worker process"
        );

        Ok(SpawnedWorker {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            process: Box::new(ChildProcess { child }),
        })
    }
}

fn not_captured(stream: &str) -> RunnerError {
    RunnerError::SpawnFailed(io::Error::other(format!("worker {} not captured", stream)))
}

struct ChildProcess {
    child: Child,
}

#[async_trait]
impl WorkerProcess for ChildProcess {
    async fn wait(&mut self) -> RunnerResult<Option<i32>> {
        let status = self.child.wait().await.map_err(RunnerError::WaitFailed)?;
        Ok(status.code())
    }

    fn kill(&mut self) {
        if let Err(err) = self.child.start_kill() {
            tracing::debug!(error = %err, "worker already gone");
        }
    }
}

/// Runs workers as tasks on the current runtime, connected through
/// in-memory pipes.
///
/// The worker side is the same bootstrap the worker binary runs, so the
/// whole protocol is exercised without a child process.
#[derive(Clone)]
pub struct InProcessSpawner {
    registry: Arc<TaskRegistry>,
}

impl InProcessSpawner {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl WorkerSpawner for InProcessSpawner {
    async fn spawn(&self, launch: &WorkerLaunch) -> RunnerResult<SpawnedWorker> {
        let args = launch.to_args()?;
        let (supervisor_end, worker_end) = tokio::io::duplex(IN_PROCESS_BUFFER);
        let (worker_reader, worker_writer) = tokio::io::split(worker_end);

        let registry = Arc::clone(&self.registry);
        let handle = tokio::spawn(async move {
            bootstrap::run_worker(&registry, &args, worker_reader, worker_writer).await
        });

        let (reader, writer) = tokio::io::split(supervisor_end);
        Ok(SpawnedWorker {
            reader: Box::new(reader),
            writer: Box::new(writer),
            process: Box::new(TaskProcess { handle }),
        })
    }
}

struct TaskProcess {
    handle: JoinHandle<u8>,
}

#[async_trait]
impl WorkerProcess for TaskProcess {
    async fn wait(&mut self) -> RunnerResult<Option<i32>> {
        match (&mut self.handle).await {
            Ok(code) => Ok(Some(i32::from(code))),
            // Aborted or panicked outside the task body; no code to report.
            Err(_) => Ok(None),
        }
    }

    fn kill(&mut self) {
        self.handle.abort();
    }
}
