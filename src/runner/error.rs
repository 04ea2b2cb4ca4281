//! Runner error types.

use std::io;
use thiserror::Error;

use crate::codec::TaskError;
use crate::config::SettingsError;
use crate::protocol::{ChannelError, ProtocolError};

/// Result type for supervisor operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors surfaced by [`RunnerSupervisor::launch`](super::RunnerSupervisor::launch).
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Failed to spawn the worker process.
    #[error("failed to spawn worker process: {0}")]
    SpawnFailed(#[source] io::Error),

    /// No worker binary could be located.
    #[error("worker binary not found: {0}")]
    WorkerNotFound(String),

    /// Worker settings could not be resolved.
    #[error("invalid worker settings: {0}")]
    Settings(#[from] SettingsError),

    /// Failed to observe worker termination.
    #[error("failed to wait for worker process: {0}")]
    WaitFailed(#[source] io::Error),

    /// `launch` was called on a runner that is not idle.
    #[error("runner has already been launched")]
    AlreadyLaunched,

    /// The task configuration could not be turned into JSON.
    #[error("task configuration is not serializable: {0}")]
    InvalidConfiguration(#[source] serde_json::Error),

    /// Every debugger port above the base has been handed out.
    #[error("no debugger ports left to allocate")]
    DebugPortsExhausted,

    /// The task ran and reported a failure.
    #[error(transparent)]
    Task(TaskError),

    /// The worker terminated without sending its exit message.
    #[error("worker exited before sending exit message{}", describe_code(.code))]
    ExitedBeforeExitMessage { code: Option<i32> },

    /// The worker broke the protocol; processing was stopped.
    #[error("worker protocol violation: {0}")]
    Protocol(#[from] ProtocolError),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" (exit code {})", code),
        None => " (terminated by signal)".to_string(),
    }
}

impl RunnerError {
    /// The task itself reported this failure.
    pub fn is_task_failure(&self) -> bool {
        matches!(self, Self::Task(_))
    }

    /// The worker vanished without reporting a result.
    pub fn is_crash(&self) -> bool {
        matches!(self, Self::ExitedBeforeExitMessage { .. })
    }

    /// A protocol violation; indicates a framework bug, never retriable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// The task error, if the task reported one.
    pub fn task_error(&self) -> Option<&TaskError> {
        match self {
            Self::Task(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ChannelError> for RunnerError {
    fn from(err: ChannelError) -> Self {
        Self::Protocol(ProtocolError::Channel(err))
    }
}

/// Errors raised by the worker before the task body runs.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error(
        "expected launch arguments <task> <inner-configuration> <task-configuration>, got {0} argument(s)"
    )]
    MissingArguments(usize),

    #[error("invalid inner configuration: {0}")]
    InvalidInnerConfiguration(#[source] serde_json::Error),

    #[error("invalid configuration for task \"{task}\": {source}")]
    InvalidTaskConfiguration {
        task: String,
        #[source]
        source: serde_json::Error,
    },

    /// The reference does not name a registered worker task.
    #[error("\"{0}\" is not registered as a worker task")]
    UnknownTask(String),

    #[error("task \"{task}\" failed to initialize: {error}")]
    Construction { task: String, error: TaskError },

    #[error(transparent)]
    Channel(#[from] ChannelError),
}
