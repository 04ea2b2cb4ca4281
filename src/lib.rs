//! # ferry
//!
//! Run tasks in an isolated worker process and carry their output back.
//!
//! ## Architecture
//!
//! A [`runner::RunnerSupervisor`] spawns a worker, hands it a task name and
//! a JSON configuration, and routes the worker's messages to communication
//! managers until the worker reports its result:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  RunnerSupervisor                        │
//! │  (spawn, route, exit tracking, debug-port allocation)    │
//! └─────────────────────────────────────────────────────────┘
//!                          │ NDJSON envelopes
//!                          ▼ [protocol]
//! ┌─────────────────────────────────────────────────────────┐
//! │              Communication managers                      │
//! │  terminal sinks (sink-write), scoped loggers             │
//! │  (logger-request / logger-response / logger-emit)        │
//! └─────────────────────────────────────────────────────────┘
//!                          │ boundary values
//!                          ▼ [codec]
//! ┌─────────────────────────────────────────────────────────┐
//! │        undefined | null | error | file error | scalar    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [bootstrap]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Worker: TaskRegistry -> WorkerTask::invoke -> exit     │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod config;
pub mod logger;
pub mod protocol;
pub mod runner;
pub mod tasks;
pub mod terminal;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::codec::{FileLocation, TaskError, Value};
    pub use crate::config::Settings;
    pub use crate::logger::{
        HostLogger, HostSession, LoggerRegistry, RemoteLogger, TerminalLogger,
    };
    pub use crate::protocol::{CommunicationManager, Envelope};
    pub use crate::runner::{
        InProcessSpawner, ProcessSpawner, RunnerError, RunnerResult, RunnerSupervisor,
        TaskRegistry, WorkerContext, WorkerTask,
    };
    pub use crate::terminal::{Severity, StdioSink, Terminal, TerminalSink};
}
