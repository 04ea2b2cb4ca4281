//! Scoped loggers requested by name from the worker.
//!
//! A worker asks for a logger with
//! [`ScopedLoggerManager::request_logger`]; the supervisor resolves the name
//! through its [`HostSession`], registers the logger's terminal sink, and
//! answers with the sink id. The worker then holds a [`RemoteLogger`] whose
//! output and diagnostics are forwarded to the real logger.

mod error;
mod host;
mod manager;

pub use error::{LoggerError, LoggerResult};
pub use host::{HostLogger, HostSession, LoggerRegistry, TerminalLogger};
pub use manager::{kinds, LoggerMessage, RemoteLogger, ScopedLoggerManager};
