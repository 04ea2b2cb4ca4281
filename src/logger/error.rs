//! Scoped logger error types.

use thiserror::Error;

use crate::codec::{CodecError, TaskError};
use crate::protocol::ChannelError;

/// Result type for scoped logger operations.
pub type LoggerResult<T> = Result<T, LoggerError>;

/// Errors surfaced to the worker code requesting or using a scoped logger.
#[derive(Error, Debug)]
pub enum LoggerError {
    /// A request for this name is still outstanding.
    #[error("logger \"{0}\" already requested")]
    AlreadyRequested(String),

    /// The host session could not resolve the logger.
    #[error("logger \"{name}\" could not be resolved: {error}")]
    Rejected { name: String, error: TaskError },

    /// The endpoint went away before answering.
    #[error("request for logger \"{0}\" was dropped before a response arrived")]
    Disconnected(String),

    /// The value passed to `emit_error`/`emit_warning` cannot cross the boundary.
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}
