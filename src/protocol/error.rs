//! Protocol and channel error types.

use std::io;
use thiserror::Error;

use super::manager::Direction;
use crate::codec::{CodecError, TaskError};

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors on the framed channel itself.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The outbound side has been closed (after exit, or on shutdown).
    #[error("channel is closed")]
    Closed,

    /// A manager tried to send before the channel was opened.
    #[error("communication manager `{0}` is not attached to a channel")]
    NotAttached(&'static str),

    /// Failed to write a frame.
    #[error("failed to write to channel: {0}")]
    WriteFailed(#[source] io::Error),

    /// Failed to read a frame.
    #[error("failed to read from channel: {0}")]
    ReadFailed(#[source] io::Error),

    /// Failed to encode an envelope as JSON.
    #[error("failed to encode envelope: {0}")]
    EncodeFailed(#[source] serde_json::Error),
}

/// Violations of the supervisor/worker protocol.
///
/// Every variant indicates a bug in the framework or its configuration, not
/// a runtime condition; endpoints stop processing as soon as one is raised.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// No registered manager claimed the envelope.
    #[error("no communication manager can handle message kind \"{kind}\" {direction}")]
    Unhandled { kind: String, direction: Direction },

    /// A `sink-write` referenced an id that was never registered.
    #[error("a sink with id {0} has not been registered")]
    UnregisteredSink(u32),

    /// A `logger-emit` referenced an id with no logger behind it.
    #[error("no scoped logger is registered for sink id {0}")]
    UnregisteredLogger(u32),

    /// A `logger-response` arrived for a name nobody is waiting on.
    #[error("no registered responder for logger \"{0}\"")]
    NoPendingRequest(String),

    /// A `logger-response` carried neither a sink id nor an error.
    #[error("logger response for \"{0}\" carries neither a sink id nor an error")]
    IncompleteResponse(String),

    /// The worker sent a second exit envelope.
    #[error("duplicate exit message received from worker")]
    DuplicateExit,

    /// The worker sent something after its exit envelope.
    #[error("message \"{0}\" received after exit")]
    MessageAfterExit(String),

    /// A frame could not be parsed as an envelope.
    #[error("malformed frame from {origin}: {source}")]
    MalformedFrame {
        origin: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// An envelope's payload does not match its kind.
    #[error("malformed \"{kind}\" message: {source}")]
    MalformedMessage {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    /// The worker reported that it stopped on a violation by the supervisor.
    #[error("worker stopped on a protocol violation: {0}")]
    WorkerAborted(TaskError),

    /// A manager with the same name was registered twice on one endpoint.
    #[error("communication manager `{0}` is already registered")]
    DuplicateManager(&'static str),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}
