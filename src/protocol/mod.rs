//! Supervisor/worker message protocol.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐               ┌──────────────────────────────┐
//! │          Supervisor          │  stdin NDJSON │            Worker            │
//! │  ManagerList                 │ ────────────▶ │  ManagerList                 │
//! │   ├─ TerminalSinkManager     │               │   ├─ TerminalSinkManager     │
//! │   └─ ScopedLoggerManager     │ ◀──────────── │   └─ ScopedLoggerManager     │
//! │  exit tracking               │ stdout NDJSON │  exactly one `exit`          │
//! └──────────────────────────────┘               └──────────────────────────────┘
//! ```
//!
//! Every frame is an [`Envelope`]. The reserved `exit` kind is handled by the
//! runner itself; every other kind belongs to exactly one
//! [`CommunicationManager`], installed on both endpoints.

mod channel;
mod envelope;
mod error;
mod manager;

pub use channel::{EnvelopeReader, Outbox};
pub use envelope::{Envelope, LifecycleMessage, EXIT_KIND};
pub use error::{ChannelError, ProtocolError, ProtocolResult};
pub use manager::{CommunicationManager, Direction, ManagerList};
