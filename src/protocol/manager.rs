//! Communication managers and first-match dispatch.

use std::fmt;
use std::sync::Arc;

use super::channel::Outbox;
use super::envelope::Envelope;
use super::error::{ProtocolError, ProtocolResult};

/// Which endpoint an envelope came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sent by the worker, handled by the supervisor.
    FromWorker,
    /// Sent by the supervisor, handled by the worker.
    FromSupervisor,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::FromWorker => write!(f, "from worker"),
            Direction::FromSupervisor => write!(f, "from supervisor"),
        }
    }
}

/// A unit owning one slice of the protocol.
///
/// Managers are installed on both endpoints. Handlers run on the endpoint's
/// single dispatch loop and must not block.
pub trait CommunicationManager: Send + Sync {
    /// Stable name used in diagnostics and duplicate detection.
    fn name(&self) -> &'static str;

    /// Called once when the channel to the other endpoint opens.
    fn attach(&self, _outbox: &Outbox) {}

    fn can_handle_from_worker(&self, envelope: &Envelope) -> bool;

    fn handle_from_worker(&self, envelope: Envelope) -> ProtocolResult<()>;

    fn can_handle_from_supervisor(&self, envelope: &Envelope) -> bool;

    fn handle_from_supervisor(&self, envelope: Envelope) -> ProtocolResult<()>;
}

/// Ordered list of managers held by one endpoint.
#[derive(Default, Clone)]
pub struct ManagerList {
    managers: Vec<Arc<dyn CommunicationManager>>,
}

impl ManagerList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a manager. Registration order decides routing: the first
    /// manager that claims an envelope handles it.
    pub fn register(&mut self, manager: Arc<dyn CommunicationManager>) -> ProtocolResult<()> {
        if self.managers.iter().any(|m| m.name() == manager.name()) {
            return Err(ProtocolError::DuplicateManager(manager.name()));
        }
        self.managers.push(manager);
        Ok(())
    }

    /// Append one of the built-in managers, whose names never collide.
    pub(crate) fn push(&mut self, manager: Arc<dyn CommunicationManager>) {
        self.managers.push(manager);
    }

    /// Give every manager the outbox of a newly opened channel.
    pub fn attach(&self, outbox: &Outbox) {
        for manager in &self.managers {
            manager.attach(outbox);
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.managers.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// Route one envelope to the first manager that claims it.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Unhandled`] when no manager claims the
    /// envelope, or whatever error the handling manager raised.
    pub fn dispatch(&self, direction: Direction, envelope: Envelope) -> ProtocolResult<()> {
        let manager = self.managers.iter().find(|m| match direction {
            Direction::FromWorker => m.can_handle_from_worker(&envelope),
            Direction::FromSupervisor => m.can_handle_from_supervisor(&envelope),
        });

        let Some(manager) = manager else {
            return Err(ProtocolError::Unhandled {
                kind: envelope.kind().to_string(),
                direction,
            });
        };

        tracing::debug!(
            kind = envelope.kind(),
            manager = manager.name(),
            %direction,
            "dispatching envelope"
        );
        match direction {
            Direction::FromWorker => manager.handle_from_worker(envelope),
            Direction::FromSupervisor => manager.handle_from_supervisor(envelope),
        }
    }
}
