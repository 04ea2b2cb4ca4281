//! Named logger negotiation between worker and supervisor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::error::{LoggerError, LoggerResult};
use super::host::{HostLogger, HostSession};
use crate::codec::{deserialize_value, serialize_value, SerializedValue, TaskError, Value};
use crate::protocol::{
    ChannelError, CommunicationManager, Direction, Envelope, Outbox, ProtocolError,
    ProtocolResult,
};
use crate::terminal::{ProxySink, SinkCapabilities, Terminal, TerminalSink, TerminalSinkManager};

/// Kinds owned by the scoped logger manager.
pub mod kinds {
    pub const LOGGER_REQUEST: &str = "logger-request";
    pub const LOGGER_RESPONSE: &str = "logger-response";
    pub const LOGGER_EMIT: &str = "logger-emit";
}

/// Messages of the scoped logger sub-protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LoggerMessage {
    LoggerRequest {
        name: String,
    },
    LoggerResponse {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sink_id: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<SerializedValue>,
    },
    LoggerEmit {
        sink_id: u32,
        is_error: bool,
        error: SerializedValue,
    },
}

/// An outstanding request, tagged so its own future can withdraw it.
struct Waiting {
    request_id: u64,
    responder: oneshot::Sender<LoggerResult<RemoteLogger>>,
}

/// Request state for one logger name.
///
/// `withdrawn` counts requests that were sent but whose futures were dropped;
/// their responses arrive first and are discarded.
#[derive(Default)]
struct Pending {
    waiting: Option<Waiting>,
    withdrawn: u32,
}

impl Pending {
    fn is_empty(&self) -> bool {
        self.waiting.is_none() && self.withdrawn == 0
    }
}

/// Communication manager for named loggers.
///
/// Worker side: tracks one pending request per logger name and builds
/// [`RemoteLogger`]s from responses. Supervisor side: resolves names through
/// the [`HostSession`], registers the logger's sink, and forwards emitted
/// errors and warnings to the real logger.
pub struct ScopedLoggerManager {
    sinks: Arc<TerminalSinkManager>,
    session: Option<Arc<dyn HostSession>>,
    loggers: DashMap<u32, Arc<dyn HostLogger>>,
    pending: DashMap<String, Pending>,
    next_request_id: AtomicU64,
    capabilities: OnceCell<SinkCapabilities>,
    outbox: OnceCell<Outbox>,
}

impl ScopedLoggerManager {
    pub const NAME: &'static str = "scoped-logger";

    pub fn new(sinks: Arc<TerminalSinkManager>, session: Option<Arc<dyn HostSession>>) -> Self {
        Self {
            sinks,
            session,
            loggers: DashMap::new(),
            pending: DashMap::new(),
            next_request_id: AtomicU64::new(1),
            capabilities: OnceCell::new(),
            outbox: OnceCell::new(),
        }
    }

    /// Capabilities given to proxy sinks of negotiated loggers.
    pub fn set_capabilities(&self, capabilities: SinkCapabilities) {
        let _ = self.capabilities.set(capabilities);
    }

    /// Whether a request for `name` is outstanding.
    pub fn is_pending(&self, name: &str) -> bool {
        self.pending
            .get(name)
            .is_some_and(|entry| entry.waiting.is_some())
    }

    /// Ask the supervisor for the logger registered under `name`.
    ///
    /// Only one request per name may be outstanding. No timeout is applied;
    /// dropping the returned future withdraws the request and the name can be
    /// requested again. The answer to a withdrawn request is discarded.
    ///
    /// # Errors
    ///
    /// - [`LoggerError::AlreadyRequested`] if a request for `name` is outstanding;
    ///   nothing is sent in that case.
    /// - [`LoggerError::Rejected`] if the host session could not resolve it.
    pub async fn request_logger(&self, name: &str) -> LoggerResult<RemoteLogger> {
        let outbox = self.outbox()?.clone();

        let (responder, rx) = oneshot::channel();
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let waiting = Waiting {
            request_id,
            responder,
        };
        match self.pending.entry(name.to_string()) {
            Entry::Occupied(mut slot) => {
                if slot.get().waiting.is_some() {
                    return Err(LoggerError::AlreadyRequested(name.to_string()));
                }
                slot.get_mut().waiting = Some(waiting);
            }
            Entry::Vacant(slot) => {
                slot.insert(Pending {
                    waiting: Some(waiting),
                    withdrawn: 0,
                });
            }
        }
        let mut withdraw = Withdraw {
            pending: &self.pending,
            name,
            request_id,
            sent: false,
        };

        Envelope::encode(&LoggerMessage::LoggerRequest {
            name: name.to_string(),
        })
        .and_then(|envelope| outbox.send(envelope))?;
        withdraw.sent = true;
        tracing::debug!(logger = name, "requested scoped logger");

        rx.await
            .map_err(|_| LoggerError::Disconnected(name.to_string()))?
    }

    fn outbox(&self) -> Result<&Outbox, ChannelError> {
        self.outbox.get().ok_or(ChannelError::NotAttached(Self::NAME))
    }

    fn resolve(&self, name: &str) -> Result<Arc<dyn HostLogger>, TaskError> {
        match &self.session {
            Some(session) => session.resolve_logger(name),
            None => Err(TaskError::new(format!(
                "no host session is available to resolve logger \"{}\"",
                name
            ))
            .without_stack()),
        }
    }

    fn handle_request(&self, name: String) -> ProtocolResult<()> {
        let response = match self.resolve(&name) {
            Ok(logger) => {
                let sink_id = self.sinks.register_sink(logger.terminal_sink());
                self.loggers.insert(sink_id, logger);
                tracing::debug!(logger = %name, sink_id, "provisioned scoped logger");
                LoggerMessage::LoggerResponse {
                    name,
                    sink_id: Some(sink_id),
                    error: None,
                }
            }
            Err(error) => {
                tracing::debug!(logger = %name, error = %error, "scoped logger not resolved");
                LoggerMessage::LoggerResponse {
                    name,
                    sink_id: None,
                    error: Some(SerializedValue::from_error(&error)),
                }
            }
        };
        self.outbox()?.send(Envelope::encode(&response)?)?;
        Ok(())
    }

    fn handle_emit(
        &self,
        sink_id: u32,
        is_error: bool,
        error: SerializedValue,
    ) -> ProtocolResult<()> {
        let logger = self
            .loggers
            .get(&sink_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(ProtocolError::UnregisteredLogger(sink_id))?;
        let value = deserialize_value(&error);
        if is_error {
            logger.emit_error(value);
        } else {
            logger.emit_warning(value);
        }
        Ok(())
    }

    fn handle_response(
        &self,
        name: String,
        sink_id: Option<u32>,
        error: Option<SerializedValue>,
    ) -> ProtocolResult<()> {
        let responder = {
            let mut slot = self
                .pending
                .get_mut(&name)
                .ok_or_else(|| ProtocolError::NoPendingRequest(name.clone()))?;
            if slot.withdrawn > 0 {
                slot.withdrawn -= 1;
                None
            } else {
                Some(
                    slot.waiting
                        .take()
                        .ok_or_else(|| ProtocolError::NoPendingRequest(name.clone()))?
                        .responder,
                )
            }
        };
        self.pending.remove_if(&name, |_, slot| slot.is_empty());

        let Some(responder) = responder else {
            tracing::debug!(logger = %name, "discarded response to withdrawn request");
            return Ok(());
        };

        let outcome = match (error, sink_id) {
            (Some(error), _) => Err(LoggerError::Rejected {
                name,
                error: deserialize_value(&error).into_task_error(),
            }),
            (None, Some(sink_id)) => {
                let capabilities = self.capabilities.get().cloned().unwrap_or_default();
                let sink = self.sinks.create_proxy_sink(sink_id, capabilities)?;
                Ok(RemoteLogger {
                    name,
                    sink,
                    outbox: self.outbox()?.clone(),
                })
            }
            (None, None) => return Err(ProtocolError::IncompleteResponse(name)),
        };

        // The requester may have stopped waiting; the answer is then discarded.
        let _ = responder.send(outcome);
        Ok(())
    }
}

impl CommunicationManager for ScopedLoggerManager {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn attach(&self, outbox: &Outbox) {
        let _ = self.outbox.set(outbox.clone());
    }

    fn can_handle_from_worker(&self, envelope: &Envelope) -> bool {
        envelope.is(kinds::LOGGER_REQUEST) || envelope.is(kinds::LOGGER_EMIT)
    }

    fn handle_from_worker(&self, envelope: Envelope) -> ProtocolResult<()> {
        match envelope.decode()? {
            LoggerMessage::LoggerRequest { name } => self.handle_request(name),
            LoggerMessage::LoggerEmit {
                sink_id,
                is_error,
                error,
            } => self.handle_emit(sink_id, is_error, error),
            LoggerMessage::LoggerResponse { .. } => Err(ProtocolError::Unhandled {
                kind: envelope.kind().to_string(),
                direction: Direction::FromWorker,
            }),
        }
    }

    fn can_handle_from_supervisor(&self, envelope: &Envelope) -> bool {
        envelope.is(kinds::LOGGER_RESPONSE)
    }

    fn handle_from_supervisor(&self, envelope: Envelope) -> ProtocolResult<()> {
        match envelope.decode()? {
            LoggerMessage::LoggerResponse {
                name,
                sink_id,
                error,
            } => self.handle_response(name, sink_id, error),
            _ => Err(ProtocolError::Unhandled {
                kind: envelope.kind().to_string(),
                direction: Direction::FromSupervisor,
            }),
        }
    }
}

/// Withdraws a request whose future is dropped before its answer arrives.
///
/// Once the request is on the wire, the answer still has to be consumed, so
/// the name keeps a marker until it does. A newer request for the same name
/// is left alone.
struct Withdraw<'a> {
    pending: &'a DashMap<String, Pending>,
    name: &'a str,
    request_id: u64,
    sent: bool,
}

impl Drop for Withdraw<'_> {
    fn drop(&mut self) {
        if let Some(mut slot) = self.pending.get_mut(self.name) {
            let ours = slot
                .waiting
                .as_ref()
                .is_some_and(|waiting| waiting.request_id == self.request_id);
            if ours {
                slot.waiting = None;
                if self.sent {
                    slot.withdrawn += 1;
                }
            }
        }
        self.pending.remove_if(self.name, |_, slot| slot.is_empty());
    }
}

/// Worker-side proxy for a logger that lives in the supervisor.
#[derive(Debug, Clone)]
pub struct RemoteLogger {
    name: String,
    sink: Arc<ProxySink>,
    outbox: Outbox,
}

impl RemoteLogger {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sink_id(&self) -> u32 {
        self.sink.sink_id()
    }

    pub fn terminal_sink(&self) -> Arc<dyn TerminalSink> {
        self.sink.clone()
    }

    /// A terminal writing into the host logger's sink.
    pub fn terminal(&self) -> Terminal {
        Terminal::new(self.terminal_sink())
    }

    /// Report an error through the host logger.
    ///
    /// # Errors
    ///
    /// Fails before sending anything if the value cannot cross the boundary.
    pub fn emit_error(&self, error: impl Into<Value>) -> LoggerResult<()> {
        self.emit(true, error.into())
    }

    /// Report a warning through the host logger.
    pub fn emit_warning(&self, warning: impl Into<Value>) -> LoggerResult<()> {
        self.emit(false, warning.into())
    }

    fn emit(&self, is_error: bool, value: Value) -> LoggerResult<()> {
        let error = serialize_value(&value)?;
        let envelope = Envelope::encode(&LoggerMessage::LoggerEmit {
            sink_id: self.sink.sink_id(),
            is_error,
            error,
        })?;
        self.outbox.send(envelope)?;
        Ok(())
    }
}
