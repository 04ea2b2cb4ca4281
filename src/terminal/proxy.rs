//! Proxying terminal sinks across the channel.
//!
//! The supervisor keeps the real sinks in an id-indexed table. The worker only
//! ever holds [`ProxySink`]s, which turn every write into a `sink-write`
//! envelope carrying the id.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use super::sink::{Severity, SinkCapabilities, TerminalSink};
use crate::protocol::{
    ChannelError, CommunicationManager, Envelope, Outbox, ProtocolError, ProtocolResult,
};

/// Kinds owned by the terminal sink manager.
pub mod kinds {
    pub const SINK_WRITE: &str = "sink-write";
}

/// Messages of the terminal sink sub-protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SinkMessage {
    SinkWrite {
        sink_id: u32,
        text: String,
        severity: Severity,
    },
}

/// Communication manager for terminal output.
///
/// Supervisor side: owns the `sink_id -> sink` table and performs the real
/// writes. Worker side: hands out proxy sinks bound to ids the supervisor
/// assigned.
pub struct TerminalSinkManager {
    sinks: DashMap<u32, Arc<dyn TerminalSink>>,
    next_id: AtomicU32,
    outbox: OnceCell<Outbox>,
}

impl TerminalSinkManager {
    pub const NAME: &'static str = "terminal-sink";

    pub fn new() -> Self {
        Self {
            sinks: DashMap::new(),
            next_id: AtomicU32::new(1),
            outbox: OnceCell::new(),
        }
    }

    /// Register a real sink and return the id the worker will address it by.
    ///
    /// Ids are never reused for the lifetime of this manager.
    pub fn register_sink(&self, sink: Arc<dyn TerminalSink>) -> u32 {
        let sink_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sinks.insert(sink_id, sink);
        tracing::debug!(sink_id, "registered terminal sink");
        sink_id
    }

    pub fn is_registered(&self, sink_id: u32) -> bool {
        self.sinks.contains_key(&sink_id)
    }

    /// Create a sink whose writes are forwarded to the supervisor's sink `sink_id`.
    pub fn create_proxy_sink(
        &self,
        sink_id: u32,
        capabilities: SinkCapabilities,
    ) -> Result<Arc<ProxySink>, ChannelError> {
        let outbox = self
            .outbox
            .get()
            .ok_or(ChannelError::NotAttached(Self::NAME))?;
        Ok(Arc::new(ProxySink {
            sink_id,
            capabilities,
            outbox: outbox.clone(),
        }))
    }

    fn write_to_registered(
        &self,
        sink_id: u32,
        text: &str,
        severity: Severity,
    ) -> ProtocolResult<()> {
        // Clone out of the table so the shard lock is not held during the write.
        let sink = self
            .sinks
            .get(&sink_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(ProtocolError::UnregisteredSink(sink_id))?;
        sink.write(text, severity);
        Ok(())
    }
}

impl Default for TerminalSinkManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CommunicationManager for TerminalSinkManager {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn attach(&self, outbox: &Outbox) {
        let _ = self.outbox.set(outbox.clone());
    }

    fn can_handle_from_worker(&self, envelope: &Envelope) -> bool {
        envelope.is(kinds::SINK_WRITE)
    }

    fn handle_from_worker(&self, envelope: Envelope) -> ProtocolResult<()> {
        match envelope.decode()? {
            SinkMessage::SinkWrite {
                sink_id,
                text,
                severity,
            } => self.write_to_registered(sink_id, &text, severity),
        }
    }

    fn can_handle_from_supervisor(&self, _envelope: &Envelope) -> bool {
        false
    }

    fn handle_from_supervisor(&self, envelope: Envelope) -> ProtocolResult<()> {
        Err(ProtocolError::Unhandled {
            kind: envelope.kind().to_string(),
            direction: crate::protocol::Direction::FromSupervisor,
        })
    }
}

/// A sink living in the worker that forwards writes to the supervisor.
#[derive(Debug, Clone)]
pub struct ProxySink {
    sink_id: u32,
    capabilities: SinkCapabilities,
    outbox: Outbox,
}

impl ProxySink {
    pub fn sink_id(&self) -> u32 {
        self.sink_id
    }

    /// Forward a write, reporting channel failures to the caller.
    pub fn try_write(&self, text: &str, severity: Severity) -> Result<(), ChannelError> {
        let envelope = Envelope::encode(&SinkMessage::SinkWrite {
            sink_id: self.sink_id,
            text: text.to_string(),
            severity,
        })?;
        self.outbox.send(envelope)
    }
}

impl TerminalSink for ProxySink {
    fn supports_color(&self) -> bool {
        self.capabilities.supports_color
    }

    fn line_ending(&self) -> &str {
        &self.capabilities.line_ending
    }

    fn write(&self, text: &str, severity: Severity) {
        if let Err(err) = self.try_write(text, severity) {
            tracing::debug!(sink_id = self.sink_id, error = %err, "dropped terminal write");
        }
    }
}
