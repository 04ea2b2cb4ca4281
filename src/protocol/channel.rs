//! NDJSON framing over an ordered byte stream.
//!
//! Each envelope is one line of JSON. Outbound envelopes are queued on an
//! unbounded channel and written by a single background task, so senders
//! never block and frames leave in the order they were queued.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::envelope::Envelope;
use super::error::{ChannelError, ProtocolError};

/// Cloneable handle for sending envelopes to the other endpoint.
#[derive(Clone, Debug)]
pub struct Outbox {
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<Envelope>>>>,
}

impl Outbox {
    /// Create an outbox and the receiving end of its queue.
    ///
    /// Used directly by tests; production code goes through
    /// [`Outbox::spawn_writer`].
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                sender: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Create an outbox whose envelopes are written as NDJSON to `writer`.
    ///
    /// The returned task finishes once the outbox is closed and every queued
    /// envelope has been flushed.
    pub fn spawn_writer<W>(writer: W) -> (Self, JoinHandle<Result<(), ChannelError>>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbox, mut rx) = Self::channel();
        let task = tokio::spawn(async move {
            let mut writer = BufWriter::new(writer);
            while let Some(envelope) = rx.recv().await {
                let line =
                    serde_json::to_string(&envelope).map_err(ChannelError::EncodeFailed)? + "\n";
                writer
                    .write_all(line.as_bytes())
                    .await
                    .map_err(ChannelError::WriteFailed)?;
                writer.flush().await.map_err(ChannelError::WriteFailed)?;
            }
            writer.shutdown().await.map_err(ChannelError::WriteFailed)
        });
        (outbox, task)
    }

    /// Queue an envelope for the other endpoint.
    pub fn send(&self, envelope: Envelope) -> Result<(), ChannelError> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(sender) => sender.send(envelope).map_err(|_| ChannelError::Closed),
            None => Err(ChannelError::Closed),
        }
    }

    /// Queue a last envelope and close the outbox in one step.
    ///
    /// No envelope can be queued after this one, from any clone.
    pub fn send_final(&self, envelope: Envelope) -> Result<(), ChannelError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(sender) => sender.send(envelope).map_err(|_| ChannelError::Closed),
            None => Err(ChannelError::Closed),
        }
    }

    /// Close the outbox; queued envelopes are still delivered.
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// Reads NDJSON envelopes from a byte stream.
pub struct EnvelopeReader<R> {
    reader: BufReader<R>,
    origin: &'static str,
    line: String,
}

impl<R: AsyncRead + Unpin> EnvelopeReader<R> {
    /// `origin` names the other endpoint in diagnostics ("worker", "supervisor").
    pub fn new(reader: R, origin: &'static str) -> Self {
        Self {
            reader: BufReader::new(reader),
            origin,
            line: String::new(),
        }
    }

    /// Read the next envelope, or `None` at end of stream.
    ///
    /// Blank lines are skipped. A line that is not an envelope is a protocol
    /// violation.
    pub async fn next_envelope(&mut self) -> Result<Option<Envelope>, ProtocolError> {
        loop {
            self.line.clear();
            let read = self
                .reader
                .read_line(&mut self.line)
                .await
                .map_err(ChannelError::ReadFailed)?;
            if read == 0 {
                return Ok(None);
            }
            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return serde_json::from_str(trimmed)
                .map(Some)
                .map_err(|source| ProtocolError::MalformedFrame {
                    origin: self.origin,
                    source,
                });
        }
    }
}
