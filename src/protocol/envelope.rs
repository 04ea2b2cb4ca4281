//! The envelope carried by every frame.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::error::{ChannelError, ProtocolError, ProtocolResult};
use crate::codec::SerializedValue;

/// Discriminator of the reserved lifecycle message.
pub const EXIT_KIND: &str = "exit";

/// One discrete message on the channel.
///
/// The `kind` selects the payload shape and the owning communication
/// manager. Each sub-protocol defines its payloads as a
/// `#[serde(tag = "kind")]` enum and converts with [`Envelope::encode`] and
/// [`Envelope::decode`]; this type never enumerates kinds itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    kind: String,
    #[serde(flatten)]
    body: Map<String, JsonValue>,
}

impl Envelope {
    /// Build an envelope from a kind and an already-assembled body.
    pub fn new(kind: impl Into<String>, body: Map<String, JsonValue>) -> Self {
        Self {
            kind: kind.into(),
            body,
        }
    }

    /// Encode a typed, `kind`-tagged message.
    pub fn encode<M: Serialize>(message: &M) -> Result<Self, ChannelError> {
        let value = serde_json::to_value(message).map_err(ChannelError::EncodeFailed)?;
        serde_json::from_value(value).map_err(ChannelError::EncodeFailed)
    }

    /// Decode into a typed message of the owning sub-protocol.
    pub fn decode<M: DeserializeOwned>(&self) -> ProtocolResult<M> {
        let malformed = |source| ProtocolError::MalformedMessage {
            kind: self.kind.clone(),
            source,
        };
        let value = serde_json::to_value(self).map_err(malformed)?;
        serde_json::from_value(value).map_err(malformed)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Whether this envelope has the given kind.
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    pub fn body(&self) -> &Map<String, JsonValue> {
        &self.body
    }
}

/// Lifecycle messages sent by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LifecycleMessage {
    /// The single terminal message of a worker run.
    Exit {
        error: SerializedValue,
        /// The worker stopped because the supervisor broke the protocol;
        /// `error` describes the violation, not a task failure.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        protocol_violation: bool,
    },
}
