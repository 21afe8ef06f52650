//! Message framing

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::event::EventKind;

use super::TransportError;

/// One decoded `[kind, payload]` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(EventKind, JsonValue)", into = "(EventKind, JsonValue)")]
pub struct WireMessage {
    pub kind: EventKind,
    pub payload: JsonValue,
}

impl From<(EventKind, JsonValue)> for WireMessage {
    fn from((kind, payload): (EventKind, JsonValue)) -> Self {
        Self { kind, payload }
    }
}

impl From<WireMessage> for (EventKind, JsonValue) {
    fn from(message: WireMessage) -> Self {
        (message.kind, message.payload)
    }
}

impl WireMessage {
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        Ok(T::deserialize(&self.payload)?)
    }
}

/// Serialize a message body for one frame.
pub fn encode<T: Serialize + ?Sized>(kind: EventKind, payload: &T) -> Result<Bytes, TransportError> {
    Ok(Bytes::from(serde_json::to_vec(&(kind, payload))?))
}

pub fn decode(frame: &[u8]) -> Result<WireMessage, TransportError> {
    Ok(serde_json::from_slice(frame)?)
}
