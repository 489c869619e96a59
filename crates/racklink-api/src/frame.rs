// Bus wire frames.
//
// Every message on the bus is a JSON text frame shaped
// `{"event": "<name>", "data": {...}}`. Outbound frames are strongly typed;
// inbound frames are decoded into `RawFrame` here and interpreted by
// racklink-core, which owns the event taxonomy.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

// ── Outbound ─────────────────────────────────────────────────────────

/// A frame this client sends to the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum OutboundFrame {
    /// Identity handshake. Must be the first frame on a new link.
    Authenticate {
        #[serde(rename = "userId")]
        user_id: String,
    },
    SendCommand(SendCommandData),
    RegisterDevice(RegisterDeviceData),
}

impl OutboundFrame {
    /// Wire name of the frame (`"authenticate"`, `"sendCommand"`, ...).
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::SendCommand(_) => "sendCommand",
            Self::RegisterDevice(_) => "registerDevice",
        }
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn encode(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

/// `sendCommand` body. Extra payload keys sit next to `deviceId`/`command`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCommandData {
    pub device_id: String,
    pub command: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// `registerDevice` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceData {
    pub device_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub ip_address: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── Inbound ──────────────────────────────────────────────────────────

/// An undecoded inbound frame: event name plus untyped body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl RawFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Parse one text frame received from the bus.
    pub fn decode(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: text.to_owned(),
        })
    }

    pub fn encode(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}
