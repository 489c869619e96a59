// ── Command API ──
//
// Outbound commands are plain envelopes addressed to one rack or to every
// rack. `RackCommand` covers the firmware's known verbs and knows which
// acknowledgement each one produces.

use std::fmt;

use serde_json::{Map, Value};

use racklink_api::{OutboundFrame, SendCommandData};

use crate::model::{EventKind, TagAction};
use crate::session::AckPattern;

/// Literal device id the bus fans out to every rack.
pub const BROADCAST_TARGET: &str = "broadcast";

// ── CommandTarget ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandTarget {
    Device(String),
    Broadcast,
}

impl CommandTarget {
    pub fn device(id: impl Into<String>) -> Self {
        Self::Device(id.into())
    }

    /// Value sent in the `deviceId` field.
    pub fn as_wire(&self) -> &str {
        match self {
            Self::Device(id) => id,
            Self::Broadcast => BROADCAST_TARGET,
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::Device(id) => Some(id),
            Self::Broadcast => None,
        }
    }
}

impl From<&str> for CommandTarget {
    fn from(value: &str) -> Self {
        if value == BROADCAST_TARGET {
            Self::Broadcast
        } else {
            Self::Device(value.to_owned())
        }
    }
}

impl fmt::Display for CommandTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

// ── CommandEnvelope ──────────────────────────────────────────────────

/// One outbound command: target, verb and free-form arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEnvelope {
    pub target: CommandTarget,
    pub command: String,
    pub payload: Map<String, Value>,
}

impl CommandEnvelope {
    pub fn new(target: impl Into<CommandTarget>, command: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            command: command.into(),
            payload: Map::new(),
        }
    }

    /// Add one argument. Keys land next to `deviceId` and `command` on the wire.
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn to_frame(&self) -> OutboundFrame {
        OutboundFrame::SendCommand(SendCommandData {
            device_id: self.target.as_wire().to_owned(),
            command: self.command.clone(),
            payload: self.payload.clone(),
        })
    }
}

// ── RackCommand ──────────────────────────────────────────────────────

/// Commands understood by rack firmware.
#[derive(Debug, Clone, PartialEq)]
pub enum RackCommand {
    /// Zero the scale with the current load.
    Tare,
    /// Calibrate against a reference weight in grams.
    Calibrate { known_weight: f64 },
    ReadTag,
    WriteTag { ingredient: String },
    ClearTag,
    FormatTag,
    /// Blink the status LED.
    Identify,
    Restart,
}

impl RackCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tare => "tare",
            Self::Calibrate { .. } => "calibrate",
            Self::ReadTag => "readTag",
            Self::WriteTag { .. } => "writeTag",
            Self::ClearTag => "clearTag",
            Self::FormatTag => "formatTag",
            Self::Identify => "identify",
            Self::Restart => "restart",
        }
    }

    pub fn envelope(&self, target: impl Into<CommandTarget>) -> CommandEnvelope {
        let envelope = CommandEnvelope::new(target, self.name());
        match self {
            Self::Calibrate { known_weight } => envelope.with_arg("knownWeight", *known_weight),
            Self::WriteTag { ingredient } => envelope.with_arg("ingredient", ingredient.as_str()),
            _ => envelope,
        }
    }

    /// Tag action the firmware reports back for tag commands.
    pub fn tag_action(&self) -> Option<TagAction> {
        match self {
            Self::ReadTag => Some(TagAction::Read),
            Self::WriteTag { .. } => Some(TagAction::Write),
            Self::ClearTag => Some(TagAction::Clear),
            Self::FormatTag => Some(TagAction::Format),
            _ => None,
        }
    }

    /// Acknowledgement that settles this command when sent to `device_id`.
    pub fn expected_ack(&self, device_id: &str) -> AckPattern {
        let pattern = match self.tag_action() {
            Some(action) => AckPattern::new(EventKind::TagEvent).with_tag_action(action),
            None => AckPattern::new(EventKind::CommandResponse).with_command(self.name()),
        };
        pattern.for_device(device_id)
    }
}
