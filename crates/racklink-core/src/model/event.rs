// ── Inbound bus events ──
//
// Typed view over the frames the bus relays from rack firmware. Decoding
// is lenient: optional fields may be missing, unknown fields are kept in
// `extra`, and numeric ids are accepted where strings are expected.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use racklink_api::RawFrame;

/// Payload-free discriminant of [`InboundEvent`].
///
/// `Display`/`FromStr` use the wire event names.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum EventKind {
    Authenticated,
    #[serde(rename = "update")]
    #[strum(serialize = "update")]
    TelemetryUpdate,
    DeviceStatus,
    Alert,
    CommandResponse,
    DeviceRegistered,
    #[serde(rename = "nfcEvent")]
    #[strum(serialize = "nfcEvent")]
    TagEvent,
}

impl EventKind {
    /// Event name as it appears in the `event` field of a frame.
    pub fn wire_name(self) -> &'static str {
        self.into()
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        name.parse().ok()
    }
}

// ── Payloads ─────────────────────────────────────────────────────────

/// `update`: live shelf reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryUpdate {
    #[serde(deserialize_with = "string_or_number")]
    pub device_id: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub slot_id: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub ingredient: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `deviceStatus`: online/offline transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    #[serde(deserialize_with = "string_or_number")]
    pub device_id: String,
    pub is_online: bool,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub last_seen: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub device_id: Option<String>,
    #[serde(default, rename = "type")]
    pub alert_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `commandResponse`: firmware's answer to a `sendCommand`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub device_id: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `deviceRegistered`: the bus accepted or refused a `registerDevice`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationAck {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub device_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Hardware tag interaction kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TagAction {
    Read,
    Write,
    #[serde(alias = "remove")]
    Removed,
    Clear,
    Format,
}

/// `nfcEvent`: tag read/write/remove/clear/format report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagEvent {
    #[serde(deserialize_with = "string_or_number")]
    pub device_id: String,
    #[serde(rename = "type")]
    pub action: TagAction,
    #[serde(default, rename = "tagUID", alias = "tagUid")]
    pub tag_uid: Option<String>,
    #[serde(default)]
    pub ingredient: Option<String>,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TagEvent {
    /// Failure reason carried in `response`, if the firmware reported one.
    pub fn failure(&self) -> Option<String> {
        match self.response.as_ref()? {
            Value::String(text) => {
                let lower = text.to_ascii_lowercase();
                (lower.contains("fail") || lower.contains("error")).then(|| text.clone())
            }
            Value::Object(map) => negative_outcome(
                map.get("success").and_then(Value::as_bool),
                map.get("error").and_then(Value::as_str),
            ),
            Value::Bool(false) => Some("tag operation failed".into()),
            _ => None,
        }
    }
}

// ── InboundEvent ─────────────────────────────────────────────────────

/// A decoded inbound event. Dispatched behind `Arc`, never mutated.
///
/// Serializes back into the `{"event", "data"}` frame shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum InboundEvent {
    Authenticated {
        #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    #[serde(rename = "update")]
    TelemetryUpdate(TelemetryUpdate),
    DeviceStatus(DeviceStatus),
    Alert(Alert),
    CommandResponse(CommandResponse),
    DeviceRegistered(RegistrationAck),
    #[serde(rename = "nfcEvent")]
    TagEvent(TagEvent),
}

impl InboundEvent {
    /// Decode a frame. Unknown event names yield `Ok(None)`.
    pub fn from_frame(frame: &RawFrame) -> Result<Option<Self>, serde_json::Error> {
        let Some(kind) = EventKind::from_wire(&frame.event) else {
            return Ok(None);
        };
        let data = match &frame.data {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };

        let event = match kind {
            EventKind::Authenticated => Self::Authenticated {
                user_id: data.get("userId").and_then(Value::as_str).map(String::from),
            },
            EventKind::TelemetryUpdate => Self::TelemetryUpdate(serde_json::from_value(data)?),
            EventKind::DeviceStatus => Self::DeviceStatus(serde_json::from_value(data)?),
            EventKind::Alert => Self::Alert(serde_json::from_value(data)?),
            EventKind::CommandResponse => Self::CommandResponse(serde_json::from_value(data)?),
            EventKind::DeviceRegistered => Self::DeviceRegistered(serde_json::from_value(data)?),
            EventKind::TagEvent => Self::TagEvent(serde_json::from_value(data)?),
        };
        Ok(Some(event))
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Authenticated { .. } => EventKind::Authenticated,
            Self::TelemetryUpdate(_) => EventKind::TelemetryUpdate,
            Self::DeviceStatus(_) => EventKind::DeviceStatus,
            Self::Alert(_) => EventKind::Alert,
            Self::CommandResponse(_) => EventKind::CommandResponse,
            Self::DeviceRegistered(_) => EventKind::DeviceRegistered,
            Self::TagEvent(_) => EventKind::TagEvent,
        }
    }

    /// Device the event is about, when the frame names one.
    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::Authenticated { .. } => None,
            Self::TelemetryUpdate(e) => Some(&e.device_id),
            Self::DeviceStatus(e) => Some(&e.device_id),
            Self::TagEvent(e) => Some(&e.device_id),
            Self::Alert(e) => e.device_id.as_deref(),
            Self::CommandResponse(e) => e.device_id.as_deref(),
            Self::DeviceRegistered(e) => e.device_id.as_deref(),
        }
    }

    /// Reason text when this event is a negative acknowledgement.
    pub fn rejection(&self) -> Option<String> {
        match self {
            Self::CommandResponse(e) => negative_outcome(e.success, e.error.as_deref()),
            Self::DeviceRegistered(e) => negative_outcome(e.success, e.error.as_deref()),
            Self::TagEvent(e) => e.failure(),
            _ => None,
        }
    }
}

fn negative_outcome(success: Option<bool>, error: Option<&str>) -> Option<String> {
    match (success, error) {
        (_, Some(error)) if !error.is_empty() => Some(error.to_owned()),
        (Some(false), _) => Some("no reason given".into()),
        _ => None,
    }
}

// ── Lenient field decoding ───────────────────────────────────────────

fn string_or_number<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    match Value::deserialize(de)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn opt_string_or_number<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(de)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}
