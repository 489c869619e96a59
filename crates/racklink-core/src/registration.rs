// ── Device registration ──
//
// Binds a discovered rack to the signed-in account: one `registerDevice`
// frame, correlated on the bus's `deviceRegistered` reply.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use racklink_api::{OutboundFrame, RegisterDeviceData};

use crate::error::CommandError;
use crate::model::{DiscoveredDevice, EventKind, InboundEvent};
use crate::session::{AckPattern, RealtimeSession};

pub const DEFAULT_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(10);

/// What the user says about the rack they are adding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RackMetadata {
    pub name: String,
    pub location: Option<String>,
    /// Extra fields forwarded verbatim in the `registerDevice` body.
    pub extra: Map<String, Value>,
}

impl RackMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Accepted registration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationConfirmation {
    /// Always the id that was sent.
    pub device_id: String,
    pub name: String,
    #[serde(skip)]
    pub ack: Arc<InboundEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("no response from server")]
    NoResponse,
    #[error("server rejected: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<CommandError> for RegistrationError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Timeout { .. } => Self::NoResponse,
            CommandError::Rejected { reason } => Self::Rejected(reason),
            CommandError::SessionClosed => Self::Transport(err.to_string()),
        }
    }
}

pub struct RegistrationFlow {
    session: RealtimeSession,
    timeout: Duration,
}

impl RegistrationFlow {
    pub fn new(session: RealtimeSession) -> Self {
        Self {
            session,
            timeout: DEFAULT_REGISTRATION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn register(
        &self,
        device: &DiscoveredDevice,
        metadata: RackMetadata,
    ) -> Result<RegistrationConfirmation, RegistrationError> {
        let frame = OutboundFrame::RegisterDevice(RegisterDeviceData {
            device_id: device.device_id.clone(),
            name: metadata.name.clone(),
            location: metadata.location,
            ip_address: device.address.clone(),
            port: device.port,
            firmware_version: Some(device.firmware_version.clone()),
            extra: metadata.extra,
        });
        let ack = AckPattern::new(EventKind::DeviceRegistered).for_device(&device.device_id);

        let ack = self
            .session
            .send_frame_await(frame, ack, self.timeout)
            .await?;

        info!(device_id = %device.device_id, name = %metadata.name, "rack registered");
        Ok(RegistrationConfirmation {
            device_id: device.device_id.clone(),
            name: metadata.name,
            ack,
        })
    }
}
