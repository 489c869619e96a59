// ── Tag programming ──
//
// Write-confirmation protocol for a rack's NFC tag reader: send the tag
// command, then wait for the `nfcEvent` of the same action from the same
// rack. A failure reported in the event's `response` is a rejection.

use std::time::Duration;

use crate::command::{CommandTarget, RackCommand};
use crate::error::CommandError;
use crate::model::{InboundEvent, TagEvent};
use crate::session::RealtimeSession;

pub const DEFAULT_TAG_TIMEOUT: Duration = Duration::from_secs(15);

pub struct TagProgrammer {
    session: RealtimeSession,
    timeout: Duration,
}

impl TagProgrammer {
    pub fn new(session: RealtimeSession) -> Self {
        Self {
            session,
            timeout: DEFAULT_TAG_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn write_tag(&self, device_id: &str, ingredient: &str) -> Result<TagEvent, CommandError> {
        self.run(
            device_id,
            RackCommand::WriteTag {
                ingredient: ingredient.to_owned(),
            },
        )
        .await
    }

    pub async fn read_tag(&self, device_id: &str) -> Result<TagEvent, CommandError> {
        self.run(device_id, RackCommand::ReadTag).await
    }

    pub async fn clear_tag(&self, device_id: &str) -> Result<TagEvent, CommandError> {
        self.run(device_id, RackCommand::ClearTag).await
    }

    pub async fn format_tag(&self, device_id: &str) -> Result<TagEvent, CommandError> {
        self.run(device_id, RackCommand::FormatTag).await
    }

    async fn run(&self, device_id: &str, command: RackCommand) -> Result<TagEvent, CommandError> {
        let envelope = command.envelope(CommandTarget::device(device_id));
        let event = self
            .session
            .send_command_await(&envelope, command.expected_ack(device_id), self.timeout)
            .await?;
        match event.as_ref() {
            InboundEvent::TagEvent(tag) => Ok(tag.clone()),
            // expected_ack only ever matches tag events
            other => Err(CommandError::Rejected {
                reason: format!("unexpected {} acknowledgement", other.kind()),
            }),
        }
    }
}
