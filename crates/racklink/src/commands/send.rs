//! `send`: queue one command, optionally waiting for its acknowledgement.

use serde::Serialize;
use serde_json::Value;

use racklink_core::{AckPattern, CommandEnvelope, CommandTarget, InboundEvent};

use crate::cli::{GlobalOpts, SendArgs};
use crate::error::CliError;
use crate::output;

use super::util;

/// Build the envelope from positional args and `--arg` pairs.
pub fn envelope(target: &str, command: &str, args: Vec<(String, Value)>) -> CommandEnvelope {
    args.into_iter().fold(
        CommandEnvelope::new(CommandTarget::from(target), command),
        |envelope, (key, value)| envelope.with_arg(key, value),
    )
}

#[derive(Serialize)]
struct Sent<'a> {
    target: &'a str,
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ack: Option<&'a InboundEvent>,
}

pub async fn handle(args: SendArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let SendArgs {
        target,
        command,
        args,
        await_kind,
        timeout_ms,
    } = args;
    let bus = util::bus_target(global)?;
    let envelope = envelope(&target, &command, args);
    let session = util::connect(&bus).await?;

    let result = match await_kind {
        Some(kind) => {
            let mut ack = AckPattern::new(kind);
            if let Some(id) = envelope.target.device_id() {
                ack = ack.for_device(id);
            }
            session
                .send_command_await(&envelope, ack, util::ack_timeout(timeout_ms, &bus))
                .await
                .map(Some)
                .map_err(CliError::from)
        }
        None => session.send_command(&envelope).map(|()| None).map_err(CliError::from),
    };
    // close() drains the queue, so fire-and-forget frames still go out
    session.close().await;
    let ack = result?;

    let sent = Sent {
        target: envelope.target.as_wire(),
        command: &envelope.command,
        ack: ack.as_deref(),
    };
    let out = output::render_single(&global.output, &sent, detail, |s| s.command.to_owned())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn detail(sent: &Sent<'_>) -> String {
    match sent.ack {
        Some(ack) => format!("{} -> {}: acknowledged ({})", sent.command, sent.target, ack.kind()),
        None => format!("{} -> {}: sent", sent.command, sent.target),
    }
}
