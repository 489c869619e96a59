//! `watch`: stream bus events to stdout until Ctrl-C or the link drops.

use std::io::Write;

use chrono::Local;
use owo_colors::OwoColorize;
use tokio::sync::broadcast::error::RecvError;

use racklink_core::{DisconnectReason, EventKind, InboundEvent, SessionState};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util;

/// Event filter built from `--kind` / `--device`.
pub struct EventFilter {
    kinds: Vec<EventKind>,
    device: Option<String>,
}

impl EventFilter {
    pub fn new(kinds: Vec<EventKind>, device: Option<String>) -> Self {
        Self { kinds, device }
    }

    pub fn accepts(&self, event: &InboundEvent) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind()) {
            return false;
        }
        match (&self.device, event.device_id()) {
            (None, _) => true,
            (Some(wanted), Some(id)) => wanted == id,
            (Some(_), None) => false,
        }
    }
}

pub async fn handle(args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let bus = util::bus_target(global)?;
    let session = util::connect(&bus).await?;
    let filter = EventFilter::new(args.kinds, args.device);
    let color = output::should_color(&global.color);

    let mut events = session.subscribe();
    let mut state = session.state();
    if !global.quiet {
        eprintln!("Watching {} (Ctrl-C to stop)", bus.url);
    }

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    if filter.accepts(&event) {
                        let line = render_event(&global.output, &event, color)?;
                        let mut stdout = std::io::stdout().lock();
                        writeln!(stdout, "{line}")?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "output fell behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            changed = state.changed() => {
                if changed.is_err() || state.borrow_and_update().is_terminated() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let ended = session.current_state();
    session.close().await;
    match ended {
        SessionState::Disconnected(Some(DisconnectReason::LinkLost(reason))) => {
            Err(CliError::Disconnected { reason })
        }
        _ => Ok(()),
    }
}

/// One event as a single output record.
pub fn render_event(
    format: &OutputFormat,
    event: &InboundEvent,
    color: bool,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(event, true),
        OutputFormat::Yaml => Ok(format!("---\n{}", serde_yaml::to_string(event)?)),
        OutputFormat::Table | OutputFormat::Plain => {
            let kind = event.kind().wire_name();
            let device = event.device_id().unwrap_or("-");
            let data = serde_json::to_value(event)?
                .get("data")
                .map(ToString::to_string)
                .unwrap_or_default();
            let time = Local::now().format("%H:%M:%S");
            if color {
                Ok(format!(
                    "{} {:<16} {:<14} {}",
                    time.dimmed(),
                    kind.cyan(),
                    device.yellow(),
                    data
                ))
            } else {
                Ok(format!("{time} {kind:<16} {device:<14} {data}"))
            }
        }
    }
}
