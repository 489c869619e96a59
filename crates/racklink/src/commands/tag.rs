//! `tag`: program the NFC tag on a rack and wait for the firmware's report.

use racklink_core::{TagEvent, TagProgrammer};

use crate::cli::{GlobalOpts, TagArgs, TagCommand};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(args: TagArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let bus = util::bus_target(global)?;
    let session = util::connect(&bus).await?;
    let tags = TagProgrammer::new(session.clone()).with_timeout(bus.ack_timeout);

    let result = match args.command {
        TagCommand::Write { device, ingredient } => tags.write_tag(&device, &ingredient).await,
        TagCommand::Read { device } => tags.read_tag(&device).await,
        TagCommand::Clear { device } => tags.clear_tag(&device).await,
        TagCommand::Format { device } => tags.format_tag(&device).await,
    };
    session.close().await;
    let event = result?;

    let out = output::render_single(&global.output, &event, detail, |e| {
        e.ingredient.clone().unwrap_or_default()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn detail(e: &TagEvent) -> String {
    output::detail_lines(&[
        ("Device ID", e.device_id.clone()),
        ("Action", e.action.to_string()),
        ("Tag UID", e.tag_uid.clone().unwrap_or_default()),
        ("Ingredient", e.ingredient.clone().unwrap_or_default()),
    ])
}
