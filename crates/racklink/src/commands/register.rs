//! `register`: probe a rack, then register it to the account over the bus.

use racklink_core::config::DEFAULT_PROBE_TIMEOUT;
use racklink_core::{RackMetadata, RegistrationConfirmation, RegistrationFlow};

use crate::cli::{GlobalOpts, RegisterArgs};
use crate::error::CliError;
use crate::output;

use super::{probe, util};

pub async fn handle(args: RegisterArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let bus = util::bus_target(global)?;
    let target = probe::target(&args.address, args.port)?;
    let device = probe::probe_rack(&target, DEFAULT_PROBE_TIMEOUT).await?;

    let mut metadata = RackMetadata::new(args.name);
    if let Some(location) = args.location {
        metadata = metadata.with_location(location);
    }

    let session = util::connect(&bus).await?;
    let result = RegistrationFlow::new(session.clone())
        .with_timeout(bus.ack_timeout)
        .register(&device, metadata)
        .await;
    session.close().await;
    let confirmation = result?;

    let out = output::render_single(&global.output, &confirmation, detail, |c| {
        c.device_id.clone()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn detail(c: &RegistrationConfirmation) -> String {
    format!("Registered {} as \"{}\"", c.device_id, c.name)
}
