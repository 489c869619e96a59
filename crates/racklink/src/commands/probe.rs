//! `probe`: ask one address whether it is a rack.

use std::time::Duration;

use racklink_api::{ProbeClient, ProbeResult, TransportConfig};
use racklink_core::{DiscoveredDevice, DiscoveryVia, ProbeTarget};

use crate::cli::{GlobalOpts, ProbeArgs};
use crate::error::CliError;
use crate::output;

/// Parse `address[:port]`, letting `--port` win.
pub fn target(address: &str, port: Option<u16>) -> Result<ProbeTarget, CliError> {
    let mut target = ProbeTarget::parse(address, 80).ok_or_else(|| CliError::Validation {
        field: "address".into(),
        reason: format!("'{address}' is not a host or host:port"),
    })?;
    if let Some(port) = port {
        target.port = port;
    }
    Ok(target)
}

/// Probe `target` once; anything but a discovery payload is "not found".
pub async fn probe_rack(target: &ProbeTarget, timeout: Duration) -> Result<DiscoveredDevice, CliError> {
    let client = ProbeClient::new(&TransportConfig::for_probing(timeout))
        .map_err(racklink_core::CoreError::from)?;
    let result = client.probe(&target.address, target.port, timeout).await;
    tracing::debug!(address = %target.address, port = target.port, outcome = result.label(), "probed");

    match result {
        ProbeResult::Success(payload) => Ok(DiscoveredDevice::from_payload(
            payload,
            &target.address,
            target.port,
            DiscoveryVia::Fallback,
        )),
        ProbeResult::Timeout => Err(CliError::RackNotFound {
            address: format!("{}:{}", target.address, target.port),
            outcome: format!("no answer within {}ms", timeout.as_millis()),
        }),
        ProbeResult::NetworkError(reason) | ProbeResult::ParseError(reason) => {
            Err(CliError::RackNotFound {
                address: format!("{}:{}", target.address, target.port),
                outcome: reason,
            })
        }
        ProbeResult::NonSuccess(status) => Err(CliError::RackNotFound {
            address: format!("{}:{}", target.address, target.port),
            outcome: format!("HTTP {status}"),
        }),
    }
}

pub async fn handle(args: ProbeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let ProbeArgs {
        address,
        port,
        timeout_ms,
    } = args;
    let target = target(&address, port)?;
    let device = probe_rack(&target, Duration::from_millis(timeout_ms)).await?;

    let out = output::render_single(&global.output, &device, detail, |d| d.device_id.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn detail(d: &DiscoveredDevice) -> String {
    output::detail_lines(&[
        ("Device ID", d.device_id.clone()),
        ("Address", d.endpoint()),
        ("Firmware", d.firmware_version.clone()),
        ("Weight", d.weight.map(|w| format!("{w:.1} g")).unwrap_or_default()),
        ("Status", d.status.clone().unwrap_or_default()),
        ("Tag", if d.tag_present { "present".into() } else { "none".into() }),
        ("Ingredient", d.ingredient.clone().unwrap_or_default()),
    ])
}
