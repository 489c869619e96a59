//! `discover`: run every discovery strategy once and list the racks found.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tabled::Tabled;

use racklink_core::discovery::sweeper::normalize_base;
use racklink_core::{DiscoveredDevice, DiscoveryConfig, DiscoveryCoordinator, SweepProgress};

use crate::cli::{DiscoverArgs, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
pub struct DeviceRow {
    #[tabled(rename = "Device ID")]
    pub id: String,
    #[tabled(rename = "Address")]
    pub address: String,
    #[tabled(rename = "Firmware")]
    pub firmware: String,
    #[tabled(rename = "Weight")]
    pub weight: String,
    #[tabled(rename = "Tag")]
    pub tag: String,
    #[tabled(rename = "Found via")]
    pub via: String,
}

impl From<&DiscoveredDevice> for DeviceRow {
    fn from(d: &DiscoveredDevice) -> Self {
        let tag = match (&d.ingredient, d.tag_present) {
            (Some(ingredient), _) => ingredient.clone(),
            (None, true) => "present".into(),
            (None, false) => "-".into(),
        };
        Self {
            id: d.device_id.clone(),
            address: d.endpoint(),
            firmware: d.firmware_version.clone(),
            weight: d.weight.map_or_else(|| "-".into(), |w| format!("{w:.1} g")),
            tag,
            via: d.via.to_string(),
        }
    }
}

// ── Config ──────────────────────────────────────────────────────────

/// Config file settings with command-line overrides applied.
pub fn discovery_config(args: DiscoverArgs) -> Result<DiscoveryConfig, CliError> {
    let cfg = util::load_config()?;
    let mut config = cfg.discovery.to_discovery_config()?;

    if let Some(ms) = args.timeout_ms {
        config.probe_timeout = Duration::from_millis(ms);
    }
    if args.no_sweep {
        config.sweep = false;
    }
    if args.no_lookup {
        config.external_lookup = false;
    }
    if !args.ports.is_empty() {
        config.ports = args.ports;
    }
    if !args.bases.is_empty() {
        config.base_addresses = args
            .bases
            .iter()
            .map(|base| {
                normalize_base(base).ok_or_else(|| CliError::Validation {
                    field: "--base".into(),
                    reason: format!("'{base}' is not an a.b.c prefix"),
                })
            })
            .collect::<Result<_, _>>()?;
    }
    config.known_addresses.extend(args.addresses);

    Ok(config)
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: DiscoverArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let config = discovery_config(args)?;
    let probe_timeout = config.probe_timeout;
    let coordinator = DiscoveryCoordinator::new(config)?;

    let spinner = spinner(global)?;
    let mut progress = coordinator.progress();
    let mut watching = spinner.is_some();
    let mut interrupted = false;

    let run = coordinator.discover(probe_timeout);
    tokio::pin!(run);

    let devices = loop {
        tokio::select! {
            result = &mut run => break result?,
            changed = progress.changed(), if watching => {
                if changed.is_err() {
                    watching = false;
                } else if let Some(bar) = &spinner {
                    bar.set_message(progress_message(&progress.borrow_and_update()));
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                tracing::info!("interrupted, keeping what was found so far");
                coordinator.stop();
            }
        }
    };

    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
    if devices.is_empty() && !global.quiet {
        eprintln!("No racks found.");
    }

    let out = output::render_list(
        &global.output,
        &devices,
        |d| DeviceRow::from(d),
        DiscoveredDevice::endpoint,
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn spinner(global: &GlobalOpts) -> Result<Option<ProgressBar>, CliError> {
    if global.quiet
        || !matches!(global.output, OutputFormat::Table)
        || !std::io::stderr().is_terminal()
    {
        return Ok(None);
    }
    let style = ProgressStyle::with_template("{spinner} {msg}")
        .map_err(|e| CliError::Internal(e.to_string()))?;
    let bar = ProgressBar::new_spinner().with_style(style);
    bar.set_message("Looking for racks...");
    bar.enable_steady_tick(Duration::from_millis(120));
    Ok(Some(bar))
}

fn progress_message(progress: &SweepProgress) -> String {
    format!(
        "Sweeping {}/{} addresses, {} found",
        progress.probed, progress.total, progress.found
    )
}
