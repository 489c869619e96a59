// ── Subnet sweep ──
//
// Enumerates `base.suffix:port` candidates and probes each exactly once,
// bounded by the shared probe budget. Progress is published on a watch
// channel so a CLI spinner or UI can follow along.

use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::time::Duration;

use futures_util::{Stream, StreamExt, future};
use indexmap::IndexSet;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use racklink_api::IpLookup;

use super::{ProbeBudget, ProbeTarget, Prober, probe_targets};
use crate::model::{DeviceSet, DiscoveredDevice, DiscoveryVia};

/// Running tally of the current sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepProgress {
    pub probed: usize,
    pub total: usize,
    pub found: usize,
}

impl SweepProgress {
    pub fn is_complete(&self) -> bool {
        self.probed >= self.total
    }
}

pub struct SubnetSweeper<P> {
    prober: P,
    budget: ProbeBudget,
    progress: watch::Sender<SweepProgress>,
}

impl<P: Prober> SubnetSweeper<P> {
    pub fn new(prober: P, budget: ProbeBudget) -> Self {
        let (progress, _) = watch::channel(SweepProgress::default());
        Self {
            prober,
            budget,
            progress,
        }
    }

    pub fn progress(&self) -> watch::Receiver<SweepProgress> {
        self.progress.subscribe()
    }

    /// Every `base × suffix × port` combination, each once.
    ///
    /// Bases that are not three dotted octets are skipped.
    pub fn candidates<S: AsRef<str>>(
        bases: &[S],
        ports: &[u16],
        suffixes: RangeInclusive<u8>,
    ) -> Vec<ProbeTarget> {
        let bases: IndexSet<String> = bases
            .iter()
            .filter_map(|base| {
                let normalized = normalize_base(base.as_ref());
                if normalized.is_none() {
                    debug!(base = base.as_ref(), "skipping malformed sweep base");
                }
                normalized
            })
            .collect();
        let ports: IndexSet<u16> = ports.iter().copied().collect();

        let mut targets = Vec::with_capacity(bases.len() * suffixes.len() * ports.len());
        for base in &bases {
            for suffix in suffixes.clone() {
                for &port in &ports {
                    targets.push(ProbeTarget::new(format!("{base}.{suffix}"), port));
                }
            }
        }
        targets
    }

    /// Lazily probe `targets`, yielding hits as they settle and updating
    /// progress for every probe.
    pub fn sweep_stream(
        &self,
        targets: Vec<ProbeTarget>,
        timeout: Duration,
    ) -> impl Stream<Item = DiscoveredDevice> + '_ {
        self.progress.send_replace(SweepProgress {
            probed: 0,
            total: targets.len(),
            found: 0,
        });

        probe_targets(
            &self.prober,
            &self.budget,
            targets,
            DiscoveryVia::Sweep,
            timeout,
            self.budget.capacity(),
        )
        .inspect(|hit| {
            self.progress.send_modify(|p| {
                p.probed += 1;
                if hit.is_some() {
                    p.found += 1;
                }
            });
        })
        .filter_map(future::ready)
    }

    /// Sweep `bases × suffixes × ports` and return the racks found, deduped
    /// by device id.
    pub async fn sweep<S: AsRef<str>>(
        &self,
        bases: &[S],
        ports: &[u16],
        suffixes: RangeInclusive<u8>,
        timeout: Duration,
    ) -> Vec<DiscoveredDevice> {
        let targets = Self::candidates(bases, ports, suffixes);
        let total = targets.len();
        let found: DeviceSet = self.sweep_stream(targets, timeout).collect().await;
        info!(candidates = total, found = found.len(), "sweep finished");
        found.into_vec()
    }
}

// ── Base selection ───────────────────────────────────────────────────

/// Accept `a.b.c`, `a.b.c.`, `a.b.c.0` or `a.b.c.x` and return `a.b.c`.
pub fn normalize_base(input: &str) -> Option<String> {
    let trimmed = input.trim().trim_end_matches('.');
    let parts: Vec<&str> = trimmed.split('.').collect();
    let octets = match parts.as_slice() {
        [a, b, c] => [*a, *b, *c],
        [a, b, c, "0" | "x" | "*"] => [*a, *b, *c],
        _ => return None,
    };
    let mut out = Vec::with_capacity(3);
    for octet in octets {
        out.push(octet.parse::<u8>().ok()?.to_string());
    }
    Some(out.join("."))
}

fn base_of(ip: Ipv4Addr) -> String {
    let [a, b, c, _] = ip.octets();
    format!("{a}.{b}.{c}")
}

/// Sweep bases in likelihood order: the host's own LAN, then the /24 the
/// IP-echo service reports, then `fallback`.
///
/// The echo result seeds a base only when it is a private address. Behind
/// NAT a public echo service reports the router's public address, and that
/// /24 is never swept. Lookup failures only shorten the list.
pub async fn likely_bases<S: AsRef<str>>(
    lookup: Option<&IpLookup>,
    lookup_timeout: Duration,
    fallback: &[S],
) -> Vec<String> {
    let mut bases = IndexSet::new();

    match IpLookup::local_ipv4().await {
        Some(ip) if ip.is_private() => {
            debug!(%ip, "seeding sweep from local interface");
            bases.insert(base_of(ip));
        }
        Some(ip) => debug!(%ip, "local interface is not private, not seeding"),
        None => debug!("no local IPv4 route"),
    }

    if let Some(lookup) = lookup {
        match lookup.external_ipv4(lookup_timeout).await {
            Ok(ip) if ip.is_private() => {
                debug!(%ip, "seeding sweep from IP echo");
                bases.insert(base_of(ip));
            }
            Ok(ip) => debug!(%ip, "IP echo returned a public address, not seeding"),
            Err(e) => debug!(error = %e, "IP echo lookup failed"),
        }
    }

    bases.extend(fallback.iter().filter_map(|b| normalize_base(b.as_ref())));
    bases.into_iter().collect()
}
