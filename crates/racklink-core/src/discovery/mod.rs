//! Multi-strategy LAN discovery.
//!
//! Three strategies feed one merged result:
//!
//! - **[`NameResolver`]**: probes a handful of well-known host names (and,
//!   tagged as fallback, remembered addresses) with a small concurrency cap.
//! - **[`SubnetSweeper`]**: enumerates `base.suffix:port` candidates over
//!   one or more /24 ranges.
//! - **[`DiscoveryCoordinator`]**: runs both at once, dedupes by device id
//!   and guards against overlapping runs.
//!
//! Every probe goes through a [`Prober`] and holds a permit from one shared
//! [`ProbeBudget`] while in flight, so the total number of open sockets is
//! bounded no matter how many strategies run.

pub mod budget;
pub mod coordinator;
pub mod resolver;
pub mod sweeper;

use std::future::Future;
use std::net::Ipv6Addr;
use std::time::Duration;

use futures_util::{Stream, StreamExt, stream};
use tracing::trace;

use racklink_api::{ProbeClient, ProbeResult};

use crate::model::{DiscoveredDevice, DiscoveryVia};

pub use budget::ProbeBudget;
pub use coordinator::DiscoveryCoordinator;
pub use resolver::NameResolver;
pub use sweeper::{SubnetSweeper, SweepProgress, likely_bases};

// ── Prober ───────────────────────────────────────────────────────────

/// Anything that can probe one `address:port`.
///
/// Implemented by [`ProbeClient`]; tests wrap it to count or script calls.
pub trait Prober: Send + Sync {
    fn probe(
        &self,
        address: &str,
        port: u16,
        timeout: Duration,
    ) -> impl Future<Output = ProbeResult> + Send;
}

impl Prober for ProbeClient {
    fn probe(
        &self,
        address: &str,
        port: u16,
        timeout: Duration,
    ) -> impl Future<Output = ProbeResult> + Send {
        ProbeClient::probe(self, address, port, timeout)
    }
}

// ── ProbeTarget ──────────────────────────────────────────────────────

/// One `address:port` candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbeTarget {
    pub address: String,
    pub port: u16,
}

impl ProbeTarget {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Parse `host`, `host:port`, `[v6]:port` or a bare IPv6 literal.
    ///
    /// A leading `http://` and trailing `/` are tolerated.
    pub fn parse(input: &str, default_port: u16) -> Option<Self> {
        let trimmed = input.trim();
        let trimmed = trimmed.strip_prefix("http://").unwrap_or(trimmed);
        let trimmed = trimmed.trim_end_matches('/');
        if trimmed.is_empty() {
            return None;
        }

        if let Some(rest) = trimmed.strip_prefix('[') {
            let (host, tail) = rest.split_once(']')?;
            host.parse::<Ipv6Addr>().ok()?;
            let port = match tail.strip_prefix(':') {
                Some(port) => port.parse().ok()?,
                None if tail.is_empty() => default_port,
                None => return None,
            };
            return Some(Self::new(host, port));
        }

        if trimmed.parse::<Ipv6Addr>().is_ok() {
            return Some(Self::new(trimmed, default_port));
        }

        match trimmed.split_once(':') {
            Some((host, port)) if !host.is_empty() => Some(Self::new(host, port.parse().ok()?)),
            Some(_) => None,
            None => Some(Self::new(trimmed, default_port)),
        }
    }
}

// ── Shared probe pipeline ────────────────────────────────────────────

/// Probe every target at most `concurrency` at a time, each holding a
/// budget permit while in flight. Yields one item per settled probe:
/// `Some` for a hit, `None` for any failure.
pub(crate) fn probe_targets<'a, P: Prober>(
    prober: &'a P,
    budget: &'a ProbeBudget,
    targets: Vec<ProbeTarget>,
    via: DiscoveryVia,
    timeout: Duration,
    concurrency: usize,
) -> impl Stream<Item = Option<DiscoveredDevice>> + 'a {
    stream::iter(targets)
        .map(move |target| async move {
            let _permit = budget.acquire().await?;
            match prober.probe(&target.address, target.port, timeout).await {
                ProbeResult::Success(payload) => Some(DiscoveredDevice::from_payload(
                    payload,
                    &target.address,
                    target.port,
                    via,
                )),
                other => {
                    trace!(
                        address = %target.address,
                        port = target.port,
                        outcome = other.label(),
                        "probe missed"
                    );
                    None
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
}
