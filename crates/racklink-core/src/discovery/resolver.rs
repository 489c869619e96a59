// ── Name resolution fast path ──
//
// Probes a short list of well-known names (or remembered addresses)
// directly. Most will not exist; only hits are surfaced.

use std::time::Duration;

use futures_util::{Stream, StreamExt, future};
use tracing::debug;

use super::{ProbeBudget, ProbeTarget, Prober, probe_targets};
use crate::config::DEFAULT_NAME_CONCURRENCY;
use crate::model::{DeviceSet, DiscoveredDevice, DiscoveryVia};

pub struct NameResolver<P> {
    prober: P,
    budget: ProbeBudget,
    concurrency: usize,
    default_port: u16,
}

impl<P: Prober> NameResolver<P> {
    pub fn new(prober: P, budget: ProbeBudget) -> Self {
        Self {
            prober,
            budget,
            concurrency: DEFAULT_NAME_CONCURRENCY,
            default_port: 80,
        }
    }

    /// Cap on this resolver's own in-flight probes (still bounded by the
    /// shared budget).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    /// Parse names into targets, dropping (and logging) unparseable ones.
    pub fn targets<S: AsRef<str>>(&self, names: &[S]) -> Vec<ProbeTarget> {
        names
            .iter()
            .filter_map(|name| {
                let parsed = ProbeTarget::parse(name.as_ref(), self.default_port);
                if parsed.is_none() {
                    debug!(name = name.as_ref(), "skipping unparseable discovery name");
                }
                parsed
            })
            .collect()
    }

    /// Lazily probe `targets`, yielding each hit as its probe settles.
    ///
    /// The stream ends once every probe has succeeded, failed or timed out.
    pub fn resolve_stream(
        &self,
        targets: Vec<ProbeTarget>,
        via: DiscoveryVia,
        timeout: Duration,
    ) -> impl Stream<Item = DiscoveredDevice> + '_ {
        probe_targets(
            &self.prober,
            &self.budget,
            targets,
            via,
            timeout,
            self.concurrency,
        )
        .filter_map(future::ready)
    }

    /// Probe each name once; return the racks that answered, deduped.
    pub async fn resolve_known_names<S: AsRef<str>>(
        &self,
        names: &[S],
        timeout: Duration,
    ) -> Vec<DiscoveredDevice> {
        self.collect(self.targets(names), DiscoveryVia::NameResolution, timeout)
            .await
    }

    /// Same as [`resolve_known_names`](Self::resolve_known_names) for
    /// remembered addresses; hits are tagged [`DiscoveryVia::Fallback`].
    pub async fn resolve_addresses<S: AsRef<str>>(
        &self,
        addresses: &[S],
        timeout: Duration,
    ) -> Vec<DiscoveredDevice> {
        self.collect(self.targets(addresses), DiscoveryVia::Fallback, timeout)
            .await
    }

    async fn collect(
        &self,
        targets: Vec<ProbeTarget>,
        via: DiscoveryVia,
        timeout: Duration,
    ) -> Vec<DiscoveredDevice> {
        let attempted = targets.len();
        let found: DeviceSet = self.resolve_stream(targets, via, timeout).collect().await;
        debug!(attempted, found = found.len(), %via, "name probes settled");
        found.into_vec()
    }
}
