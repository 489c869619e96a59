// ── Discovery coordinator ──
//
// Runs name resolution, known-address probing and the subnet sweep at the
// same time on the calling task and merges hits as they settle. One run at
// a time; `stop()` ends a run early and keeps what was already found.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures_util::{StreamExt, stream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use racklink_api::{IpLookup, ProbeClient, TransportConfig};

use super::{NameResolver, ProbeBudget, Prober, SubnetSweeper, SweepProgress, likely_bases};
use crate::config::DiscoveryConfig;
use crate::error::CoreError;
use crate::model::{DeviceSet, DiscoveredDevice, DiscoveryVia};

pub struct DiscoveryCoordinator<P = ProbeClient> {
    config: DiscoveryConfig,
    budget: ProbeBudget,
    resolver: NameResolver<P>,
    sweeper: SubnetSweeper<P>,
    ip_lookup: Option<IpLookup>,
    running: AtomicBool,
    /// Token of the current (or last) run.
    cancel: Mutex<CancellationToken>,
}

impl DiscoveryCoordinator<ProbeClient> {
    /// Build a coordinator with real HTTP probing.
    pub fn new(config: DiscoveryConfig) -> Result<Self, CoreError> {
        let prober = ProbeClient::new(&TransportConfig::for_probing(config.probe_timeout))?;
        let ip_lookup = if config.external_lookup {
            Some(IpLookup::new(
                &TransportConfig::default(),
                config.ip_echo_url.clone(),
            )?)
        } else {
            None
        };
        Ok(Self::with_prober(config, prober, ip_lookup))
    }
}

impl<P: Prober + Clone> DiscoveryCoordinator<P> {
    pub fn with_prober(config: DiscoveryConfig, prober: P, ip_lookup: Option<IpLookup>) -> Self {
        let budget = ProbeBudget::new(config.max_in_flight);
        let resolver = NameResolver::new(prober.clone(), budget.clone())
            .with_concurrency(config.name_concurrency)
            .with_default_port(config.default_port());
        let sweeper = SubnetSweeper::new(prober, budget.clone());

        Self {
            config,
            budget,
            resolver,
            sweeper,
            ip_lookup,
            running: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// The budget shared by every strategy of this coordinator.
    pub fn budget(&self) -> &ProbeBudget {
        &self.budget
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Sweep progress of the current run.
    pub fn progress(&self) -> watch::Receiver<SweepProgress> {
        self.sweeper.progress()
    }

    /// Ask the current run to finish now. In-flight probes are dropped and
    /// `discover` returns what it already has. No-op when idle.
    pub fn stop(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    /// Run every enabled strategy once with a per-probe `timeout`.
    ///
    /// Finding nothing is `Ok(vec![])`. Fails only if another run is
    /// already in progress on this coordinator.
    pub async fn discover(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, CoreError> {
        let token = {
            // The flag and the token change under one lock.
            let mut current = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
            if self
                .running
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return Err(CoreError::DiscoveryInProgress);
            }
            let token = CancellationToken::new();
            *current = token.clone();
            token
        };
        let _guard = RunGuard(&self.running);

        let started = Instant::now();
        let names = self.resolver.targets(&self.config.names);
        let known = self.resolver.targets(&self.config.known_addresses);
        debug!(
            names = names.len(),
            known = known.len(),
            sweep = self.config.sweep,
            "discovery started"
        );

        let by_name = self
            .resolver
            .resolve_stream(names, DiscoveryVia::NameResolution, timeout)
            .boxed_local();
        let by_address = self
            .resolver
            .resolve_stream(known, DiscoveryVia::Fallback, timeout)
            .boxed_local();
        let by_sweep = if self.config.sweep {
            stream::once(self.sweep_bases())
                .flat_map(move |bases| {
                    let targets = SubnetSweeper::<P>::candidates(
                        &bases,
                        &self.config.ports,
                        self.config.suffixes.clone(),
                    );
                    self.sweeper.sweep_stream(targets, timeout)
                })
                .boxed_local()
        } else {
            stream::empty().boxed_local()
        };

        // Hits are merged in the order they settle; the first one per id wins.
        let mut hits = stream::select_all([by_name, by_address, by_sweep]);
        let mut merged = DeviceSet::new();
        let cancelled = loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break true,
                hit = hits.next() => match hit {
                    Some(device) => {
                        merged.insert(device);
                    }
                    None => break false,
                },
            }
        };

        info!(
            found = merged.len(),
            cancelled,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "discovery finished"
        );
        Ok(merged.into_vec())
    }

    async fn sweep_bases(&self) -> Vec<String> {
        if !self.config.base_addresses.is_empty() {
            return self.config.base_addresses.clone();
        }
        likely_bases(
            self.ip_lookup.as_ref(),
            self.config.lookup_timeout,
            &self.config.fallback_bases,
        )
        .await
    }
}

/// Clears the in-progress flag however `discover` exits.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
