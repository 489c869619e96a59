#![allow(clippy::unwrap_used)]

// Integration tests for the discovery engine: sweeps against wiremock
// racks, and budget/merge/lifecycle behaviour against a scripted prober
// on a paused clock.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use racklink_api::{DiscoveryPayload, IpLookup, ProbeClient, ProbeResult, TransportConfig};
use racklink_core::discovery::likely_bases;
use racklink_core::{
    CoreError, DiscoveryConfig, DiscoveryCoordinator, DiscoveryVia, NameResolver, ProbeBudget,
    Prober, SubnetSweeper, SweepProgress,
};

// ── Helpers ─────────────────────────────────────────────────────────

/// Prober answering from a script of `address:port -> (device id, delay)`.
/// Unscripted targets hang until the probe timeout. Tracks peak concurrency.
#[derive(Clone, Default)]
struct ScriptedProber {
    hits: Arc<HashMap<String, (String, Duration)>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedProber {
    fn new(hits: &[(&str, &str, u64)]) -> Self {
        let hits = hits
            .iter()
            .map(|(target, id, delay_ms)| {
                (
                    (*target).to_owned(),
                    ((*id).to_owned(), Duration::from_millis(*delay_ms)),
                )
            })
            .collect();
        Self {
            hits: Arc::new(hits),
            ..Self::default()
        }
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Prober for ScriptedProber {
    fn probe(
        &self,
        address: &str,
        port: u16,
        timeout: Duration,
    ) -> impl Future<Output = ProbeResult> + Send {
        let this = self.clone();
        let key = format!("{address}:{port}");
        async move {
            this.calls.fetch_add(1, Ordering::SeqCst);
            let now = this.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            this.peak.fetch_max(now, Ordering::SeqCst);

            let result = match this.hits.get(&key) {
                Some((id, delay)) if *delay <= timeout => {
                    tokio::time::sleep(*delay).await;
                    ProbeResult::Success(payload(id))
                }
                _ => {
                    tokio::time::sleep(timeout).await;
                    ProbeResult::Timeout
                }
            };

            this.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }
}

fn payload(id: &str) -> DiscoveryPayload {
    DiscoveryPayload {
        device_id: id.to_owned(),
        firmware_version: "2.0.1".into(),
        current_weight: Some(250.0),
        current_status: None,
        tag_present: Some(true),
        current_ingredient: None,
    }
}

fn quiet_config() -> DiscoveryConfig {
    DiscoveryConfig {
        names: Vec::new(),
        known_addresses: Vec::new(),
        base_addresses: vec!["10.9.8".into()],
        fallback_bases: Vec::new(),
        suffixes: 1..=5,
        external_lookup: false,
        ..DiscoveryConfig::default()
    }
}

async fn rack_server(device_id: &str, delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/discovery"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "deviceId": device_id, "firmwareVersion": "1.0.0" }))
                .set_delay(delay),
        )
        .mount(&server)
        .await;
    server
}

// ── Sweeper ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_sweep_returns_only_answering_racks() {
    let a = rack_server("rack-a", Duration::ZERO).await;
    let b = rack_server("rack-b", Duration::from_secs(5)).await;
    let c = rack_server("rack-c", Duration::ZERO).await;
    let d = rack_server("rack-d", Duration::from_secs(5)).await;
    let ports: Vec<u16> = [&a, &b, &c, &d].iter().map(|s| s.address().port()).collect();

    let prober = ProbeClient::new(&TransportConfig::for_probing(Duration::from_secs(10))).unwrap();
    let sweeper = SubnetSweeper::new(prober, ProbeBudget::new(50));

    let started = Instant::now();
    let mut found = sweeper
        .sweep(&["127.0.0"], &ports, 1..=1, Duration::from_millis(500))
        .await;
    let elapsed = started.elapsed();

    found.sort_by(|x, y| x.device_id.cmp(&y.device_id));
    let ids: Vec<&str> = found.iter().map(|d| d.device_id.as_str()).collect();
    assert_eq!(ids, vec!["rack-a", "rack-c"]);
    assert!(found.iter().all(|d| d.via == DiscoveryVia::Sweep));
    assert!(elapsed < Duration::from_millis(1500), "sweep took {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_sweep_reports_progress() {
    let prober = ScriptedProber::new(&[("10.0.0.3:80", "rack-3", 20)]);
    let sweeper = SubnetSweeper::new(prober.clone(), ProbeBudget::new(8));
    let progress = sweeper.progress();

    let found = sweeper
        .sweep(&["10.0.0"], &[80], 1..=10, Duration::from_millis(100))
        .await;

    assert_eq!(found.len(), 1);
    assert_eq!(
        *progress.borrow(),
        SweepProgress {
            probed: 10,
            total: 10,
            found: 1
        }
    );
    assert!(progress.borrow().is_complete());
    assert_eq!(prober.calls(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_same_rack_on_two_ports_is_reported_once() {
    let prober = ScriptedProber::new(&[("10.0.0.7:80", "rack-7", 10), ("10.0.0.7:8080", "rack-7", 30)]);
    let sweeper = SubnetSweeper::new(prober, ProbeBudget::new(8));

    let found = sweeper
        .sweep(&["10.0.0"], &[80, 8080], 1..=10, Duration::from_millis(100))
        .await;

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].device_id, "rack-7");
}

#[test]
fn test_candidates_dedupe_bases_and_ports() {
    let targets = SubnetSweeper::<ScriptedProber>::candidates(
        &["192.168.1", "192.168.1.0", "bogus"],
        &[80, 80, 8080],
        1..=3,
    );
    assert_eq!(targets.len(), 6);
    assert_eq!(targets[0].address, "192.168.1.1");
    assert_eq!(targets[0].port, 80);
    assert_eq!(targets[1].port, 8080);
}

// ── Shared budget ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_strategies_together_never_exceed_the_budget() {
    let prober = ScriptedProber::new(&[("10.0.2.9:80", "rack-9", 5)]);
    let budget = ProbeBudget::new(50);
    let sweeper = SubnetSweeper::new(prober.clone(), budget.clone());
    let resolver = NameResolver::new(prober.clone(), budget.clone()).with_concurrency(20);

    let names: Vec<String> = (0..30).map(|i| format!("shelf-{i}.local")).collect();
    let timeout = Duration::from_millis(200);

    let (swept, resolved) = tokio::join!(
        sweeper.sweep(&["10.0.0", "10.0.1", "10.0.2", "10.0.3"], &[80], 1..=50, timeout),
        resolver.resolve_known_names(&names, timeout),
    );

    assert_eq!(prober.calls(), 230);
    assert!(prober.peak() <= 50, "peak in flight was {}", prober.peak());
    assert_eq!(prober.peak(), 50);
    assert_eq!(budget.in_flight(), 0);
    assert_eq!(swept.len(), 1);
    assert!(resolved.is_empty());
}

// ── NameResolver ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_resolver_tags_names_and_addresses() {
    let prober = ScriptedProber::new(&[
        ("smartrack.local:80", "rack-1", 10),
        ("192.168.1.40:8080", "rack-2", 10),
    ]);
    let resolver = NameResolver::new(prober, ProbeBudget::new(4));
    let timeout = Duration::from_millis(100);

    let named = resolver
        .resolve_known_names(&["smartrack.local", "rack.local", "::not a host"], timeout)
        .await;
    assert_eq!(named.len(), 1);
    assert_eq!(named[0].via, DiscoveryVia::NameResolution);
    assert_eq!(named[0].endpoint(), "smartrack.local:80");

    let remembered = resolver
        .resolve_addresses(&["192.168.1.40:8080"], timeout)
        .await;
    assert_eq!(remembered.len(), 1);
    assert_eq!(remembered[0].via, DiscoveryVia::Fallback);
    assert_eq!(remembered[0].port, 8080);
}

// ── Coordinator ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_first_settled_hit_wins_across_strategies() {
    let prober = ScriptedProber::new(&[
        // rack-1: the sweep answers long before the name
        ("smartrack.local:80", "rack-1", 150),
        ("10.9.8.2:80", "rack-1", 5),
        // rack-3: the name answers before the sweep
        ("rack.local:80", "rack-3", 5),
        ("10.9.8.3:80", "rack-3", 50),
    ]);
    let config = DiscoveryConfig {
        names: vec!["smartrack.local".into(), "rack.local".into()],
        ..quiet_config()
    };
    let coordinator = DiscoveryCoordinator::with_prober(config, prober, None);

    let mut found = coordinator.discover(Duration::from_millis(200)).await.unwrap();
    found.sort_by(|a, b| a.device_id.cmp(&b.device_id));

    assert_eq!(found.len(), 2);
    assert_eq!(found[0].device_id, "rack-1");
    assert_eq!(found[0].endpoint(), "10.9.8.2:80");
    assert_eq!(found[0].via, DiscoveryVia::Sweep);
    assert_eq!(found[1].device_id, "rack-3");
    assert_eq!(found[1].endpoint(), "rack.local:80");
    assert_eq!(found[1].via, DiscoveryVia::NameResolution);
    assert!(!coordinator.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_known_address_answering_first_wins_over_sweep_hit() {
    let prober = ScriptedProber::new(&[
        ("10.9.8.4:8080", "rack-4", 5),
        ("10.9.8.2:80", "rack-4", 40),
    ]);
    let config = DiscoveryConfig {
        known_addresses: vec!["10.9.8.4:8080".into()],
        ..quiet_config()
    };
    let coordinator = DiscoveryCoordinator::with_prober(config, prober, None);

    let found = coordinator.discover(Duration::from_millis(200)).await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].via, DiscoveryVia::Fallback);
    assert_eq!(found[0].endpoint(), "10.9.8.4:8080");
}

#[tokio::test(start_paused = true)]
async fn test_nothing_answers_is_an_empty_success() {
    let prober = ScriptedProber::default();
    let config = DiscoveryConfig {
        names: vec!["smartrack.local".into()],
        ..quiet_config()
    };
    let coordinator = DiscoveryCoordinator::with_prober(config, prober.clone(), None);

    let found = coordinator.discover(Duration::from_millis(100)).await.unwrap();

    assert!(found.is_empty());
    assert_eq!(prober.calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_run_is_refused() {
    let prober = ScriptedProber::new(&[("10.9.8.1:80", "rack-1", 500)]);
    let coordinator = DiscoveryCoordinator::with_prober(quiet_config(), prober, None);
    let timeout = Duration::from_secs(1);

    let (first, second) = tokio::join!(coordinator.discover(timeout), async {
        tokio::task::yield_now().await;
        coordinator.discover(timeout).await
    });

    assert_eq!(first.unwrap().len(), 1);
    assert!(matches!(second, Err(CoreError::DiscoveryInProgress)));

    // The flag clears once the first run is done.
    assert!(coordinator.discover(timeout).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_stop_keeps_partial_results() {
    let prober = ScriptedProber::new(&[
        ("smartrack.local:80", "rack-fast", 10),
        ("10.9.8.1:80", "rack-slow", 20_000),
    ]);
    let config = DiscoveryConfig {
        names: vec!["smartrack.local".into()],
        ..quiet_config()
    };
    let coordinator = DiscoveryCoordinator::with_prober(config, prober, None);

    let started = tokio::time::Instant::now();
    let (found, ()) = tokio::join!(coordinator.discover(Duration::from_secs(30)), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        coordinator.stop();
    });
    let found = found.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].device_id, "rack-fast");
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!coordinator.is_running());
    assert_eq!(coordinator.budget().in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_right_after_start_ends_the_new_run() {
    let prober = ScriptedProber::new(&[("10.9.8.1:80", "rack-slow", 20_000)]);
    let coordinator = DiscoveryCoordinator::with_prober(quiet_config(), prober, None);

    // A stop from an earlier, finished run must not leak into this one.
    coordinator.stop();
    let started = tokio::time::Instant::now();
    let (found, ()) = tokio::join!(coordinator.discover(Duration::from_secs(30)), async {
        tokio::task::yield_now().await;
        assert!(coordinator.is_running());
        coordinator.stop();
    });

    assert!(found.unwrap().is_empty());
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!coordinator.is_running());
}

// ── Base selection ──────────────────────────────────────────────────

async fn echo_server(ip: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ip"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ip": ip })))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_private_echo_address_is_swept_before_fallbacks() {
    let server = echo_server("10.77.3.12").await;
    let lookup = IpLookup::new(&TransportConfig::default(), format!("{}/ip", server.uri())).unwrap();

    let bases = likely_bases(Some(&lookup), Duration::from_secs(2), &["192.168.250", "10.77.3"]).await;

    let echo = bases.iter().position(|b| b == "10.77.3").unwrap();
    let fallback = bases.iter().position(|b| b == "192.168.250").unwrap();
    assert!(echo < fallback);
    assert_eq!(bases.iter().filter(|b| *b == "10.77.3").count(), 1);
}

#[tokio::test]
async fn test_public_echo_address_is_not_swept() {
    let server = echo_server("203.0.113.9").await;
    let lookup = IpLookup::new(&TransportConfig::default(), format!("{}/ip", server.uri())).unwrap();

    let bases = likely_bases(Some(&lookup), Duration::from_secs(2), &["192.168.250"]).await;

    assert!(!bases.iter().any(|b| b == "203.0.113"));
    assert_eq!(bases.last().map(String::as_str), Some("192.168.250"));
}

#[tokio::test]
async fn test_failed_echo_lookup_falls_through_to_fallbacks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ip"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    let lookup = IpLookup::new(&TransportConfig::default(), format!("{}/ip", server.uri())).unwrap();

    let bases = likely_bases(
        Some(&lookup),
        Duration::from_secs(2),
        &["192.168.250", "10.250.1", "172.31.250"],
    )
    .await;

    // Only the local interface base may precede the fallbacks.
    let tail: Vec<&str> = bases.iter().rev().take(3).rev().map(String::as_str).collect();
    assert_eq!(tail, vec!["192.168.250", "10.250.1", "172.31.250"]);
    assert!(bases.len() <= 4, "unexpected bases: {bases:?}");
    server.verify().await;
}

#[tokio::test]
async fn test_unreachable_echo_service_falls_through_to_fallbacks() {
    // Port 9 on loopback is closed on any sane test machine.
    let lookup = IpLookup::new(&TransportConfig::default(), "http://127.0.0.1:9/ip").unwrap();

    let bases = likely_bases(Some(&lookup), Duration::from_secs(2), &["192.168.250", "10.250.1"]).await;

    let tail: Vec<&str> = bases.iter().rev().take(2).rev().map(String::as_str).collect();
    assert_eq!(tail, vec!["192.168.250", "10.250.1"]);
    assert!(bases.len() <= 3, "unexpected bases: {bases:?}");
}
