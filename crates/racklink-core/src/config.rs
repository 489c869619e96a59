// ── Runtime configuration ──
//
// These types describe *how* to discover racks and talk to the bus. They
// never touch disk: racklink-config (or a test) builds them and hands
// them in.

use std::ops::RangeInclusive;
use std::time::Duration;

use racklink_api::ip_lookup::DEFAULT_IP_ECHO_URL;

/// Host names rack firmware answers to out of the box.
pub const DEFAULT_NAMES: &[&str] = &["smartrack.local", "rack.local", "smartshelf.local"];

/// Private /24 ranges swept when nothing better is known.
pub const DEFAULT_FALLBACK_BASES: &[&str] = &[
    "192.168.1",
    "192.168.0",
    "192.168.4",
    "10.0.0",
    "10.0.1",
    "172.16.0",
];

pub const DEFAULT_PORTS: &[u16] = &[80];
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1500);
pub const DEFAULT_MAX_IN_FLIGHT: usize = 50;
pub const DEFAULT_NAME_CONCURRENCY: usize = 8;

/// Everything a discovery run needs.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Names probed first (`host` or `host:port`).
    pub names: Vec<String>,
    /// Remembered addresses probed directly (`addr` or `addr:port`).
    pub known_addresses: Vec<String>,
    /// Explicit sweep bases (`a.b.c`). Empty means "guess".
    pub base_addresses: Vec<String>,
    /// Bases appended after the guessed ones.
    pub fallback_bases: Vec<String>,
    pub ports: Vec<u16>,
    pub suffixes: RangeInclusive<u8>,
    pub probe_timeout: Duration,
    /// Shared cap on in-flight probes across every strategy.
    pub max_in_flight: usize,
    /// Per-resolver cap, applied under the shared one.
    pub name_concurrency: usize,
    pub sweep: bool,
    pub external_lookup: bool,
    pub ip_echo_url: String,
    pub lookup_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            names: DEFAULT_NAMES.iter().map(ToString::to_string).collect(),
            known_addresses: Vec::new(),
            base_addresses: Vec::new(),
            fallback_bases: DEFAULT_FALLBACK_BASES
                .iter()
                .map(ToString::to_string)
                .collect(),
            ports: DEFAULT_PORTS.to_vec(),
            suffixes: 1..=254,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            name_concurrency: DEFAULT_NAME_CONCURRENCY,
            sweep: true,
            external_lookup: true,
            ip_echo_url: DEFAULT_IP_ECHO_URL.to_owned(),
            lookup_timeout: Duration::from_secs(2),
        }
    }
}

impl DiscoveryConfig {
    /// Port used when a name or address carries none.
    pub fn default_port(&self) -> u16 {
        self.ports.first().copied().unwrap_or(80)
    }
}

/// Tuning for a [`RealtimeSession`](crate::RealtimeSession).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    /// How long to wait for `authenticated` after sending `authenticate`.
    pub auth_timeout: Duration,
    /// Capacity of the broadcast channel behind `subscribe()`.
    pub event_buffer: usize,
    /// How long `close()` lets queued frames drain before cutting the link.
    pub close_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            auth_timeout: Duration::from_secs(10),
            event_buffer: 256,
            close_grace: Duration::from_secs(2),
        }
    }
}
