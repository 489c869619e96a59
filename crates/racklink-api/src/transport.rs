// Shared transport configuration for building reqwest::Client instances.
//
// The discovery probe client and the external IP lookup share timeout,
// proxy, and user-agent settings through this module, avoiding duplicated
// builder logic.

use std::time::Duration;

const USER_AGENT: &str = concat!("racklink/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound for a whole request. Probes apply their own, tighter
    /// deadline on top of this.
    pub timeout: Duration,
    /// Upper bound for the TCP connect phase.
    pub connect_timeout: Duration,
    /// Route requests through system proxies. Off by default: LAN devices
    /// are never reachable through an HTTP proxy.
    pub use_system_proxy: bool,
    /// Max idle connections kept per host. Sweeps touch each host once, so
    /// pooling only wastes sockets.
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(3),
            use_system_proxy: false,
            pool_max_idle_per_host: 0,
        }
    }
}

impl TransportConfig {
    /// Transport tuned for probing many short-lived LAN hosts.
    pub fn for_probing(probe_timeout: Duration) -> Self {
        Self {
            timeout: probe_timeout,
            connect_timeout: probe_timeout,
            ..Self::default()
        }
    }

    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .user_agent(USER_AGENT);

        if !self.use_system_proxy {
            builder = builder.no_proxy();
        }

        builder
            .build()
            .map_err(|e| crate::error::Error::ClientSetup(format!("failed to build HTTP client: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_disables_proxy_and_pooling() {
        let config = TransportConfig::default();
        assert!(!config.use_system_proxy);
        assert_eq!(config.pool_max_idle_per_host, 0);
    }

    #[test]
    fn probing_profile_uses_probe_timeout_for_connect() {
        let config = TransportConfig::for_probing(Duration::from_millis(800));
        assert_eq!(config.timeout, Duration::from_millis(800));
        assert_eq!(config.connect_timeout, Duration::from_millis(800));
    }

    #[test]
    fn build_client_succeeds_with_defaults() {
        assert!(TransportConfig::default().build_client().is_ok());
    }
}
