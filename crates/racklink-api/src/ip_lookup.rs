//! Best-effort address hints used to seed sweep ranges.
//!
//! Two sources: the host's own outbound interface address (no packets are
//! sent, a connected UDP socket just asks the kernel for a route) and a
//! public IP-echo service. Both are allowed to fail; callers fall back to a
//! fixed list of private ranges.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Public IP-echo endpoint used when none is configured.
pub const DEFAULT_IP_ECHO_URL: &str = "https://api.ipify.org?format=json";

/// Routable address used only to pick the outbound interface. Nothing is sent.
const ROUTE_PROBE_TARGET: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), 9);

#[derive(Debug, Deserialize)]
struct EchoBody {
    ip: String,
}

/// Looks up the addresses this host is reachable at.
#[derive(Debug, Clone)]
pub struct IpLookup {
    http: reqwest::Client,
    echo_url: String,
}

impl IpLookup {
    pub fn new(transport: &TransportConfig, echo_url: impl Into<String>) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            echo_url: echo_url.into(),
        })
    }

    pub fn with_client(http: reqwest::Client, echo_url: impl Into<String>) -> Self {
        Self {
            http,
            echo_url: echo_url.into(),
        }
    }

    pub fn echo_url(&self) -> &str {
        &self.echo_url
    }

    /// Ask the echo service for this host's public IPv4 address.
    ///
    /// Accepts either `{"ip": "..."}` or a bare address in the body.
    pub async fn external_ipv4(&self, timeout: Duration) -> Result<Ipv4Addr, Error> {
        let fetch = async {
            let resp = self.http.get(&self.echo_url).send().await?.error_for_status()?;
            let body = resp.text().await?;
            parse_echo_body(&body)
        };

        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let ip = tokio::time::timeout(timeout, fetch)
            .await
            .map_err(|_| Error::Timeout { timeout_ms })??;

        debug!(%ip, "external address resolved");
        Ok(ip)
    }

    /// Address of the interface the OS would route outbound traffic through.
    ///
    /// Returns `None` on hosts without an IPv4 default route.
    pub async fn local_ipv4() -> Option<Ipv4Addr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await.ok()?;
        socket.connect(ROUTE_PROBE_TARGET).await.ok()?;
        match socket.local_addr().ok()?.ip() {
            IpAddr::V4(ip) if !ip.is_unspecified() => Some(ip),
            _ => None,
        }
    }
}

fn parse_echo_body(body: &str) -> Result<Ipv4Addr, Error> {
    let trimmed = body.trim();
    let raw = match serde_json::from_str::<EchoBody>(trimmed) {
        Ok(echo) => echo.ip,
        Err(_) => trimmed.to_owned(),
    };
    raw.parse::<Ipv4Addr>().map_err(|e| Error::Deserialization {
        message: format!("IP echo body is not an IPv4 address: {e}"),
        body: body.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_body() {
        let ip = parse_echo_body(r#"{"ip":"192.168.4.20"}"#).expect("ip");
        assert_eq!(ip, Ipv4Addr::new(192, 168, 4, 20));
    }

    #[test]
    fn parses_plain_text_body() {
        let ip = parse_echo_body("10.1.2.3\n").expect("ip");
        assert_eq!(ip, Ipv4Addr::new(10, 1, 2, 3));
    }

    #[test]
    fn rejects_ipv6_and_garbage() {
        assert!(parse_echo_body(r#"{"ip":"2001:db8::1"}"#).is_err());
        assert!(matches!(
            parse_echo_body("<html>"),
            Err(Error::Deserialization { .. })
        ));
    }
}
