//! Single-address discovery probe.
//!
//! Every rack exposes `GET /api/discovery` over plain HTTP on the LAN. A
//! probe is one bounded-time attempt against one `address:port`; it never
//! fails with an error -- every outcome, including the very common "nothing
//! listens there", is a [`ProbeResult`] variant. Retry policy belongs to
//! the caller.

use std::net::Ipv6Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Path served by rack firmware for discovery.
pub const DISCOVERY_PATH: &str = "/api/discovery";

// ── DiscoveryPayload ─────────────────────────────────────────────────

/// Body returned by a rack's discovery endpoint.
///
/// `deviceId` and `firmwareVersion` are required; anything else is a live
/// snapshot that older firmware may omit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryPayload {
    pub device_id: String,
    pub firmware_version: String,
    #[serde(default)]
    pub current_weight: Option<f64>,
    #[serde(default)]
    pub current_status: Option<String>,
    #[serde(default)]
    pub tag_present: Option<bool>,
    #[serde(default)]
    pub current_ingredient: Option<String>,
}

// ── ProbeResult ──────────────────────────────────────────────────────

/// Outcome of one probe. Exactly one variant per probe call.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeResult {
    /// The address answered with a valid discovery payload.
    Success(DiscoveryPayload),
    /// No complete answer within the deadline.
    Timeout,
    /// Connection refused, unreachable host, DNS failure, reset...
    NetworkError(String),
    /// The server answered with a non-2xx status.
    NonSuccess(u16),
    /// 2xx, but the body is not a discovery payload.
    ParseError(String),
}

impl ProbeResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Consume the result, keeping only a successful payload.
    pub fn into_payload(self) -> Option<DiscoveryPayload> {
        match self {
            Self::Success(payload) => Some(payload),
            _ => None,
        }
    }

    /// Short stable label, used in logs and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Timeout => "timeout",
            Self::NetworkError(_) => "network-error",
            Self::NonSuccess(_) => "non-2xx",
            Self::ParseError(_) => "parse-error",
        }
    }
}

// ── ProbeClient ──────────────────────────────────────────────────────

/// Issues discovery probes. Cheap to clone (wraps a pooled `reqwest::Client`).
#[derive(Debug, Clone)]
pub struct ProbeClient {
    http: reqwest::Client,
}

impl ProbeClient {
    /// Create a probe client from a `TransportConfig`.
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
        })
    }

    /// Create a probe client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Probe `address:port` once, giving up after `timeout`.
    ///
    /// The deadline covers connect, headers and body. When it expires the
    /// in-flight request future is dropped, which closes the connection.
    pub async fn probe(&self, address: &str, port: u16, timeout: Duration) -> ProbeResult {
        let url = probe_url(address, port);

        let attempt = async {
            let resp = match self.http.get(&url).send().await {
                Ok(resp) => resp,
                Err(e) if e.is_timeout() => return ProbeResult::Timeout,
                Err(e) => return ProbeResult::NetworkError(e.to_string()),
            };

            let status = resp.status();
            if !status.is_success() {
                return ProbeResult::NonSuccess(status.as_u16());
            }

            match resp.bytes().await {
                Ok(body) => parse_payload(&body),
                Err(e) if e.is_timeout() => ProbeResult::Timeout,
                Err(e) => ProbeResult::NetworkError(e.to_string()),
            }
        };

        let result = tokio::time::timeout(timeout, attempt)
            .await
            .unwrap_or(ProbeResult::Timeout);

        trace!(address, port, outcome = result.label(), "probe settled");
        result
    }
}

/// Build the discovery URL, bracketing bare IPv6 literals.
pub fn probe_url(address: &str, port: u16) -> String {
    if address.parse::<Ipv6Addr>().is_ok() {
        format!("http://[{address}]:{port}{DISCOVERY_PATH}")
    } else {
        format!("http://{address}:{port}{DISCOVERY_PATH}")
    }
}

/// Validate a response body against the discovery schema.
fn parse_payload(body: &[u8]) -> ProbeResult {
    match serde_json::from_slice::<DiscoveryPayload>(body) {
        Ok(payload) if payload.device_id.trim().is_empty() => {
            ProbeResult::ParseError("empty deviceId".into())
        }
        Ok(payload) => ProbeResult::Success(payload),
        Err(e) => ProbeResult::ParseError(e.to_string()),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
