use thiserror::Error;

/// Top-level error type for the `racklink-api` crate.
///
/// Covers the transport-level failures of the HTTP helpers and the bus link.
/// Discovery probes never surface this type -- they resolve to a
/// [`ProbeResult`](crate::ProbeResult) variant instead.
/// `racklink-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Building the HTTP client failed (TLS backend, bad header value, etc.)
    #[error("HTTP client setup failed: {0}")]
    ClientSetup(String),

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON (de)serialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// A bus frame could not be encoded.
    #[error("Frame encoding failed: {0}")]
    FrameEncode(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::WebSocketConnect(_) => true,
            _ => false,
        }
    }

    /// Returns `true` if the bus link is gone and no further frames will flow.
    pub fn is_link_closed(&self) -> bool {
        matches!(self, Self::WebSocketClosed { .. })
    }
}
