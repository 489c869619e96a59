// ── Core error types ──
//
// User-facing errors from racklink-core. Probe failures never show up
// here: discovery absorbs them and reports what it found. The
// `From<racklink_api::Error>` impl translates transport-layer errors into
// domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Discovery ────────────────────────────────────────────────────
    #[error("A discovery run is already in progress")]
    DiscoveryInProgress,

    // ── Session ──────────────────────────────────────────────────────
    #[error("Session was already used; create a new session to reconnect")]
    SessionSpent,

    #[error("Session is closed")]
    SessionClosed,

    #[error("Cannot connect to bus at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error(transparent)]
    Command(#[from] CommandError),

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Terminal outcome of a correlated request that did not succeed.
///
/// Silence and refusal stay distinct so callers can tell "the network
/// dropped it" from "the server said no".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("No matching acknowledgement within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Rejected: {reason}")]
    Rejected { reason: String },

    #[error("Session closed before an acknowledgement arrived")]
    SessionClosed,
}

impl CommandError {
    pub(crate) fn timeout(duration: std::time::Duration) -> Self {
        Self::Timeout {
            timeout_ms: millis(duration),
        }
    }
}

pub(crate) fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<racklink_api::Error> for CoreError {
    fn from(err: racklink_api::Error) -> Self {
        match err {
            racklink_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_ms: 0 }
                } else {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                }
            }
            racklink_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            racklink_api::Error::Timeout { timeout_ms } => CoreError::Timeout { timeout_ms },
            racklink_api::Error::ClientSetup(message) => CoreError::Config { message },
            racklink_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            racklink_api::Error::WebSocketClosed { .. } => CoreError::SessionClosed,
            racklink_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            racklink_api::Error::FrameEncode(e) => {
                CoreError::Internal(format!("Frame encoding failed: {e}"))
            }
        }
    }
}
