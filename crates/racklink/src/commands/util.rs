//! Shared helpers for command handlers.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use racklink_config::{self as config, Config, Profile};
use racklink_core::{CoreError, RealtimeSession, SessionConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Where and how to reach the bus, resolved from config and flags.
pub struct BusTarget {
    pub profile: String,
    pub url: Url,
    pub token: SecretString,
    pub session: SessionConfig,
    /// How long to wait for acknowledgements.
    pub ack_timeout: Duration,
}

/// Load config, failing loudly on a malformed file.
pub fn load_config() -> Result<Config, CliError> {
    Ok(config::load_config()?)
}

/// Resolve the bus target: `--bus-url` / `--token` override the active profile.
pub fn bus_target(global: &GlobalOpts) -> Result<BusTarget, CliError> {
    let cfg = load_config()?;
    let profile_name = cfg.active_profile_name(global.profile.as_deref());

    let profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        // An explicitly requested profile must exist
        None if global.profile.is_some() => cfg.profile(&profile_name)?.clone(),
        None => {
            let url = global.bus_url.as_deref().ok_or_else(|| CliError::NoConfig {
                path: config::config_path().display().to_string(),
            })?;
            Profile::new(url)
        }
    };

    let url = match global.bus_url.as_deref() {
        Some(url) => Profile::new(url).bus_url()?,
        None => profile.bus_url()?,
    };

    let token = match global.token.as_deref() {
        Some(token) => SecretString::from(token.to_owned()),
        None => config::resolve_token(&profile, &profile_name)?,
    };

    let timeout = Duration::from_secs(global.timeout.unwrap_or(cfg.defaults.timeout));
    let mut session = profile.session_config(&cfg.defaults);
    if global.timeout.is_some() {
        session.connect_timeout = timeout;
        session.auth_timeout = timeout;
    }

    Ok(BusTarget {
        profile: profile_name,
        url,
        token,
        session,
        ack_timeout: timeout,
    })
}

/// Open an authenticated session to the bus.
pub async fn connect(target: &BusTarget) -> Result<RealtimeSession, CliError> {
    let session = RealtimeSession::new(target.session.clone());
    tracing::debug!(url = %target.url, profile = %target.profile, "connecting to bus");
    session
        .connect(&target.url, &target.token)
        .await
        .map_err(|err| match err {
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed {
                profile: target.profile.clone(),
                message,
            },
            other => other.into(),
        })?;
    Ok(session)
}

/// Milliseconds flag, else the bus-wide default.
pub fn ack_timeout(timeout_ms: Option<u64>, target: &BusTarget) -> Duration {
    timeout_ms.map_or(target.ack_timeout, Duration::from_millis)
}
