//! CLI error types with miette diagnostics.
//!
//! Maps core, registration and config errors into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use racklink_config::ConfigError;
use racklink_core::{CommandError, CoreError, RegistrationError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const REJECTED: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to the bus at {url}")]
    #[diagnostic(
        code(racklink::connection_failed),
        help(
            "Check the bus URL and your network.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Connection to the bus was lost: {reason}")]
    #[diagnostic(code(racklink::disconnected))]
    Disconnected { reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Bus refused authentication: {message}")]
    #[diagnostic(
        code(racklink::auth_failed),
        help(
            "Verify the token for profile '{profile}'.\n\
             Run: racklink config set-token --profile {profile}"
        )
    )]
    AuthFailed { profile: String, message: String },

    #[error("No token configured for profile '{profile}'")]
    #[diagnostic(
        code(racklink::no_credentials),
        help(
            "Configure a token with: racklink config init\n\
             Or set the RACKLINK_TOKEN environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Discovery ────────────────────────────────────────────────────
    #[error("No rack answered at {address}")]
    #[diagnostic(
        code(racklink::not_found),
        help("Check the address, or run: racklink discover")
    )]
    RackNotFound { address: String, outcome: String },

    // ── Bus requests ─────────────────────────────────────────────────
    #[error("No acknowledgement within {timeout_ms}ms")]
    #[diagnostic(
        code(racklink::timeout),
        help("The rack may be offline. Increase the wait with --timeout.")
    )]
    Timeout { timeout_ms: u64 },

    #[error("No response from server")]
    #[diagnostic(
        code(racklink::no_response),
        help("The bus accepted the request but never confirmed it. Try again later.")
    )]
    NoResponse,

    #[error("Rejected: {reason}")]
    #[diagnostic(code(racklink::rejected))]
    Rejected { reason: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(racklink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(racklink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: racklink config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No bus configured")]
    #[diagnostic(
        code(racklink::no_config),
        help(
            "Create a profile with: racklink config init\n\
             Or pass --bus-url and --token.\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(racklink::config))]
    Config(Box<figment::Error>),

    #[error("Keyring error: {0}")]
    #[diagnostic(code(racklink::keyring))]
    Keyring(String),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Prompt failed: {0}")]
    #[diagnostic(code(racklink::prompt))]
    Prompt(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(racklink::render))]
    Render(String),

    #[error("Internal error: {0}")]
    #[diagnostic(code(racklink::internal))]
    Internal(String),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Render(err.to_string())
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Render(err.to_string())
    }
}

impl From<dialoguer::Error> for CliError {
    fn from(err: dialoguer::Error) -> Self {
        Self::Prompt(err.to_string())
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::RackNotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } | Self::NoResponse => exit_code::TIMEOUT,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── Core → CliError mapping ──────────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed {
                profile: "current".into(),
                message,
            },
            CoreError::Timeout { timeout_ms } => CliError::Timeout { timeout_ms },
            CoreError::Command(cmd) => cmd.into(),
            CoreError::SessionClosed => CliError::Disconnected {
                reason: "session closed".into(),
            },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::DiscoveryInProgress | CoreError::SessionSpent | CoreError::Internal(_) => {
                CliError::Internal(err.to_string())
            }
        }
    }
}

impl From<CommandError> for CliError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Timeout { timeout_ms } => CliError::Timeout { timeout_ms },
            CommandError::Rejected { reason } => CliError::Rejected { reason },
            CommandError::SessionClosed => CliError::Disconnected {
                reason: err.to_string(),
            },
        }
    }
}

impl From<RegistrationError> for CliError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::NoResponse => CliError::NoResponse,
            RegistrationError::Rejected(reason) => CliError::Rejected { reason },
            RegistrationError::Transport(reason) => CliError::Disconnected { reason },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::ProfileNotFound { name, available } => {
                CliError::ProfileNotFound { name, available }
            }
            ConfigError::Keyring(e) => CliError::Keyring(e.to_string()),
            ConfigError::Figment(e) => CliError::Config(e),
            ConfigError::Io(e) => CliError::Io(e),
            ConfigError::Serialization(e) => CliError::Render(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_outcomes_have_distinct_exit_codes() {
        let timeout: CliError = CommandError::Timeout { timeout_ms: 10 }.into();
        let rejected: CliError = CommandError::Rejected { reason: "no".into() }.into();
        let closed: CliError = CommandError::SessionClosed.into();
        assert_eq!(timeout.exit_code(), exit_code::TIMEOUT);
        assert_eq!(rejected.exit_code(), exit_code::REJECTED);
        assert_eq!(closed.exit_code(), exit_code::CONNECTION);
    }

    #[test]
    fn registration_no_response_is_a_timeout() {
        let err: CliError = RegistrationError::NoResponse.into();
        assert_eq!(err.exit_code(), exit_code::TIMEOUT);
    }

    #[test]
    fn missing_profile_is_a_usage_error() {
        let err: CliError = ConfigError::ProfileNotFound {
            name: "lab".into(),
            available: "home".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
