//! Shared configuration for the racklink CLI.
//!
//! TOML profiles, token resolution (env + keyring + plaintext), and
//! translation to `racklink_core::{DiscoveryConfig, SessionConfig}`. Core
//! never reads files; it receives the configs built here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use racklink_core::config::{
    DEFAULT_FALLBACK_BASES, DEFAULT_MAX_IN_FLIGHT, DEFAULT_NAME_CONCURRENCY, DEFAULT_NAMES,
    DEFAULT_PORTS, DEFAULT_PROBE_TIMEOUT,
};
use racklink_core::discovery::sweeper::normalize_base;
use racklink_core::{DiscoveryConfig, SessionConfig};

/// Keyring service under which bus tokens are stored.
pub const KEYRING_SERVICE: &str = "racklink";

/// Overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "RACKLINK_CONFIG";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found (available: {available})")]
    ProfileNotFound { name: String, available: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// How `discover` looks for racks.
    #[serde(default)]
    pub discovery: DiscoverySettings,

    /// Named bus profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            discovery: DiscoverySettings::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Seconds to wait for an acknowledgement.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    10
}

/// `[discovery]` table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoverySettings {
    pub names: Vec<String>,
    pub known_addresses: Vec<String>,
    /// Explicit /24 bases. Empty means guess from the local network.
    pub base_addresses: Vec<String>,
    pub fallback_bases: Vec<String>,
    pub ports: Vec<u16>,
    pub suffix_start: u8,
    pub suffix_end: u8,
    pub probe_timeout_ms: u64,
    pub max_in_flight: usize,
    pub name_concurrency: usize,
    pub sweep: bool,
    pub external_lookup: bool,
    pub ip_echo_url: String,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        let core = DiscoveryConfig::default();
        Self {
            names: DEFAULT_NAMES.iter().map(ToString::to_string).collect(),
            known_addresses: Vec::new(),
            base_addresses: Vec::new(),
            fallback_bases: DEFAULT_FALLBACK_BASES.iter().map(ToString::to_string).collect(),
            ports: DEFAULT_PORTS.to_vec(),
            suffix_start: *core.suffixes.start(),
            suffix_end: *core.suffixes.end(),
            probe_timeout_ms: u64::try_from(DEFAULT_PROBE_TIMEOUT.as_millis()).unwrap_or(1500),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            name_concurrency: DEFAULT_NAME_CONCURRENCY,
            sweep: core.sweep,
            external_lookup: core.external_lookup,
            ip_echo_url: core.ip_echo_url,
        }
    }
}

impl DiscoverySettings {
    /// Validate and translate into the core discovery config.
    pub fn to_discovery_config(&self) -> Result<DiscoveryConfig, ConfigError> {
        if self.ports.is_empty() {
            return Err(validation("discovery.ports", "at least one port is required"));
        }
        if self.suffix_start > self.suffix_end {
            return Err(validation(
                "discovery.suffix_start",
                format!(
                    "{} is greater than suffix_end {}",
                    self.suffix_start, self.suffix_end
                ),
            ));
        }
        let base_addresses = normalize_bases("discovery.base_addresses", &self.base_addresses)?;
        let fallback_bases = normalize_bases("discovery.fallback_bases", &self.fallback_bases)?;
        if self.external_lookup {
            Url::parse(&self.ip_echo_url).map_err(|e| {
                validation("discovery.ip_echo_url", format!("{}: {e}", self.ip_echo_url))
            })?;
        }

        Ok(DiscoveryConfig {
            names: self.names.clone(),
            known_addresses: self.known_addresses.clone(),
            base_addresses,
            fallback_bases,
            ports: self.ports.clone(),
            suffixes: self.suffix_start..=self.suffix_end,
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            max_in_flight: self.max_in_flight,
            name_concurrency: self.name_concurrency,
            sweep: self.sweep,
            external_lookup: self.external_lookup,
            ip_echo_url: self.ip_echo_url.clone(),
            ..DiscoveryConfig::default()
        })
    }
}

fn normalize_bases(field: &str, bases: &[String]) -> Result<Vec<String>, ConfigError> {
    bases
        .iter()
        .map(|base| {
            normalize_base(base).ok_or_else(|| validation(field, format!("'{base}' is not an a.b.c prefix")))
        })
        .collect()
}

/// A named bus profile.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// Bus WebSocket URL (e.g., "wss://bus.example.com/ws").
    pub bus_url: String,

    /// Account id, used as the token when nothing else is configured.
    pub user_id: Option<String>,

    /// Token (plaintext, prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the token.
    pub token_env: Option<String>,

    /// Override connect timeout in seconds.
    pub connect_timeout: Option<u64>,
}

impl Profile {
    pub fn new(bus_url: impl Into<String>) -> Self {
        Self {
            bus_url: bus_url.into(),
            ..Self::default()
        }
    }

    /// Parse and check `bus_url`.
    pub fn bus_url(&self) -> Result<Url, ConfigError> {
        let url: Url = self
            .bus_url
            .parse()
            .map_err(|_| validation("bus_url", format!("invalid URL: {}", self.bus_url)))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(validation(
                "bus_url",
                format!("expected a ws:// or wss:// URL, got '{other}://'"),
            )),
        }
    }

    /// Session tuning for this profile.
    pub fn session_config(&self, defaults: &Defaults) -> SessionConfig {
        let connect = Duration::from_secs(self.connect_timeout.unwrap_or(defaults.timeout));
        SessionConfig {
            connect_timeout: connect,
            auth_timeout: Duration::from_secs(defaults.timeout),
            ..SessionConfig::default()
        }
    }
}

fn validation(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── Profile lookup ──────────────────────────────────────────────────

impl Config {
    /// Profile name from an explicit choice, else `default_profile`.
    pub fn active_profile_name(&self, requested: Option<&str>) -> String {
        requested
            .map(String::from)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles.get(name).ok_or_else(|| {
            let mut available: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
            available.sort_unstable();
            ConfigError::ProfileNotFound {
                name: name.into(),
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            }
        })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `RACKLINK_CONFIG`, else XDG / platform
/// conventions.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("com", "racklink", "racklink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("racklink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` (missing file is fine) layered under `RACKLINK_`
/// env vars. Nested keys use `__`: `RACKLINK_DEFAULTS__TIMEOUT=5`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("RACKLINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(
        KEYRING_SERVICE,
        &format!("{profile_name}/token"),
    )?)
}

/// Resolve the bus token for a profile.
///
/// Order: `token_env` variable, system keyring, plaintext `token`, then
/// `user_id`.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    // 4. Bare account id
    if let Some(ref user_id) = profile.user_id {
        return Ok(SecretString::from(user_id.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a token in the system keyring for `profile_name`.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(token)?;
    Ok(())
}
