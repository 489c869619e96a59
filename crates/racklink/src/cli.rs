//! Clap derive structures for the `racklink` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};
use strum::IntoEnumIterator;

use racklink_core::EventKind;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// racklink -- find and drive rack shelf sensors
#[derive(Debug, Parser)]
#[command(
    name = "racklink",
    version,
    about = "Find rack shelf sensors on your LAN and control them over the real-time bus",
    long_about = "Discovers shelf sensors by name, remembered address and subnet sweep,\n\
        registers them to your account, and sends commands or streams telemetry\n\
        over the bus WebSocket.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Bus profile to use
    #[arg(long, short = 'p', env = "RACKLINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Bus WebSocket URL (overrides profile)
    #[arg(long, env = "RACKLINK_BUS_URL", global = true)]
    pub bus_url: Option<String>,

    /// Bus token (overrides profile)
    #[arg(long, env = "RACKLINK_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "RACKLINK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Seconds to wait for the bus (connect, authenticate, acknowledgements)
    #[arg(long, env = "RACKLINK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Find racks on the local network
    #[command(alias = "d")]
    Discover(DiscoverArgs),

    /// Probe one address for a rack
    Probe(ProbeArgs),

    /// Register a rack to your account
    Register(RegisterArgs),

    /// Stream bus events until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Send a command to a rack (or every rack)
    Send(SendArgs),

    /// Program a rack's NFC tag
    Tag(TagArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Discover ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Per-probe timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Skip the subnet sweep (names and known addresses only)
    #[arg(long)]
    pub no_sweep: bool,

    /// Sweep this /24 (a.b.c); repeatable. Replaces guessed ranges
    #[arg(long = "base", value_name = "A.B.C")]
    pub bases: Vec<String>,

    /// Also probe this host name or address; repeatable
    #[arg(long = "address", value_name = "HOST[:PORT]")]
    pub addresses: Vec<String>,

    /// Probe these ports (default from config); repeatable
    #[arg(long = "port")]
    pub ports: Vec<u16>,

    /// Do not ask the IP echo service which network we are on
    #[arg(long)]
    pub no_lookup: bool,
}

// ── Probe ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Address or host name, optionally with :port
    pub address: String,

    /// Port (overrides one given in the address)
    #[arg(long)]
    pub port: Option<u16>,

    /// Probe timeout in milliseconds
    #[arg(long, default_value = "1500")]
    pub timeout_ms: u64,
}

// ── Register ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RegisterArgs {
    /// Rack address, optionally with :port
    pub address: String,

    /// Display name for the rack
    #[arg(long, short = 'n')]
    pub name: String,

    /// Where the rack lives
    #[arg(long, short = 'l')]
    pub location: Option<String>,

    /// Port (overrides one given in the address)
    #[arg(long)]
    pub port: Option<u16>,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only show these event kinds; repeatable
    #[arg(long = "kind", short = 'k', value_parser = parse_event_kind)]
    pub kinds: Vec<EventKind>,

    /// Only show events from this rack
    #[arg(long)]
    pub device: Option<String>,
}

// ── Send ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Target device id, or "broadcast"
    pub target: String,

    /// Command name (e.g. tare, identify, restart)
    pub command: String,

    /// Extra payload field; value parsed as JSON when possible; repeatable
    #[arg(long = "arg", short = 'a', value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub args: Vec<(String, serde_json::Value)>,

    /// Wait for an event of this kind as acknowledgement
    #[arg(long = "await", value_name = "KIND", value_parser = parse_event_kind)]
    pub await_kind: Option<EventKind>,

    /// Acknowledgement timeout in milliseconds (default: --timeout)
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

// ── Tag ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct TagArgs {
    #[command(subcommand)]
    pub command: TagCommand,
}

#[derive(Debug, Subcommand)]
pub enum TagCommand {
    /// Write an ingredient to the tag on the rack
    Write {
        /// Rack device id
        device: String,
        /// Ingredient to store on the tag
        ingredient: String,
    },

    /// Read the tag on the rack
    Read {
        /// Rack device id
        device: String,
    },

    /// Clear the tag's ingredient
    Clear {
        /// Rack device id
        device: String,
    },

    /// Format the tag
    Format {
        /// Rack device id
        device: String,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Interactive setup wizard
    Init,

    /// Show the effective configuration
    Show,

    /// Store a bus token in the system keyring
    SetToken {
        /// Profile to update (default: active profile)
        #[arg(long)]
        profile: Option<String>,
    },

    /// Print the config file path
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

// ── Value parsers ────────────────────────────────────────────────────

fn parse_event_kind(s: &str) -> Result<EventKind, String> {
    EventKind::from_wire(s).ok_or_else(|| {
        let known: Vec<&str> = EventKind::iter().map(EventKind::wire_name).collect();
        format!("unknown event kind '{s}' (expected one of: {})", known.join(", "))
    })
}

fn parse_key_value(s: &str) -> Result<(String, serde_json::Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_owned()));
    Ok((key.to_owned(), value))
}
