//! Discovery and real-time control for rack shelf sensors.
//!
//! This crate sits between the wire-level clients in `racklink-api` and
//! the `racklink` CLI:
//!
//! - **[`DiscoveryCoordinator`]**: finds racks on the LAN by probing
//!   well-known names, remembered addresses and /24 sweeps at once, all
//!   under one shared in-flight budget. Results are deduped by device id.
//!
//! - **[`RealtimeSession`]**: one authenticated bus connection. Commands
//!   are queued FIFO until the handshake completes; correlated sends wait
//!   for a matching acknowledgement with an explicit timeout; inbound
//!   events fan out to registered handlers and broadcast subscribers.
//!
//! - **[`RegistrationFlow`]** and **[`TagProgrammer`]**: request/ack flows
//!   built on the session.
//!
//! - **Domain model** ([`model`]): `DiscoveredDevice`, `InboundEvent` and
//!   friends.

pub mod command;
pub mod config;
pub mod discovery;
pub mod error;
pub mod model;
pub mod registration;
pub mod session;
pub mod tags;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{CommandEnvelope, CommandTarget, RackCommand};
pub use config::{DiscoveryConfig, SessionConfig};
pub use discovery::{
    DiscoveryCoordinator, NameResolver, ProbeBudget, ProbeTarget, Prober, SubnetSweeper,
    SweepProgress,
};
pub use error::{CommandError, CoreError};
pub use model::{DeviceSet, DiscoveredDevice, DiscoveryVia, EventKind, InboundEvent, TagAction, TagEvent};
pub use registration::{RackMetadata, RegistrationConfirmation, RegistrationError, RegistrationFlow};
pub use session::{AckPattern, DisconnectReason, HandlerId, RealtimeSession, SessionState};
pub use tags::TagProgrammer;
