// racklink-api: wire-level clients for rack shelf sensors (discovery probe,
// external IP lookup, real-time bus link)

pub mod error;
pub mod frame;
pub mod ip_lookup;
pub mod probe;
pub mod transport;
pub mod websocket;

pub use error::Error;
pub use frame::{OutboundFrame, RawFrame, RegisterDeviceData, SendCommandData};
pub use ip_lookup::IpLookup;
pub use probe::{DiscoveryPayload, ProbeClient, ProbeResult};
pub use transport::TransportConfig;
pub use websocket::{BusLink, BusPeer};
