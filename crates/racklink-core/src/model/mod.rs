pub mod device;
pub mod event;

pub use device::{DeviceSet, DiscoveredDevice, DiscoveryVia};
pub use event::{
    Alert, CommandResponse, DeviceStatus, EventKind, InboundEvent, RegistrationAck, TagAction,
    TagEvent, TelemetryUpdate,
};
