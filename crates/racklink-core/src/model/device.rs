// ── Discovered device types ──

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use indexmap::map::Entry;
use serde::{Deserialize, Serialize};

use racklink_api::DiscoveryPayload;

/// Which discovery strategy produced a hit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DiscoveryVia {
    /// Well-known host name probed directly.
    NameResolution,
    /// Address enumerated by a subnet sweep.
    Sweep,
    /// Remembered address probed directly.
    Fallback,
}

/// A rack that answered a discovery probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Vendor-assigned identity. The dedupe key.
    pub device_id: String,
    pub address: String,
    pub port: u16,
    pub firmware_version: String,
    pub weight: Option<f64>,
    pub status: Option<String>,
    pub tag_present: bool,
    pub ingredient: Option<String>,
    pub via: DiscoveryVia,
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveredDevice {
    pub fn from_payload(payload: DiscoveryPayload, address: &str, port: u16, via: DiscoveryVia) -> Self {
        Self {
            device_id: payload.device_id,
            address: address.to_owned(),
            port,
            firmware_version: payload.firmware_version,
            weight: payload.current_weight,
            status: payload.current_status,
            tag_present: payload.tag_present.unwrap_or(false),
            ingredient: payload.current_ingredient,
            via,
            discovered_at: Utc::now(),
        }
    }

    /// `address:port`, bracketing IPv6 literals.
    pub fn endpoint(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

// ── DeviceSet ────────────────────────────────────────────────────────

/// Insertion-ordered set of devices keyed by `device_id`.
///
/// The first entry for an id wins; later hits for the same id are dropped.
#[derive(Debug, Clone, Default)]
pub struct DeviceSet {
    devices: IndexMap<String, DiscoveredDevice>,
}

impl DeviceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a device. Returns `false` if its id was already present.
    pub fn insert(&mut self, device: DiscoveredDevice) -> bool {
        match self.devices.entry(device.device_id.clone()) {
            Entry::Occupied(existing) => {
                tracing::trace!(
                    device_id = %device.device_id,
                    kept = %existing.get().endpoint(),
                    dropped = %device.endpoint(),
                    "duplicate device hit"
                );
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(device);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    pub fn into_vec(self) -> Vec<DiscoveredDevice> {
        self.devices.into_values().collect()
    }
}

impl Extend<DiscoveredDevice> for DeviceSet {
    fn extend<I: IntoIterator<Item = DiscoveredDevice>>(&mut self, iter: I) {
        for device in iter {
            self.insert(device);
        }
    }
}

impl FromIterator<DiscoveredDevice> for DeviceSet {
    fn from_iter<I: IntoIterator<Item = DiscoveredDevice>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}
