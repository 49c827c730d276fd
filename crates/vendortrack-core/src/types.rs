//! Shared types.
//!
//! Types passed between the radio session, the location store and the
//! tracking loop.

use serde::{Deserialize, Serialize};

use crate::location::LocationReading;

/// A radio peer observed during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Hardware address, e.g. `AA:BB:CC:DD:EE:FF`.
    pub address: String,

    /// Advertised name, if any.
    pub name: Option<String>,

    /// Signal strength in dBm at discovery time.
    pub rssi_dbm: Option<i16>,
}

impl DiscoveredDevice {
    /// A device known only by its address.
    #[must_use]
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
            rssi_dbm: None,
        }
    }
}

/// One row destined for the vendor location table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorLocationRecord {
    /// Vendor the reading belongs to.
    pub name: String,

    /// The point to store.
    pub reading: LocationReading,
}

/// Acknowledgement of a completed insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteAck {
    /// Rows the backend reports as inserted.
    pub rows_affected: u64,
}
