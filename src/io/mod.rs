// src/io/mod.rs
//
// Reader link abstraction for the EID tag reader.
// One predetermined peripheral, one connection at a time; the reader pushes
// status and identifier events to its consumer over a channel and never
// calls back into it.

mod error;
pub mod eid;

pub use eid::{
    list_reader_ports, EidFramer, EidFramerConfig, EidReader, EidReaderConfig, ReaderPortInfo,
};
pub use error::ReaderError;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Shared Types
// ============================================================================

/// Serial Port Profile service class, the RFCOMM service EID readers expose.
pub const SPP_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805f9b34fb);

/// Lifecycle state of one reader connection.
///
/// Owned exclusively by the [`eid::EidReader`]; state only advances
/// `Idle -> Connecting -> {Connected, Failed}`, and `stop()` is the sole
/// path to `Disconnected`. A read-loop exit on its own does not move the
/// state; the caller decides whether to tear down or retry with a fresh
/// reader instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Failed,
    Disconnected,
}

/// The peripheral the reader dials, configured once and never mutated.
///
/// The hardware address and service identifier name the device; the bound
/// serial channel the OS created for that service is carried in
/// [`eid::EidReaderConfig::port`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    /// Bluetooth hardware address, e.g. "00:07:80:E6:95:52".
    pub address: String,
    /// RFCOMM service class the reader advertises.
    pub service_uuid: Uuid,
}

impl TargetDescriptor {
    /// Descriptor for a reader advertising the standard serial-port service.
    pub fn new(address: impl Into<String>) -> Self {
        TargetDescriptor {
            address: address.into(),
            service_uuid: SPP_SERVICE_UUID,
        }
    }
}

/// Notification from a reader to its consumer.
///
/// Delivered over the channel returned by [`eid::EidReader::new`], strictly
/// in the order the underlying transitions and bytes occurred. Sends are
/// fire-and-forget; a dropped receiver never stalls the read loop.
#[derive(Clone, Debug, PartialEq)]
pub enum ReaderEvent {
    /// State transition with its human-readable status line.
    Status(ConnectionState, String),
    /// One noise-stripped identifier frame (>= 10 alphanumeric characters).
    /// Consumers normalise (trailing fixed-width slice) and deduplicate;
    /// the reader itself does neither.
    Eid(String),
    /// A caught failure, reported exactly once per connection attempt.
    /// `Display` yields the status text the survey UI renders.
    Error(ReaderError),
    /// The background worker exited: "stopped", "disconnected", or "error".
    Ended(String),
}
