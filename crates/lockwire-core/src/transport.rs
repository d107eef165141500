//! Transport abstraction over the host BLE stack
//!
//! The engine never talks to a Bluetooth stack directly; it drives this trait
//! and consumes the signal stream its implementation feeds back. Connect,
//! discovery, characteristic I/O and notification arming are all async; the
//! dispatcher records pending state and resumes on completion rather than
//! blocking a thread.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::{uuid, Uuid};

use crate::error::Result;
use crate::types::MacAddress;

// ----------------------------------------------------------------------------
// GATT Layout
// ----------------------------------------------------------------------------

/// Primary lock service.
pub const LOCK_SERVICE_UUID: Uuid = uuid!("1bc50001-0200-d29e-e511-446c609db825");
/// Command characteristic; outgoing frames are written here.
pub const COMMAND_CHAR_UUID: Uuid = uuid!("1bc50002-0200-d29e-e511-446c609db825");
/// Response characteristic; the lock notifies inbound frames here.
pub const RESPONSE_CHAR_UUID: Uuid = uuid!("1bc50003-0200-d29e-e511-446c609db825");
/// State characteristic; read once per connection to capture the session key.
pub const STATE_CHAR_UUID: Uuid = uuid!("1bc50004-0200-d29e-e511-446c609db825");

/// Firmware-update service exposed by update-class devices.
pub const FIRMWARE_SERVICE_UUID: Uuid = uuid!("00001530-1212-efde-1523-785feabcd123");
/// Notification characteristic of the firmware-update service.
pub const FIRMWARE_RESPONSE_CHAR_UUID: Uuid = uuid!("00001531-1212-efde-1523-785feabcd123");

// ----------------------------------------------------------------------------
// Transport Signals
// ----------------------------------------------------------------------------

/// Unsolicited events delivered by a transport implementation.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// A characteristic notification arrived.
    Notification { uuid: Uuid, value: Vec<u8> },
    /// The link dropped, whether requested or not.
    Disconnected,
}

pub type SignalSender = mpsc::UnboundedSender<TransportSignal>;
pub type SignalReceiver = mpsc::UnboundedReceiver<TransportSignal>;

/// Create the signal channel pair shared between a transport implementation
/// and the dispatcher that consumes it.
pub fn signal_channel() -> (SignalSender, SignalReceiver) {
    mpsc::unbounded_channel()
}

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// One lock's view of the host BLE stack.
///
/// Implementations own a single transport handle. Completion of each call is
/// the corresponding platform callback; link drops and notifications arrive
/// out of band on the signal channel.
#[async_trait]
pub trait LockTransport: Send {
    /// Establish the transport link to the device.
    async fn connect(&mut self, mac: &MacAddress) -> Result<()>;

    /// Request GATT service discovery on the connected device.
    async fn discover_services(&mut self) -> Result<()>;

    /// Read a characteristic's current value.
    async fn read_characteristic(&mut self, uuid: Uuid) -> Result<Vec<u8>>;

    /// Write raw bytes to a characteristic.
    async fn write_characteristic(&mut self, uuid: Uuid, value: &[u8]) -> Result<()>;

    /// Arm or disarm notifications on a characteristic (descriptor write).
    async fn set_notify(&mut self, uuid: Uuid, enabled: bool) -> Result<()>;

    /// Tear the link down. Must be safe to call on an already-dead handle.
    async fn disconnect(&mut self) -> Result<()>;

    /// Whether the device is bonded at the platform level. Unbonded devices
    /// are the ones whose service cache can go stale across reconnects.
    fn is_bonded(&self) -> bool {
        false
    }

    /// Platform quirk hook: force the GATT service cache to be rebuilt on the
    /// next connection. A no-op on platforms without the staleness issue.
    async fn refresh_service_cache(&mut self) -> Result<()> {
        Ok(())
    }
}
