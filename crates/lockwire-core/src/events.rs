//! Listener events emitted by the engine
//!
//! One event per named occurrence in the device lifecycle, delivered on an
//! unbounded channel so slow consumers never stall a dispatcher.

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::ErrorKind;
use crate::types::MacAddress;

// ----------------------------------------------------------------------------
// Event Types
// ----------------------------------------------------------------------------

/// Events delivered to the caller's listener channel.
#[derive(Debug, Clone, PartialEq)]
pub enum LockEvent {
    /// A registered lock was seen during scanning.
    DeviceDiscovered { mac: MacAddress },
    /// The transport link came up; handshake in progress.
    Connecting { mac: MacAddress },
    /// Notifications are armed and the session is usable.
    Connected { mac: MacAddress },
    /// The session ended cleanly.
    Disconnected { mac: MacAddress },
    /// The command queue drained after a success result.
    Unlocked { mac: MacAddress },
    /// An error occurred, for one lock or globally.
    Error {
        device: Option<MacAddress>,
        kind: ErrorKind,
        message: String,
    },
}

/// Sender half handed to every dispatcher; cheap to clone.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<LockEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LockEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit an event. A dropped receiver is not an error; the engine keeps
    /// running without a listener.
    pub fn emit(&self, event: LockEvent) {
        if self.tx.send(event).is_err() {
            debug!("listener channel closed, event dropped");
        }
    }

    pub fn error(&self, device: Option<MacAddress>, kind: ErrorKind, message: impl Into<String>) {
        self.emit(LockEvent::Error {
            device,
            kind,
            message: message.into(),
        });
    }
}
