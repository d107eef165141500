//! Session and connection state machine
//!
//! One lock's connection lifecycle, modeled as an explicit transition
//! function over [`ConnectionPhase`] driven by events. Each transition
//! mutates the record and returns the effects the dispatcher must execute
//! against the transport, in order. The deep callback nesting of platform
//! BLE stacks reduces to a flat event queue this way.
//!
//! Lifecycle: `Disconnected -> Connecting -> Connected (discovery pending)
//! -> SessionEstablished -> Unlocked`, with a bounded error/retry excursion
//! while connecting and a return to `Disconnected` on any disconnect.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::ErrorKind;
use crate::events::LockEvent;
use crate::transport::{
    FIRMWARE_RESPONSE_CHAR_UUID, RESPONSE_CHAR_UUID, STATE_CHAR_UUID,
};
use crate::types::{CommandFrame, ConnectionPhase, LockRecord, SessionKey};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Events and Effects
// ----------------------------------------------------------------------------

/// Inputs to the state machine. Transport completions and link signals are
/// translated into these by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Caller asked for a connection.
    ConnectRequested,
    /// The transport link came up.
    TransportConnected,
    /// GATT-layer fault while connecting.
    TransportError { reason: String },
    /// Service discovery completed.
    ServicesDiscovered,
    /// The state characteristic was read; value carries the session key.
    SessionRead { value: Vec<u8> },
    /// The notification descriptor write completed.
    NotifyArmed,
    /// The link dropped.
    DisconnectObserved,
    /// Caller asked to stop; tear down and discard.
    StopRequested,
}

/// Commands the dispatcher executes against its collaborators, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Issue a fresh transport connect.
    Connect,
    /// Tear down and release the transport handle without expecting further
    /// signals from it.
    ReleaseTransport,
    /// Run the service-cache refresh quirk. Must precede handle release.
    RefreshServiceCache { force: bool },
    /// Request GATT service discovery.
    DiscoverServices,
    /// Read a characteristic (the session-key capture).
    ReadCharacteristic(Uuid),
    /// Arm notifications on a characteristic.
    ArmNotify(Uuid),
    /// Write the next command frame to the command characteristic.
    WriteCommand(CommandFrame),
    /// Ask the transport for a graceful disconnect; the resulting link-drop
    /// signal drives the clean-disconnect path.
    RequestDisconnect,
    /// Timed suspension before the next effect.
    Settle(Duration),
    /// Deliver a listener event.
    Emit(LockEvent),
    /// Append one server-destined frame to the upload batcher.
    AddUpload {
        session: SessionKey,
        frame_hex: String,
    },
    /// Flush the upload batcher to the external uploader.
    FlushUploads,
}

// ----------------------------------------------------------------------------
// Transition Function
// ----------------------------------------------------------------------------

/// Apply one event to a record, returning the effects to execute.
///
/// All mutation of the record happens here (and in the router), under the
/// caller's exclusive ownership; the function itself never suspends.
pub fn step(record: &mut LockRecord, event: SessionEvent, config: &EngineConfig) -> Vec<Effect> {
    match event {
        SessionEvent::ConnectRequested => connect_requested(record),
        SessionEvent::TransportConnected => transport_connected(record),
        SessionEvent::TransportError { reason } => transport_error(record, reason, config),
        SessionEvent::ServicesDiscovered => services_discovered(record),
        SessionEvent::SessionRead { value } => session_read(record, &value),
        SessionEvent::NotifyArmed => notify_armed(record),
        SessionEvent::DisconnectObserved => disconnect_observed(record, config),
        SessionEvent::StopRequested => stop_requested(record),
    }
}

fn connect_requested(record: &mut LockRecord) -> Vec<Effect> {
    // Re-entrant connects while connecting or connected are no-ops.
    if record.phase != ConnectionPhase::Disconnected {
        debug!(mac = %record.mac, phase = ?record.phase, "connect ignored, not disconnected");
        return Vec::new();
    }
    record.phase = ConnectionPhase::Connecting;
    record.connection_attempts = 0;
    // Reusing a stale transport handle causes faults; always tear down first.
    vec![Effect::ReleaseTransport, Effect::Connect]
}

fn transport_connected(record: &mut LockRecord) -> Vec<Effect> {
    record.connection_attempts = 0;
    record.phase = ConnectionPhase::Connected;
    vec![
        Effect::Emit(LockEvent::Connecting {
            mac: record.mac.clone(),
        }),
        Effect::DiscoverServices,
    ]
}

fn transport_error(record: &mut LockRecord, reason: String, config: &EngineConfig) -> Vec<Effect> {
    record.connection_attempts += 1;
    if record.connection_attempts > config.max_connect_retries {
        // Retry budget exhausted; abandon the cycle and report once.
        warn!(mac = %record.mac, attempts = record.connection_attempts, "connection abandoned");
        let mac = record.mac.clone();
        let attempts = record.connection_attempts;
        record.clear_session();
        return vec![
            Effect::ReleaseTransport,
            Effect::Emit(LockEvent::Error {
                device: Some(mac),
                kind: ErrorKind::GattError,
                message: format!("GATT error after {} attempts: {}", attempts, reason),
            }),
        ];
    }

    debug!(mac = %record.mac, attempt = record.connection_attempts, "transport fault, retrying");
    // The cache refresh must run while the handle is still held.
    vec![
        Effect::RefreshServiceCache { force: true },
        Effect::ReleaseTransport,
        Effect::Settle(config.retry_settle_delay),
        Effect::Connect,
    ]
}

fn services_discovered(record: &mut LockRecord) -> Vec<Effect> {
    // Update-class devices take the firmware notification workflow; everyone
    // else reads the state characteristic to capture the session key. The
    // formal phase does not change on this branch.
    if record.is_firmware_variant() {
        vec![Effect::ArmNotify(FIRMWARE_RESPONSE_CHAR_UUID)]
    } else {
        vec![Effect::ReadCharacteristic(STATE_CHAR_UUID)]
    }
}

fn session_read(record: &mut LockRecord, value: &[u8]) -> Vec<Effect> {
    record.session = Some(SessionKey::from_bytes(value));
    vec![Effect::ArmNotify(RESPONSE_CHAR_UUID)]
}

fn notify_armed(record: &mut LockRecord) -> Vec<Effect> {
    // The descriptor write completing is what establishes the session; this
    // is the point the caller learns "connected".
    record.phase = ConnectionPhase::SessionEstablished;
    vec![Effect::Emit(LockEvent::Connected {
        mac: record.mac.clone(),
    })]
}

fn disconnect_observed(record: &mut LockRecord, config: &EngineConfig) -> Vec<Effect> {
    if record.phase == ConnectionPhase::Connecting {
        // Mid-handshake drops are platform races, not terminal disconnects:
        // reconnect silently without touching any counters.
        debug!(mac = %record.mac, "mid-handshake disconnect, reconnecting");
        return vec![Effect::ReleaseTransport, Effect::Connect];
    }

    if record.phase == ConnectionPhase::Disconnected {
        // Late signal from an already-released handle.
        return Vec::new();
    }

    if record.connection_attempts == 0 {
        // Clean disconnect: run the cache quirk before releasing the handle,
        // notify, then flush the batch.
        record.clear_session();
        return vec![
            Effect::RefreshServiceCache {
                force: config.force_cache_refresh,
            },
            Effect::ReleaseTransport,
            Effect::Emit(LockEvent::Disconnected {
                mac: record.mac.clone(),
            }),
            Effect::FlushUploads,
        ];
    }

    // A retry cycle is in flight; its own error path owns recovery.
    Vec::new()
}

fn stop_requested(record: &mut LockRecord) -> Vec<Effect> {
    // Obeyed from any phase. The queue is discarded, not flushed.
    record.clear_session();
    record.connection_attempts = 0;
    vec![Effect::ReleaseTransport]
}
