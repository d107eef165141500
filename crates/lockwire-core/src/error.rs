//! Error types for the lock protocol engine
//!
//! Errors fall into four families: environment errors (Bluetooth/location
//! unavailable), transport errors (GATT-layer faults, retried with a bounded
//! budget), protocol errors (rejection results from the lock, reported but
//! never queue-aborting), and structural errors (missing services or
//! characteristics, invalid handles — aborted locally, never retried).

use thiserror::Error;

use crate::types::MacAddress;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors raised by the lock protocol engine
#[derive(Error, Debug)]
pub enum LockError {
    #[error("Bluetooth is disabled")]
    BluetoothDisabled,

    #[error("Location services are disabled")]
    LocationDisabled,

    #[error("Bluetooth scanning is not supported")]
    ScanningUnsupported,

    #[error("GATT error: {0}")]
    Gatt(String),

    #[error("Connection failed after {attempts} attempts: {reason}")]
    ConnectionExhausted { attempts: u32, reason: String },

    #[error("Invalid lock device: {reason}")]
    InvalidDevice { reason: String },

    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound { uuid: String },

    #[error("Device not registered: {mac}")]
    NotRegistered { mac: MacAddress },

    #[error("No session established with {mac}")]
    NoSession { mac: MacAddress },

    #[error("Session dispatcher for {mac} is gone")]
    DispatcherGone { mac: MacAddress },

    #[error("Persistence entry is malformed: {0}")]
    MalformedEntry(String),

    #[error("Upload serialization failed: {0}")]
    UploadSerialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LockError>;

// ----------------------------------------------------------------------------
// Listener Error Kinds
// ----------------------------------------------------------------------------

/// Error kind tags carried on the listener error channel.
///
/// Every error surfaces through the single listener channel tagged with one
/// of these kinds and the offending lock (or none for global errors).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    // Environment errors, reported once per scan attempt.
    BluetoothDisabled,
    LocationDisabled,
    ScanningUnsupported,

    // Transport errors, retried up to the configured budget.
    GattError,

    // Protocol errors from the lock, courtesy-continue.
    InvalidKey,
    InvalidCommand,
    InvalidPermission,
    InvalidData,
    InvalidResult,
    UnknownResult,

    // Structural errors, aborted locally.
    InvalidDevice,
}

impl ErrorKind {
    /// Whether this kind indicates a rejection result from the lock itself.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::InvalidKey
                | Self::InvalidCommand
                | Self::InvalidPermission
                | Self::InvalidData
                | Self::InvalidResult
                | Self::UnknownResult
        )
    }
}
