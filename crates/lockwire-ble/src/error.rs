//! Error types for the BLE central

use lockwire_core::{LockError, MacAddress};
use thiserror::Error;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the btleplug-backed central
#[derive(Error, Debug)]
pub enum BleCentralError {
    #[error("No BLE adapters available")]
    AdapterNotAvailable,

    #[error("Device not in range or not yet discovered: {mac}")]
    DeviceNotFound { mac: MacAddress },

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("No device connected")]
    NotConnected,

    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound { uuid: Uuid },

    #[error("BLE stack error: {0}")]
    Ble(#[from] btleplug::Error),
}

impl From<BleCentralError> for LockError {
    fn from(err: BleCentralError) -> Self {
        match err {
            BleCentralError::CharacteristicNotFound { uuid } => LockError::CharacteristicNotFound {
                uuid: uuid.to_string(),
            },
            other => LockError::Gatt(other.to_string()),
        }
    }
}
