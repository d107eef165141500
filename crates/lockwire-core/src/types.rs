//! Core types for the lock protocol engine

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LockError;

// ----------------------------------------------------------------------------
// Identity Types
// ----------------------------------------------------------------------------

/// MAC address of a lock, normalized to uppercase colon-separated form.
///
/// Uniquely identifies a [`LockRecord`] within the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacAddress(String);

impl MacAddress {
    /// Create a MAC address, normalizing case.
    pub fn new(mac: impl AsRef<str>) -> Self {
        Self(mac.as_ref().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MacAddress {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(LockError::InvalidDevice {
                reason: "empty MAC address".into(),
            });
        }
        Ok(Self::new(s))
    }
}

/// Opaque session key read from the lock's state characteristic on connect.
///
/// Required for frame authentication, which happens outside this engine; here
/// it only keys the upload batcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Capture a session key from raw characteristic bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode_upper(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One outgoing instruction to a lock, hex-encoded by an external command
/// builder. Opaque to this engine except for ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandFrame(String);

impl CommandFrame {
    pub fn new(hex_frame: impl Into<String>) -> Self {
        Self(hex_frame.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode to raw bytes for the characteristic write.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LockError> {
        hex::decode(&self.0).map_err(|_| LockError::InvalidDevice {
            reason: format!("command frame is not valid hex: {}", self.0),
        })
    }
}

// ----------------------------------------------------------------------------
// Runtime State
// ----------------------------------------------------------------------------

/// Last known physical bolt state of a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LockState {
    #[default]
    Unknown,
    Locked,
    Unlocked,
}

/// Connection lifecycle phase of one lock session.
///
/// `Unlocked` is the terminal success state; every disconnect returns the
/// record to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    Connecting,
    /// Transport is up, service discovery and session capture pending.
    Connected,
    /// Notifications are armed and the session key is captured.
    SessionEstablished,
    Unlocked,
}

impl ConnectionPhase {
    /// Whether the session is far enough along to hold a key and a queue.
    pub fn is_established(&self) -> bool {
        matches!(self, Self::SessionEstablished | Self::Unlocked)
    }
}

// ----------------------------------------------------------------------------
// Lock Record
// ----------------------------------------------------------------------------

/// Identity and mutable runtime state of one physical lock.
///
/// Session key and command queue are populated only while a session is
/// established and are cleared on every disconnect; the record itself
/// persists across disconnects until explicitly removed from the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    /// Immutable registry key.
    pub mac: MacAddress,
    /// Advertised device name.
    pub name: String,
    /// Firmware/hardware version tag derived from the advertisement, when the
    /// name carries a non-legacy version code.
    pub version: Option<String>,
    /// Last known signal strength from scanning.
    pub rssi: Option<i16>,
    /// Last known physical bolt state.
    pub lock_state: LockState,

    // Runtime-only state, reset on reload.
    #[serde(skip)]
    pub phase: ConnectionPhase,
    #[serde(skip)]
    pub session: Option<SessionKey>,
    #[serde(skip)]
    pub commands: VecDeque<CommandFrame>,
    #[serde(skip)]
    pub connection_attempts: u32,
}

impl LockRecord {
    pub fn new(mac: MacAddress, name: impl Into<String>) -> Self {
        Self {
            mac,
            name: name.into(),
            version: None,
            rssi: None,
            lock_state: LockState::Unknown,
            phase: ConnectionPhase::Disconnected,
            session: None,
            commands: VecDeque::new(),
            connection_attempts: 0,
        }
    }

    /// Whether the advertised name marks a firmware-update variant.
    ///
    /// Update-class devices expose the firmware characteristic workflow
    /// instead of the session-key read.
    pub fn is_firmware_variant(&self) -> bool {
        crate::advertisement::is_firmware_name(&self.name)
    }

    /// Clear all per-session state. Runs on every disconnect.
    pub fn clear_session(&mut self) {
        self.session = None;
        self.commands.clear();
        self.phase = ConnectionPhase::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_address_normalizes_case() {
        let mac = MacAddress::new("aa:bb:cc:dd:ee:ff");
        assert_eq!(mac.as_str(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(mac, MacAddress::new("AA:BB:CC:DD:EE:FF"));
    }

    #[test]
    fn session_key_hex_encodes() {
        let key = SessionKey::from_bytes(&[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(key.as_str(), "DEADBEEF");
    }

    #[test]
    fn record_clears_session_state() {
        let mut record = LockRecord::new(MacAddress::new("CC:BB:AA:00:11:22"), "NOKE3E_XYZ");
        record.phase = ConnectionPhase::SessionEstablished;
        record.session = Some(SessionKey::from_bytes(&[1, 2, 3]));
        record.commands.push_back(CommandFrame::new("7E00"));

        record.clear_session();

        assert_eq!(record.phase, ConnectionPhase::Disconnected);
        assert!(record.session.is_none());
        assert!(record.commands.is_empty());
    }

    #[test]
    fn record_serde_skips_runtime_state() {
        let mut record = LockRecord::new(MacAddress::new("CC:BB:AA:00:11:22"), "NOKE3E_XYZ");
        record.phase = ConnectionPhase::SessionEstablished;
        record.session = Some(SessionKey::from_bytes(&[1, 2, 3]));
        record.commands.push_back(CommandFrame::new("7E00"));
        record.lock_state = LockState::Locked;

        let json = serde_json::to_string(&record).unwrap();
        let reloaded: LockRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(reloaded.mac, record.mac);
        assert_eq!(reloaded.lock_state, LockState::Locked);
        assert_eq!(reloaded.phase, ConnectionPhase::Disconnected);
        assert!(reloaded.session.is_none());
        assert!(reloaded.commands.is_empty());
    }
}
