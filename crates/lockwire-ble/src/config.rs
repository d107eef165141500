//! BLE central configuration

use std::time::Duration;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the btleplug-backed central
#[derive(Debug, Clone)]
pub struct BleConfig {
    /// Upper bound on one platform connect call. Faults past this bound are
    /// reported as transport errors and retried by the engine, not here.
    pub connection_timeout: Duration,
    /// How long a connect call waits for the target to appear in the adapter
    /// cache before giving up.
    pub discovery_timeout: Duration,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            discovery_timeout: Duration::from_secs(5),
        }
    }
}

impl BleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the discovery timeout
    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }
}
