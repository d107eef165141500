//! Engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the lock protocol engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Pause between scan windows while the app is foregrounded.
    pub foreground_scan_interval: Duration,
    /// Pause between scan windows while backgrounded.
    pub background_scan_interval: Duration,
    /// Retry budget for transport errors on one connect cycle. The first
    /// attempt is not counted, so the default allows 5 connects total.
    pub max_connect_retries: u32,
    /// Settle delay between releasing a faulted transport handle and the
    /// next connect attempt.
    pub retry_settle_delay: Duration,
    /// Endpoint handed to the external uploader along with flushed batches.
    pub upload_endpoint: String,
    /// Force the service-cache refresh quirk on every disconnect, not just
    /// error-path ones.
    pub force_cache_refresh: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            foreground_scan_interval: Duration::from_millis(10),
            background_scan_interval: Duration::from_millis(10),
            max_connect_retries: 4,
            retry_settle_delay: Duration::from_millis(2600),
            upload_endpoint: "https://lockwire.example/api/upload/".to_string(),
            force_cache_refresh: false,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the foreground scan interval
    pub fn with_foreground_scan_interval(mut self, interval: Duration) -> Self {
        self.foreground_scan_interval = interval;
        self
    }

    /// Set the background scan interval
    pub fn with_background_scan_interval(mut self, interval: Duration) -> Self {
        self.background_scan_interval = interval;
        self
    }

    /// Set the transport-error retry budget
    pub fn with_max_connect_retries(mut self, retries: u32) -> Self {
        self.max_connect_retries = retries;
        self
    }

    /// Set the post-fault settle delay
    pub fn with_retry_settle_delay(mut self, delay: Duration) -> Self {
        self.retry_settle_delay = delay;
        self
    }

    /// Set the upload endpoint
    pub fn with_upload_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.upload_endpoint = endpoint.into();
        self
    }

    /// Force the cache-refresh quirk on every disconnect
    pub fn with_force_cache_refresh(mut self, force: bool) -> Self {
        self.force_cache_refresh = force;
        self
    }
}
