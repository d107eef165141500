//! Upload batching for server-destined frames
//!
//! Server frames arriving over one session are merged into a single record;
//! a flush serializes every pending record into one payload for the external
//! uploader and clears the set. The batcher holds no transport or timing
//! logic of its own.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::{MacAddress, SessionKey};

// ----------------------------------------------------------------------------
// Upload Records
// ----------------------------------------------------------------------------

/// One batched unit for the external uploader.
///
/// At most one record per distinct session key is ever live at once; later
/// frames sharing the session append rather than duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub session: SessionKey,
    /// Server-destined raw frames, hex-encoded, in arrival order.
    pub responses: Vec<String>,
    pub mac: MacAddress,
    /// First-received time as a decimal Unix-seconds string.
    pub received_time: String,
}

/// Payload shape handed to the uploader collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadPayload {
    pub data: Vec<UploadRecord>,
}

// ----------------------------------------------------------------------------
// Batcher
// ----------------------------------------------------------------------------

/// Accumulates server-destined frames keyed by session.
#[derive(Debug, Default)]
pub struct UploadBatcher {
    pending: Vec<UploadRecord>,
}

impl UploadBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one server-destined frame.
    ///
    /// Frames sharing an existing record's session key append to it; a new
    /// session opens a new record stamped with the current time.
    pub fn add(&mut self, session: SessionKey, mac: MacAddress, frame_hex: String) {
        if let Some(record) = self.pending.iter_mut().find(|r| r.session == session) {
            record.responses.push(frame_hex);
            return;
        }

        self.pending.push(UploadRecord {
            session,
            responses: vec![frame_hex],
            mac,
            received_time: unix_seconds_string(),
        });
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drain all pending records into one upload payload.
    ///
    /// Partial flush is not supported; either everything pending goes out as
    /// a batch or (when empty) nothing does.
    pub fn flush(&mut self) -> Option<UploadPayload> {
        if self.pending.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.pending);
        debug!("flushing {} upload record(s)", data.len());
        Some(UploadPayload { data })
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Serialize pending records as independently parseable JSON entries for
    /// the storage collaborator, invoked explicitly (never automatically).
    pub fn export_entries(&self) -> Result<Vec<String>> {
        self.pending
            .iter()
            .map(|record| serde_json::to_string(record).map_err(Into::into))
            .collect()
    }

    /// Reload pending records from persisted entries; malformed entries are
    /// skipped with a warning. Reloaded records merge by session key like
    /// live ones, keeping the one-record-per-session invariant.
    pub fn import_entries(&mut self, entries: &[String]) {
        for entry in entries {
            match serde_json::from_str::<UploadRecord>(entry) {
                Ok(record) => {
                    if let Some(existing) =
                        self.pending.iter_mut().find(|r| r.session == record.session)
                    {
                        existing.responses.extend(record.responses);
                    } else {
                        self.pending.push(record);
                    }
                }
                Err(e) => warn!("skipping malformed upload entry: {}", e),
            }
        }
    }
}

fn unix_seconds_string() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(n: u8) -> SessionKey {
        SessionKey::from_bytes(&[n; 4])
    }

    fn mac() -> MacAddress {
        MacAddress::new("C7:00:11:22:33:44")
    }

    #[test]
    fn same_session_frames_merge_in_order() {
        let mut batcher = UploadBatcher::new();
        batcher.add(session(1), mac(), "50AA".to_string());
        batcher.add(session(1), mac(), "50BB".to_string());

        assert_eq!(batcher.pending_count(), 1);
        let payload = batcher.flush().unwrap();
        assert_eq!(payload.data[0].responses, vec!["50AA", "50BB"]);
    }

    #[test]
    fn distinct_sessions_get_distinct_records() {
        let mut batcher = UploadBatcher::new();
        batcher.add(session(1), mac(), "50AA".to_string());
        batcher.add(session(2), mac(), "50BB".to_string());
        assert_eq!(batcher.pending_count(), 2);
    }

    #[test]
    fn flush_drains_everything_or_nothing() {
        let mut batcher = UploadBatcher::new();
        assert!(batcher.flush().is_none());

        batcher.add(session(1), mac(), "50AA".to_string());
        let payload = batcher.flush().unwrap();
        assert_eq!(payload.data.len(), 1);
        assert_eq!(batcher.pending_count(), 0);
        assert!(batcher.flush().is_none());
    }

    #[test]
    fn payload_shape_matches_uploader_contract() {
        let mut batcher = UploadBatcher::new();
        batcher.add(session(1), mac(), "50AA".to_string());
        let payload = batcher.flush().unwrap();

        let json = serde_json::to_value(&payload).unwrap();
        let record = &json["data"][0];
        assert_eq!(record["session"], "01010101");
        assert_eq!(record["mac"], "C7:00:11:22:33:44");
        assert_eq!(record["responses"][0], "50AA");
        // Decimal Unix-seconds string, not a number.
        assert!(record["received_time"].is_string());
        let seconds: u64 = record["received_time"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(seconds > 1_500_000_000);
    }

    #[test]
    fn entries_round_trip_in_any_order() {
        let mut batcher = UploadBatcher::new();
        batcher.add(session(1), mac(), "50AA".to_string());
        batcher.add(session(2), mac(), "50BB".to_string());

        let mut entries = batcher.export_entries().unwrap();
        entries.reverse();

        let mut reloaded = UploadBatcher::new();
        reloaded.import_entries(&entries);
        assert_eq!(reloaded.pending_count(), 2);

        // Reloaded records still merge with new frames by session.
        reloaded.add(session(2), mac(), "50CC".to_string());
        assert_eq!(reloaded.pending_count(), 2);
    }
}
