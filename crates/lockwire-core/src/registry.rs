//! Device registry
//!
//! Mapping from MAC address to known lock records. Only registered devices
//! are accepted during passive scanning; direct connects may register a MAC
//! on demand. First-seen order is preserved for bulk enumeration.

use std::collections::HashMap;

use tracing::warn;

use crate::advertisement::LockIdentity;
use crate::error::Result;
use crate::types::{LockRecord, MacAddress};

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

/// Insertion-ordered registry of lock records, keyed by MAC.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    records: HashMap<MacAddress, LockRecord>,
    /// First-seen insertion order of the keys in `records`.
    order: Vec<MacAddress>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept an identity seen during scanning.
    ///
    /// Returns the record's MAC only if the device is already registered;
    /// unknown MACs are ignored during passive scanning. An accepted
    /// identity refreshes the record's name and version tag.
    pub fn accept(&mut self, identity: &LockIdentity) -> Option<MacAddress> {
        let record = self.records.get_mut(&identity.mac)?;
        record.name = identity.name.clone();
        if identity.version.is_some() {
            record.version = identity.version.clone();
        }
        Some(identity.mac.clone())
    }

    pub fn lookup(&self, mac: &MacAddress) -> Option<&LockRecord> {
        self.records.get(mac)
    }

    pub fn lookup_mut(&mut self, mac: &MacAddress) -> Option<&mut LockRecord> {
        self.records.get_mut(mac)
    }

    pub fn contains(&self, mac: &MacAddress) -> bool {
        self.records.contains_key(mac)
    }

    /// Insert or replace a record, preserving first-seen order.
    pub fn upsert(&mut self, record: LockRecord) {
        if !self.records.contains_key(&record.mac) {
            self.order.push(record.mac.clone());
        }
        self.records.insert(record.mac.clone(), record);
    }

    pub fn remove(&mut self, mac: &MacAddress) -> Option<LockRecord> {
        let removed = self.records.remove(mac);
        if removed.is_some() {
            self.order.retain(|m| m != mac);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &LockRecord> {
        self.order.iter().filter_map(|mac| self.records.get(mac))
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Serialize every record as an independently parseable JSON entry for
    /// the storage collaborator. No ordering is required on reload.
    pub fn export_entries(&self) -> Result<Vec<String>> {
        self.iter()
            .map(|record| serde_json::to_string(record).map_err(Into::into))
            .collect()
    }

    /// Reload records from persisted entries. Malformed entries are skipped
    /// with a warning rather than failing the whole reload.
    pub fn import_entries(&mut self, entries: &[String]) {
        for entry in entries {
            match serde_json::from_str::<LockRecord>(entry) {
                Ok(record) => self.upsert(record),
                Err(e) => warn!("skipping malformed device entry: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LockState;

    fn mac(n: u8) -> MacAddress {
        MacAddress::new(format!("C7:00:00:00:00:{:02X}", n))
    }

    fn identity(n: u8) -> LockIdentity {
        LockIdentity {
            mac: mac(n),
            name: format!("NOKE3P_{:02X}", n),
            version: Some("3P-2.13.4".to_string()),
        }
    }

    #[test]
    fn accept_requires_registration() {
        let mut registry = DeviceRegistry::new();
        assert_eq!(registry.accept(&identity(1)), None);

        registry.upsert(LockRecord::new(mac(1), "NOKE3P_01"));
        assert_eq!(registry.accept(&identity(1)), Some(mac(1)));
        assert_eq!(
            registry.lookup(&mac(1)).unwrap().version.as_deref(),
            Some("3P-2.13.4")
        );
    }

    #[test]
    fn upsert_preserves_first_seen_order() {
        let mut registry = DeviceRegistry::new();
        for n in [3u8, 1, 2] {
            registry.upsert(LockRecord::new(mac(n), format!("NOKE3P_{:02X}", n)));
        }
        // Replacing an existing record must not reorder it.
        registry.upsert(LockRecord::new(mac(1), "NOKE3P_01B"));

        let order: Vec<_> = registry.iter().map(|r| r.mac.clone()).collect();
        assert_eq!(order, vec![mac(3), mac(1), mac(2)]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn no_two_records_share_a_mac() {
        let mut registry = DeviceRegistry::new();
        registry.upsert(LockRecord::new(mac(1), "NOKE3P_A"));
        registry.upsert(LockRecord::new(mac(1), "NOKE3P_B"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(&mac(1)).unwrap().name, "NOKE3P_B");
    }

    #[test]
    fn entries_round_trip_in_any_order() {
        let mut registry = DeviceRegistry::new();
        for n in 1..=3u8 {
            let mut record = LockRecord::new(mac(n), format!("NOKE3P_{:02X}", n));
            record.lock_state = LockState::Locked;
            registry.upsert(record);
        }

        let mut entries = registry.export_entries().unwrap();
        entries.reverse();

        let mut reloaded = DeviceRegistry::new();
        reloaded.import_entries(&entries);

        assert_eq!(reloaded.len(), 3);
        for n in 1..=3u8 {
            let record = reloaded.lookup(&mac(n)).unwrap();
            assert_eq!(record.lock_state, LockState::Locked);
        }
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let mut registry = DeviceRegistry::new();
        registry.import_entries(&[
            "not json".to_string(),
            serde_json::to_string(&LockRecord::new(mac(9), "NOKE3P_09")).unwrap(),
        ]);
        assert_eq!(registry.len(), 1);
    }
}
