//! BLE scanning and advertisement forwarding
//!
//! The scanner watches adapter events and forwards every named advertisement
//! as a [`ScanHit`]; deciding whether a hit is a registered lock is the
//! engine's job. btleplug pre-parses manufacturer data into per-company
//! entries, so the raw TLV record the engine's parser expects is rebuilt
//! here.

use std::collections::HashMap;

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager};
use futures::stream::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use lockwire_core::MacAddress;

use crate::error::BleCentralError;

/// AD type byte of a manufacturer-specific TLV record.
const MANUFACTURER_DATA_TYPE: u8 = 0xFF;

// ----------------------------------------------------------------------------
// Scan Hits
// ----------------------------------------------------------------------------

/// One named advertisement seen during scanning, ready for
/// `LockEngine::on_advertisement`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanHit {
    pub name: String,
    pub mac: MacAddress,
    /// Manufacturer records re-encoded as raw TLV bytes.
    pub payload: Vec<u8>,
    pub rssi: Option<i16>,
}

/// Rebuild raw manufacturer TLV records from btleplug's parsed form.
///
/// Each record is `[length, 0xFF, company_lo, company_hi, data...]` with the
/// length byte counting everything after itself.
fn manufacturer_tlv(data: &HashMap<u16, Vec<u8>>) -> Vec<u8> {
    let mut payload = Vec::new();
    for (company, value) in data {
        payload.push((3 + value.len()) as u8);
        payload.push(MANUFACTURER_DATA_TYPE);
        payload.extend_from_slice(&company.to_le_bytes());
        payload.extend_from_slice(value);
    }
    payload
}

// ----------------------------------------------------------------------------
// Scanner
// ----------------------------------------------------------------------------

/// Scans for lock advertisements on one adapter.
pub struct LockScanner {
    adapter: Adapter,
    forward_task: Option<JoinHandle<()>>,
}

impl LockScanner {
    /// Create a scanner on the first available adapter.
    pub async fn new() -> Result<Self, BleCentralError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(BleCentralError::AdapterNotAvailable)?;
        Ok(Self::from_adapter(adapter))
    }

    pub fn from_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            forward_task: None,
        }
    }

    /// The adapter this scanner uses; connects should share it so the target
    /// is already in the adapter cache.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Start scanning, returning the stream of named advertisements.
    ///
    /// Locks advertise their identity in the device name rather than the
    /// service list, so the scan runs unfiltered.
    pub async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<ScanHit>, BleCentralError> {
        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;
        info!("BLE scan started");

        let adapter = self.adapter.clone();
        let (hits_tx, hits_rx) = mpsc::unbounded_channel();
        self.forward_task = Some(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => continue,
                };
                let Ok(peripheral) = adapter.peripheral(&id).await else {
                    continue;
                };
                let Ok(Some(properties)) = peripheral.properties().await else {
                    continue;
                };
                let Some(name) = properties.local_name else {
                    continue;
                };
                let hit = ScanHit {
                    name,
                    mac: MacAddress::new(properties.address.to_string()),
                    payload: manufacturer_tlv(&properties.manufacturer_data),
                    rssi: properties.rssi,
                };
                if hits_tx.send(hit).is_err() {
                    break;
                }
            }
            debug!("advertisement forwarder ended");
        }));

        Ok(hits_rx)
    }

    /// Stop scanning and drop the forwarder.
    pub async fn stop(&mut self) -> Result<(), BleCentralError> {
        if let Some(task) = self.forward_task.take() {
            task.abort();
        }
        self.adapter.stop_scan().await?;
        info!("BLE scan stopped");
        Ok(())
    }
}

impl Drop for LockScanner {
    fn drop(&mut self) {
        if let Some(task) = self.forward_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockwire_core::parse_advertisement;

    #[test]
    fn rebuilt_tlv_matches_the_engine_parser() {
        let mut data = HashMap::new();
        data.insert(0x0123u16, vec![0x02, 0x0D, 0x04]);

        let payload = manufacturer_tlv(&data);
        assert_eq!(payload, vec![0x06, 0xFF, 0x23, 0x01, 0x02, 0x0D, 0x04]);

        let identity = parse_advertisement(
            "NOKE3P_ABC123",
            MacAddress::new("C7:00:11:22:33:44"),
            &payload,
        )
        .unwrap();
        assert_eq!(identity.version.as_deref(), Some("3P-2.13.4"));
    }

    #[test]
    fn empty_manufacturer_data_yields_empty_payload() {
        assert!(manufacturer_tlv(&HashMap::new()).is_empty());
    }
}
