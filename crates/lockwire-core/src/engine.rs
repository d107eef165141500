//! Engine facade
//!
//! Owns the shared registry and upload batcher, the listener event channel,
//! and one dispatcher per connected lock. Scan callbacks, caller commands,
//! and persistence hooks all enter here; per-lock work is forwarded to the
//! lock's dispatcher so lifecycles stay isolated.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::advertisement::parse_advertisement;
use crate::config::EngineConfig;
use crate::dispatcher::{DispatcherHandle, SessionCommand, SessionContext, SessionDispatcher};
use crate::error::{ErrorKind, LockError, Result};
use crate::events::{EventSink, LockEvent};
use crate::registry::DeviceRegistry;
use crate::transport::{LockTransport, SignalReceiver};
use crate::types::{CommandFrame, LockRecord, MacAddress};
use crate::upload::{UploadBatcher, UploadPayload};

// ----------------------------------------------------------------------------
// Scan Environment
// ----------------------------------------------------------------------------

/// Host environment snapshot taken before each scan attempt.
#[derive(Debug, Clone, Copy)]
pub struct ScanEnvironment {
    pub bluetooth_supported: bool,
    pub bluetooth_enabled: bool,
    pub location_enabled: bool,
}

// ----------------------------------------------------------------------------
// Engine
// ----------------------------------------------------------------------------

/// Client-side protocol engine for a fleet of BLE locks.
pub struct LockEngine {
    registry: Arc<Mutex<DeviceRegistry>>,
    batcher: Arc<Mutex<UploadBatcher>>,
    uploads: mpsc::UnboundedSender<UploadPayload>,
    events: EventSink,
    config: EngineConfig,
    dispatchers: HashMap<MacAddress, DispatcherHandle>,
}

impl LockEngine {
    /// Create an engine along with its listener-event and upload channels.
    pub fn new(
        config: EngineConfig,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<LockEvent>,
        mpsc::UnboundedReceiver<UploadPayload>,
    ) {
        let (events, events_rx) = EventSink::channel();
        let (uploads_tx, uploads_rx) = mpsc::unbounded_channel();
        let engine = Self {
            registry: Arc::new(Mutex::new(DeviceRegistry::new())),
            batcher: Arc::new(Mutex::new(UploadBatcher::new())),
            uploads: uploads_tx,
            events,
            config,
            dispatchers: HashMap::new(),
        };
        (engine, events_rx, uploads_rx)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Registration and Discovery
    // ------------------------------------------------------------------

    /// Register a lock so passive scanning will accept it.
    pub async fn register(&self, record: LockRecord) {
        let mut registry = self.registry.lock().await;
        if !registry.contains(&record.mac) {
            info!(mac = %record.mac, "lock registered");
            registry.upsert(record);
        }
    }

    pub async fn remove(&self, mac: &MacAddress) -> Option<LockRecord> {
        self.registry.lock().await.remove(mac)
    }

    /// Check the host environment ahead of a scan attempt.
    ///
    /// Environment faults are reported once per attempt and are not
    /// retryable without user action. Returns whether scanning may proceed.
    pub fn scan_preflight(&self, env: ScanEnvironment) -> bool {
        if !env.bluetooth_supported {
            self.events.error(
                None,
                ErrorKind::ScanningUnsupported,
                "Bluetooth scanning is not supported",
            );
            return false;
        }
        if !env.location_enabled {
            self.events.error(
                None,
                ErrorKind::LocationDisabled,
                "Location services are disabled",
            );
            return false;
        }
        if !env.bluetooth_enabled {
            self.events
                .error(None, ErrorKind::BluetoothDisabled, "Bluetooth is disabled");
            return false;
        }
        true
    }

    /// Feed one raw advertisement from the scanner.
    ///
    /// Non-lock advertisements and unregistered MACs are ignored; accepted
    /// ones refresh the record and emit a discovery event.
    pub async fn on_advertisement(
        &self,
        name: &str,
        mac: MacAddress,
        payload: &[u8],
        rssi: Option<i16>,
    ) {
        let Some(identity) = parse_advertisement(name, mac, payload) else {
            return;
        };

        let accepted = {
            let mut registry = self.registry.lock().await;
            let accepted = registry.accept(&identity);
            if let Some(mac) = &accepted {
                if let Some(record) = registry.lookup_mut(mac) {
                    record.rssi = rssi;
                }
            }
            accepted
        };

        if let Some(mac) = accepted {
            debug!(%mac, "registered lock discovered");
            self.events.emit(LockEvent::DeviceDiscovered { mac });
        }
    }

    // ------------------------------------------------------------------
    // Session Control
    // ------------------------------------------------------------------

    /// Connect to a registered lock over the supplied transport.
    pub async fn connect(
        &mut self,
        mac: &MacAddress,
        transport: Box<dyn LockTransport>,
        signals: SignalReceiver,
    ) -> Result<()> {
        if !self.registry.lock().await.contains(mac) {
            return Err(LockError::NotRegistered { mac: mac.clone() });
        }
        self.dispatcher_for(mac, transport, signals)
            .send(SessionCommand::Connect)
    }

    /// Connect directly by address, registering the device on demand.
    ///
    /// Unlike passive scanning, a direct connect is an explicit caller
    /// intent, so an unknown MAC is registered rather than ignored.
    pub async fn connect_by_address(
        &mut self,
        mac: MacAddress,
        name: &str,
        transport: Box<dyn LockTransport>,
        signals: SignalReceiver,
    ) -> Result<()> {
        self.register(LockRecord::new(mac.clone(), name)).await;
        self.connect(&mac, transport, signals).await
    }

    /// Queue a command frame for a connected lock.
    pub fn enqueue(&self, mac: &MacAddress, frame: CommandFrame) -> Result<()> {
        self.live_dispatcher(mac)?
            .send(SessionCommand::Enqueue(frame))
    }

    /// Tear a session down from any state, discarding queued commands.
    pub fn disconnect(&mut self, mac: &MacAddress) -> Result<()> {
        let result = self.live_dispatcher(mac)?.send(SessionCommand::Stop);
        self.dispatchers.remove(mac);
        result
    }

    fn dispatcher_for(
        &mut self,
        mac: &MacAddress,
        transport: Box<dyn LockTransport>,
        signals: SignalReceiver,
    ) -> &DispatcherHandle {
        let ctx = SessionContext {
            registry: Arc::clone(&self.registry),
            batcher: Arc::clone(&self.batcher),
            uploads: self.uploads.clone(),
            events: self.events.clone(),
            config: self.config.clone(),
        };
        match self.dispatchers.entry(mac.clone()) {
            Entry::Occupied(mut entry) => {
                // Replace a handle whose task already exited so reconnects
                // respawn.
                if entry.get().is_finished() {
                    entry.insert(SessionDispatcher::spawn(mac.clone(), transport, signals, ctx));
                }
                entry.into_mut()
            }
            Entry::Vacant(entry) => {
                entry.insert(SessionDispatcher::spawn(mac.clone(), transport, signals, ctx))
            }
        }
    }

    fn live_dispatcher(&self, mac: &MacAddress) -> Result<&DispatcherHandle> {
        self.dispatchers
            .get(mac)
            .filter(|h| !h.is_finished())
            .ok_or_else(|| LockError::DispatcherGone { mac: mac.clone() })
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Serialize all known devices for the storage collaborator.
    pub async fn export_devices(&self) -> Result<Vec<String>> {
        self.registry.lock().await.export_entries()
    }

    /// Reload devices persisted by [`export_devices`](Self::export_devices).
    pub async fn import_devices(&self, entries: &[String]) {
        self.registry.lock().await.import_entries(entries);
    }

    /// Serialize the pending upload set for the storage collaborator.
    pub async fn export_pending_uploads(&self) -> Result<Vec<String>> {
        self.batcher.lock().await.export_entries()
    }

    /// Reload pending uploads persisted by
    /// [`export_pending_uploads`](Self::export_pending_uploads).
    pub async fn import_pending_uploads(&self, entries: &[String]) {
        self.batcher.lock().await.import_entries(entries);
    }

    /// Snapshot of a lock record, if registered.
    pub async fn lookup(&self, mac: &MacAddress) -> Option<LockRecord> {
        self.registry.lock().await.lookup(mac).cloned()
    }
}
