//! btleplug-backed implementation of the core transport trait
//!
//! One `BleCentral` owns one platform connection at a time. Notifications and
//! link drops are forwarded onto the signal channel by background tasks; the
//! engine's dispatcher consumes them and decides what happens next, so this
//! layer carries no retry or session logic of its own.

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};
use uuid::Uuid;

use lockwire_core::transport::{signal_channel, SignalReceiver, SignalSender, TransportSignal};
use lockwire_core::{LockTransport, MacAddress, Result as LockResult};

use crate::config::BleConfig;
use crate::error::BleCentralError;

// ----------------------------------------------------------------------------
// Central
// ----------------------------------------------------------------------------

/// A single-device BLE central handle.
pub struct BleCentral {
    adapter: Adapter,
    config: BleConfig,
    signals: SignalSender,
    peripheral: Option<Peripheral>,
    notify_task: Option<JoinHandle<()>>,
    watch_task: Option<JoinHandle<()>>,
}

impl BleCentral {
    /// Create a central on the first available adapter, returning the signal
    /// receiver to hand to the engine alongside the transport.
    pub async fn new(config: BleConfig) -> Result<(Self, SignalReceiver), BleCentralError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(BleCentralError::AdapterNotAvailable)?;
        Ok(Self::from_adapter(adapter, config))
    }

    /// Create a central on an explicit adapter (e.g. the scanner's).
    pub fn from_adapter(adapter: Adapter, config: BleConfig) -> (Self, SignalReceiver) {
        let (signals, receiver) = signal_channel();
        let central = Self {
            adapter,
            config,
            signals,
            peripheral: None,
            notify_task: None,
            watch_task: None,
        };
        (central, receiver)
    }

    /// Find the peripheral for a MAC in the adapter cache, scanning for it if
    /// it has not been seen yet.
    async fn locate(&self, mac: &MacAddress) -> Result<Peripheral, BleCentralError> {
        if let Some(peripheral) = self.cached(mac).await? {
            return Ok(peripheral);
        }

        debug!(%mac, "target not cached, scanning");
        self.adapter.start_scan(ScanFilter::default()).await?;
        let found = timeout(self.config.discovery_timeout, async {
            loop {
                if let Ok(Some(peripheral)) = self.cached(mac).await {
                    return peripheral;
                }
                sleep(Duration::from_millis(100)).await;
            }
        })
        .await;
        self.adapter.stop_scan().await?;

        found.map_err(|_| BleCentralError::DeviceNotFound { mac: mac.clone() })
    }

    async fn cached(&self, mac: &MacAddress) -> Result<Option<Peripheral>, BleCentralError> {
        for peripheral in self.adapter.peripherals().await? {
            if let Ok(Some(properties)) = peripheral.properties().await {
                if MacAddress::new(properties.address.to_string()) == *mac {
                    return Ok(Some(peripheral));
                }
            }
        }
        Ok(None)
    }

    fn connected(&self) -> Result<&Peripheral, BleCentralError> {
        self.peripheral.as_ref().ok_or(BleCentralError::NotConnected)
    }

    fn characteristic(&self, uuid: Uuid) -> Result<(Peripheral, Characteristic), BleCentralError> {
        let peripheral = self.connected()?.clone();
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(BleCentralError::CharacteristicNotFound { uuid })?;
        Ok((peripheral, characteristic))
    }

    /// Forward link drops for this peripheral onto the signal channel.
    async fn watch_link(&mut self, peripheral: &Peripheral) -> Result<(), BleCentralError> {
        if let Some(task) = self.watch_task.take() {
            task.abort();
        }
        let mut events = self.adapter.events().await?;
        let id = peripheral.id();
        let signals = self.signals.clone();
        self.watch_task = Some(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(gone) = event {
                    if gone == id {
                        let _ = signals.send(TransportSignal::Disconnected);
                    }
                }
            }
        }));
        Ok(())
    }

    /// Forward characteristic notifications onto the signal channel.
    async fn forward_notifications(&mut self, peripheral: &Peripheral) -> Result<(), BleCentralError> {
        if self.notify_task.is_some() {
            return Ok(());
        }
        let mut notifications = peripheral.notifications().await?;
        let signals = self.signals.clone();
        self.notify_task = Some(tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                let forwarded = signals.send(TransportSignal::Notification {
                    uuid: notification.uuid,
                    value: notification.value,
                });
                if forwarded.is_err() {
                    break;
                }
            }
            debug!("notification forwarder ended");
        }));
        Ok(())
    }
}

impl Drop for BleCentral {
    fn drop(&mut self) {
        if let Some(task) = self.notify_task.take() {
            task.abort();
        }
        if let Some(task) = self.watch_task.take() {
            task.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Transport Implementation
// ----------------------------------------------------------------------------

#[async_trait]
impl LockTransport for BleCentral {
    async fn connect(&mut self, mac: &MacAddress) -> LockResult<()> {
        let peripheral = self.locate(mac).await?;

        timeout(self.config.connection_timeout, peripheral.connect())
            .await
            .map_err(|_| BleCentralError::ConnectionTimeout)?
            .map_err(BleCentralError::from)?;

        self.watch_link(&peripheral).await?;
        self.peripheral = Some(peripheral);
        debug!(%mac, "transport link established");
        Ok(())
    }

    async fn discover_services(&mut self) -> LockResult<()> {
        self.connected()?
            .discover_services()
            .await
            .map_err(BleCentralError::from)?;
        Ok(())
    }

    async fn read_characteristic(&mut self, uuid: Uuid) -> LockResult<Vec<u8>> {
        let (peripheral, characteristic) = self.characteristic(uuid)?;
        let value = peripheral
            .read(&characteristic)
            .await
            .map_err(BleCentralError::from)?;
        Ok(value)
    }

    async fn write_characteristic(&mut self, uuid: Uuid, value: &[u8]) -> LockResult<()> {
        let (peripheral, characteristic) = self.characteristic(uuid)?;
        peripheral
            .write(&characteristic, value, WriteType::WithResponse)
            .await
            .map_err(BleCentralError::from)?;
        Ok(())
    }

    async fn set_notify(&mut self, uuid: Uuid, enabled: bool) -> LockResult<()> {
        let (peripheral, characteristic) = self.characteristic(uuid)?;
        if enabled {
            peripheral
                .subscribe(&characteristic)
                .await
                .map_err(BleCentralError::from)?;
            self.forward_notifications(&peripheral).await?;
        } else {
            peripheral
                .unsubscribe(&characteristic)
                .await
                .map_err(BleCentralError::from)?;
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> LockResult<()> {
        if let Some(task) = self.notify_task.take() {
            task.abort();
        }
        let Some(peripheral) = self.peripheral.take() else {
            return Ok(());
        };
        if let Err(e) = peripheral.disconnect().await {
            // Tearing down a dead handle is routine, not a fault.
            warn!("peripheral disconnect failed: {}", e);
        }
        Ok(())
    }

    // btleplug exposes no bonding state, so `is_bonded` keeps its default.

    async fn refresh_service_cache(&mut self) -> LockResult<()> {
        debug!("service cache refresh not supported by this platform, skipping");
        Ok(())
    }
}
