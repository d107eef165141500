//! btleplug-based BLE central for the lockwire protocol engine
//!
//! This crate connects `lockwire-core` to a real Bluetooth stack: a scanner
//! that surfaces lock advertisements and a central implementing the core's
//! `LockTransport` trait over btleplug.
//!
//! ## Architecture
//!
//! - [`config`] - Central configuration (timeouts)
//! - [`error`] - Error types specific to the BLE layer
//! - [`scanner`] - Adapter scanning and advertisement forwarding
//! - [`central`] - The `LockTransport` implementation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lockwire_ble::{BleCentral, BleConfig, LockScanner};
//! use lockwire_core::{EngineConfig, LockEngine, MacAddress};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (mut engine, _events, _uploads) = LockEngine::new(EngineConfig::default());
//!
//! let mut scanner = LockScanner::new().await?;
//! let mut hits = scanner.start().await?;
//!
//! // Feed advertisements to the engine; registered locks surface as
//! // DeviceDiscovered events.
//! if let Some(hit) = hits.recv().await {
//!     engine
//!         .on_advertisement(&hit.name, hit.mac.clone(), &hit.payload, hit.rssi)
//!         .await;
//! }
//!
//! // Connect over a central sharing the scanner's adapter.
//! let (central, signals) =
//!     BleCentral::from_adapter(scanner.adapter().clone(), BleConfig::default());
//! let mac = MacAddress::new("C7:00:11:22:33:44");
//! engine.connect(&mac, Box::new(central), signals).await?;
//! # Ok(())
//! # }
//! ```

mod central;
mod config;
mod error;
mod scanner;

// Public API exports
pub use central::BleCentral;
pub use config::BleConfig;
pub use error::BleCentralError;
pub use scanner::{LockScanner, ScanHit};

// Re-export the transport trait for convenience
pub use lockwire_core::LockTransport;
