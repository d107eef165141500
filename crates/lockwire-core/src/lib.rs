//! Protocol engine for a family of BLE electronic locks
//!
//! This crate implements the client side of the lock protocol: discovering
//! locks by advertised name, establishing one authenticated session per lock,
//! exchanging ordered command/response frames over two fixed characteristics,
//! and batching server-bound frames for later upload.
//!
//! ## Architecture
//!
//! - [`advertisement`] - Advertisement TLV parsing and lock identification
//! - [`registry`] - Insertion-ordered registry of known locks
//! - [`session`] - Connection/session state machine and its effects
//! - [`dispatcher`] - One owning task per lock, driving the state machine
//! - [`router`] - Command queue and inbound-frame routing
//! - [`upload`] - Session-keyed batching of server-destined frames
//! - [`engine`] - Facade tying the shared registry, batcher, and dispatchers
//!   together
//! - [`transport`] - Trait seam to the host BLE stack
//!
//! The BLE stack itself, the HTTP uploader, and the storage backend are
//! external collaborators: implement [`transport::LockTransport`] (or use the
//! `lockwire-ble` crate), consume [`upload::UploadPayload`] batches from the
//! upload channel, and call the explicit persistence hooks on
//! [`engine::LockEngine`].

pub mod advertisement;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod events;
pub mod frame;
pub mod registry;
pub mod router;
pub mod session;
pub mod transport;
pub mod types;
pub mod upload;

// Public API exports
pub use advertisement::{parse_advertisement, LockIdentity};
pub use config::EngineConfig;
pub use engine::{LockEngine, ScanEnvironment};
pub use error::{ErrorKind, LockError, Result};
pub use events::LockEvent;
pub use frame::{InboundFrame, ResultTag};
pub use registry::DeviceRegistry;
pub use transport::{LockTransport, TransportSignal};
pub use types::{
    CommandFrame, ConnectionPhase, LockRecord, LockState, MacAddress, SessionKey,
};
pub use upload::{UploadBatcher, UploadPayload, UploadRecord};
