//! Per-lock session dispatcher
//!
//! One task per lock owns every state transition, queue mutation, and route
//! decision for that lock. The transport delivers link signals asynchronously
//! and out of program order relative to caller commands; the dispatcher
//! serializes both streams through the state machine and executes the
//! resulting effects. Locks never share a dispatcher, so one lock's failures
//! or retry delays cannot stall another's.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{ErrorKind, LockError, Result};
use crate::events::EventSink;
use crate::registry::DeviceRegistry;
use crate::router;
use crate::session::{self, Effect, SessionEvent};
use crate::transport::{
    LockTransport, SignalReceiver, TransportSignal, COMMAND_CHAR_UUID,
    FIRMWARE_RESPONSE_CHAR_UUID, RESPONSE_CHAR_UUID,
};
use crate::types::{CommandFrame, MacAddress};
use crate::upload::{UploadBatcher, UploadPayload};

// ----------------------------------------------------------------------------
// Commands and Handles
// ----------------------------------------------------------------------------

/// Caller-issued commands for one lock's dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Connect,
    Enqueue(CommandFrame),
    Stop,
}

/// Shared collaborators every dispatcher needs.
#[derive(Clone)]
pub struct SessionContext {
    pub registry: Arc<Mutex<DeviceRegistry>>,
    pub batcher: Arc<Mutex<UploadBatcher>>,
    pub uploads: mpsc::UnboundedSender<UploadPayload>,
    pub events: EventSink,
    pub config: EngineConfig,
}

/// Handle for addressing a running dispatcher.
pub struct DispatcherHandle {
    mac: MacAddress,
    commands: mpsc::UnboundedSender<SessionCommand>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    pub fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| LockError::DispatcherGone {
                mac: self.mac.clone(),
            })
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn mac(&self) -> &MacAddress {
        &self.mac
    }
}

// ----------------------------------------------------------------------------
// Dispatcher
// ----------------------------------------------------------------------------

/// The per-lock actor driving the session state machine.
pub struct SessionDispatcher {
    mac: MacAddress,
    ctx: SessionContext,
    transport: Box<dyn LockTransport>,
    signals: SignalReceiver,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    /// Mirrors whether the platform handle is still able to deliver signals;
    /// cleared on release so late link-drop signals are not re-processed.
    handle_live: bool,
    /// Set when a stop arrives mid-settle; the run loop exits on it.
    stopping: bool,
}

impl SessionDispatcher {
    /// Spawn the dispatcher task for one lock and return its handle.
    pub fn spawn(
        mac: MacAddress,
        transport: Box<dyn LockTransport>,
        signals: SignalReceiver,
        ctx: SessionContext,
    ) -> DispatcherHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            mac: mac.clone(),
            ctx,
            transport,
            signals,
            commands: commands_rx,
            handle_live: false,
            stopping: false,
        };
        let task = tokio::spawn(dispatcher.run());
        DispatcherHandle {
            mac,
            commands: commands_tx,
            task,
        }
    }

    async fn run(mut self) {
        debug!(mac = %self.mac, "session dispatcher started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Connect) => {
                        self.apply(SessionEvent::ConnectRequested).await;
                    }
                    Some(SessionCommand::Enqueue(frame)) => {
                        self.enqueue(frame).await;
                    }
                    Some(SessionCommand::Stop) | None => {
                        // An explicit stop (or a dropped engine) tears down
                        // from any state and discards the queue unflushed.
                        self.apply(SessionEvent::StopRequested).await;
                        break;
                    }
                },
                signal = self.signals.recv() => match signal {
                    Some(TransportSignal::Notification { uuid, value }) => {
                        if uuid == RESPONSE_CHAR_UUID || uuid == FIRMWARE_RESPONSE_CHAR_UUID {
                            self.route(&value).await;
                        }
                    }
                    Some(TransportSignal::Disconnected) => {
                        if self.handle_live {
                            self.apply(SessionEvent::DisconnectObserved).await;
                        } else {
                            debug!(mac = %self.mac, "link-drop signal from released handle ignored");
                        }
                    }
                    None => {
                        // Transport side is gone entirely.
                        self.apply(SessionEvent::StopRequested).await;
                        break;
                    }
                },
            }
            if self.stopping {
                break;
            }
        }
        debug!(mac = %self.mac, "session dispatcher stopped");
    }

    /// Drive one event (and any follow-ups its effects produce) through the
    /// state machine.
    async fn apply(&mut self, event: SessionEvent) {
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            let effects = {
                let mut registry = self.ctx.registry.lock().await;
                match registry.lookup_mut(&self.mac) {
                    Some(record) => session::step(record, event, &self.ctx.config),
                    None => {
                        warn!(mac = %self.mac, "record removed while dispatcher active");
                        return;
                    }
                }
            };
            self.execute(effects, &mut pending).await;
        }
    }

    async fn enqueue(&mut self, frame: CommandFrame) {
        let result = {
            let mut registry = self.ctx.registry.lock().await;
            match registry.lookup_mut(&self.mac) {
                Some(record) => router::enqueue(record, frame),
                None => return,
            }
        };
        match result {
            Ok(effects) => {
                let mut pending = VecDeque::new();
                self.execute(effects, &mut pending).await;
                while let Some(event) = pending.pop_front() {
                    self.apply(event).await;
                }
            }
            Err(e) => {
                self.ctx
                    .events
                    .error(Some(self.mac.clone()), ErrorKind::InvalidDevice, e.to_string());
            }
        }
    }

    async fn route(&mut self, data: &[u8]) {
        let effects = {
            let mut registry = self.ctx.registry.lock().await;
            match registry.lookup_mut(&self.mac) {
                Some(record) => router::on_notification(record, data),
                None => return,
            }
        };
        let mut pending = VecDeque::new();
        self.execute(effects, &mut pending).await;
        while let Some(event) = pending.pop_front() {
            self.apply(event).await;
        }
    }

    /// Execute effects in order, queueing follow-up events for transport
    /// completions.
    async fn execute(&mut self, effects: Vec<Effect>, pending: &mut VecDeque<SessionEvent>) {
        for effect in effects {
            match effect {
                Effect::Connect => {
                    self.handle_live = true;
                    match self.transport.connect(&self.mac).await {
                        Ok(()) => pending.push_back(SessionEvent::TransportConnected),
                        Err(e) => pending.push_back(SessionEvent::TransportError {
                            reason: e.to_string(),
                        }),
                    }
                }
                Effect::ReleaseTransport => {
                    self.handle_live = false;
                    if let Err(e) = self.transport.disconnect().await {
                        debug!(mac = %self.mac, "teardown disconnect failed: {}", e);
                    }
                }
                Effect::RefreshServiceCache { force } => {
                    // Best-effort quirk workaround; failures are logged only.
                    if force || !self.transport.is_bonded() {
                        if let Err(e) = self.transport.refresh_service_cache().await {
                            debug!(mac = %self.mac, "service cache refresh failed: {}", e);
                        }
                    }
                }
                Effect::DiscoverServices => match self.transport.discover_services().await {
                    Ok(()) => pending.push_back(SessionEvent::ServicesDiscovered),
                    Err(e) => self.structural_error(e),
                },
                Effect::ReadCharacteristic(uuid) => {
                    match self.transport.read_characteristic(uuid).await {
                        Ok(value) => pending.push_back(SessionEvent::SessionRead { value }),
                        Err(e) => self.structural_error(e),
                    }
                }
                Effect::ArmNotify(uuid) => match self.transport.set_notify(uuid, true).await {
                    Ok(()) => pending.push_back(SessionEvent::NotifyArmed),
                    Err(e) => self.structural_error(e),
                },
                Effect::WriteCommand(frame) => match frame.to_bytes() {
                    Ok(bytes) => {
                        if let Err(e) = self
                            .transport
                            .write_characteristic(COMMAND_CHAR_UUID, &bytes)
                            .await
                        {
                            self.structural_error(e);
                        }
                    }
                    Err(e) => self.structural_error(e),
                },
                Effect::RequestDisconnect => {
                    // Graceful path: the handle stays live so the link-drop
                    // signal drives the clean-disconnect transition.
                    if let Err(e) = self.transport.disconnect().await {
                        debug!(mac = %self.mac, "disconnect request failed: {}", e);
                    }
                }
                Effect::Settle(delay) => {
                    if self.settle(delay).await {
                        // Stop arrived mid-settle: abandon the rest of the
                        // retry chain and tear down instead.
                        debug!(mac = %self.mac, "stop received during settle");
                        self.stopping = true;
                        pending.clear();
                        pending.push_back(SessionEvent::StopRequested);
                        return;
                    }
                }
                Effect::Emit(event) => self.ctx.events.emit(event),
                Effect::AddUpload { session, frame_hex } => {
                    self.ctx
                        .batcher
                        .lock()
                        .await
                        .add(session, self.mac.clone(), frame_hex);
                }
                Effect::FlushUploads => {
                    let payload = self.ctx.batcher.lock().await.flush();
                    if let Some(payload) = payload {
                        if self.ctx.uploads.send(payload).is_err() {
                            warn!("upload consumer gone, batch dropped");
                        }
                    }
                }
            }
        }
    }

    /// Sleep out a settle delay while staying responsive to caller commands.
    ///
    /// Returns whether a stop arrived mid-settle. Transport signals stay
    /// queued; the handle was already released for the settle, so nothing on
    /// the signal channel can be actionable until the next connect.
    async fn settle(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                command = self.commands.recv() => match command {
                    // Already mid-cycle; a repeat connect is a no-op.
                    Some(SessionCommand::Connect) => {}
                    Some(SessionCommand::Enqueue(_)) => {
                        self.ctx.events.error(
                            Some(self.mac.clone()),
                            ErrorKind::InvalidDevice,
                            LockError::NoSession {
                                mac: self.mac.clone(),
                            }
                            .to_string(),
                        );
                    }
                    Some(SessionCommand::Stop) | None => return true,
                },
            }
        }
    }

    /// Structural faults (missing service/characteristic, dead handle) are
    /// reported and the operation aborts locally; they are configuration
    /// mismatches, not transience, so nothing retries.
    fn structural_error(&mut self, error: LockError) {
        self.ctx
            .events
            .error(Some(self.mac.clone()), ErrorKind::InvalidDevice, error.to_string());
    }
}
