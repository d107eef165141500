//! Command queue and response router
//!
//! Each lock carries an ordered queue of outgoing command frames with a
//! single-outstanding-command discipline: the head frame is on the wire, the
//! rest wait, and only an inbound result advances the queue. Every inbound
//! notification lands in [`on_notification`], the single dispatch point that
//! relays server frames, advances the queue, raises device errors, or
//! terminates the session.

use tracing::debug;

use crate::error::{ErrorKind, LockError, Result};
use crate::events::LockEvent;
use crate::frame::{InboundFrame, ResultTag};
use crate::session::Effect;
use crate::types::{CommandFrame, ConnectionPhase, LockRecord, LockState};

// ----------------------------------------------------------------------------
// Queueing
// ----------------------------------------------------------------------------

/// Append a command to the record's queue.
///
/// The session does not pre-buffer: enqueue is only valid once the session is
/// established. If the queue was empty the frame goes to the transport
/// immediately; otherwise it waits its turn.
pub fn enqueue(record: &mut LockRecord, frame: CommandFrame) -> Result<Vec<Effect>> {
    if !record.phase.is_established() {
        return Err(LockError::NoSession {
            mac: record.mac.clone(),
        });
    }

    record.commands.push_back(frame.clone());
    if record.commands.len() == 1 {
        Ok(vec![Effect::WriteCommand(frame)])
    } else {
        Ok(Vec::new())
    }
}

/// Pop the completed head command and put the next one on the wire.
fn advance(record: &mut LockRecord) -> Vec<Effect> {
    record.commands.pop_front();
    match record.commands.front() {
        Some(next) => vec![Effect::WriteCommand(next.clone())],
        None => Vec::new(),
    }
}

// ----------------------------------------------------------------------------
// Response Routing
// ----------------------------------------------------------------------------

/// Route one inbound notification payload.
pub fn on_notification(record: &mut LockRecord, data: &[u8]) -> Vec<Effect> {
    let Some(frame) = InboundFrame::parse(data) else {
        debug!(mac = %record.mac, "dropping unclassifiable frame");
        return Vec::new();
    };

    match frame {
        InboundFrame::Server { raw_hex } => {
            // Relayed whole to the batcher, keyed by the live session. The
            // command queue is untouched.
            match &record.session {
                Some(session) => vec![Effect::AddUpload {
                    session: session.clone(),
                    frame_hex: raw_hex,
                }],
                None => Vec::new(),
            }
        }
        InboundFrame::App { result, status } => route_result(record, result, status),
    }
}

fn route_result(record: &mut LockRecord, result: ResultTag, status: Option<u8>) -> Vec<Effect> {
    match result {
        ResultTag::Success => {
            let mut effects = advance(record);
            if record.commands.is_empty() {
                record.phase = ConnectionPhase::Unlocked;
                effects.push(Effect::Emit(LockEvent::Unlocked {
                    mac: record.mac.clone(),
                }));
            }
            effects
        }
        ResultTag::Shutdown => {
            // The status byte is the lock's new physical state. Shutdown
            // always terminates the connection, queued commands or not.
            record.commands.pop_front();
            record.lock_state = match status {
                Some(0) => LockState::Unlocked,
                _ => LockState::Locked,
            };
            vec![Effect::RequestDisconnect]
        }
        rejection => {
            // Courtesy-continue: report the device error, then advance the
            // queue exactly as on success rather than stalling on it.
            let (kind, message) = rejection
                .rejection()
                .unwrap_or((ErrorKind::UnknownResult, "Invalid packet received"));
            let mut effects = vec![Effect::Emit(LockEvent::Error {
                device: Some(record.mac.clone()),
                kind,
                message: message.to_string(),
            })];
            effects.extend(advance(record));
            effects
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{
        DEST_APP, DEST_SERVER, RESULT_INVALID_PERMISSION, RESULT_SHUTDOWN, RESULT_SUCCESS,
    };
    use crate::types::{MacAddress, SessionKey};

    fn established_record() -> LockRecord {
        let mut record = LockRecord::new(MacAddress::new("C7:00:11:22:33:44"), "NOKE3P_ABC");
        record.phase = ConnectionPhase::SessionEstablished;
        record.session = Some(SessionKey::from_bytes(&[0xAA]));
        record
    }

    fn frame(n: u8) -> CommandFrame {
        CommandFrame::new(format!("7E{:02X}", n))
    }

    #[test]
    fn enqueue_requires_established_session() {
        let mut record = LockRecord::new(MacAddress::new("C7:00:11:22:33:44"), "NOKE3P_ABC");
        assert!(matches!(
            enqueue(&mut record, frame(1)),
            Err(LockError::NoSession { .. })
        ));
    }

    #[test]
    fn first_enqueue_writes_immediately_later_ones_wait() {
        let mut record = established_record();

        let effects = enqueue(&mut record, frame(1)).unwrap();
        assert_eq!(effects, vec![Effect::WriteCommand(frame(1))]);

        let effects = enqueue(&mut record, frame(2)).unwrap();
        assert!(effects.is_empty());
        assert_eq!(record.commands.len(), 2);
    }

    #[test]
    fn fifo_order_with_single_outstanding_command() {
        let mut record = established_record();
        let mut writes = Vec::new();

        for n in 1..=3 {
            for effect in enqueue(&mut record, frame(n)).unwrap() {
                if let Effect::WriteCommand(f) = effect {
                    writes.push(f);
                }
            }
        }
        // Each success result releases exactly the next frame.
        for _ in 0..3 {
            for effect in on_notification(&mut record, &[DEST_APP, RESULT_SUCCESS]) {
                if let Effect::WriteCommand(f) = effect {
                    writes.push(f);
                }
            }
        }

        assert_eq!(writes, vec![frame(1), frame(2), frame(3)]);
    }

    #[test]
    fn queue_drain_transitions_to_unlocked_once() {
        let mut record = established_record();
        enqueue(&mut record, frame(1)).unwrap();

        let effects = on_notification(&mut record, &[DEST_APP, RESULT_SUCCESS]);
        assert_eq!(record.phase, ConnectionPhase::Unlocked);
        assert_eq!(
            effects,
            vec![Effect::Emit(LockEvent::Unlocked {
                mac: record.mac.clone()
            })]
        );
    }

    #[test]
    fn rejection_reports_error_then_advances() {
        let mut record = established_record();
        enqueue(&mut record, frame(1)).unwrap();
        enqueue(&mut record, frame(2)).unwrap();

        let effects = on_notification(&mut record, &[DEST_APP, RESULT_INVALID_PERMISSION]);
        assert_eq!(record.commands.len(), 1);
        assert_eq!(
            effects,
            vec![
                Effect::Emit(LockEvent::Error {
                    device: Some(record.mac.clone()),
                    kind: ErrorKind::InvalidPermission,
                    message: "Invalid Permission (wrong key) Result".to_string(),
                }),
                Effect::WriteCommand(frame(2)),
            ]
        );
    }

    #[test]
    fn unknown_result_also_courtesy_continues() {
        let mut record = established_record();
        enqueue(&mut record, frame(1)).unwrap();
        enqueue(&mut record, frame(2)).unwrap();

        let effects = on_notification(&mut record, &[DEST_APP, 0x42]);
        assert_eq!(record.commands.len(), 1);
        assert!(effects.contains(&Effect::WriteCommand(frame(2))));
    }

    #[test]
    fn shutdown_persists_state_and_disconnects_despite_queue() {
        let mut record = established_record();
        enqueue(&mut record, frame(1)).unwrap();
        enqueue(&mut record, frame(2)).unwrap();

        let effects = on_notification(&mut record, &[DEST_APP, RESULT_SHUTDOWN, 0x00]);
        assert_eq!(record.lock_state, LockState::Unlocked);
        assert_eq!(effects, vec![Effect::RequestDisconnect]);

        let mut record = established_record();
        enqueue(&mut record, frame(1)).unwrap();
        let effects = on_notification(&mut record, &[DEST_APP, RESULT_SHUTDOWN, 0x01]);
        assert_eq!(record.lock_state, LockState::Locked);
        assert_eq!(effects, vec![Effect::RequestDisconnect]);
    }

    #[test]
    fn server_frames_relay_without_touching_queue() {
        let mut record = established_record();
        enqueue(&mut record, frame(1)).unwrap();

        let effects = on_notification(&mut record, &[DEST_SERVER, 0xBE, 0xEF]);
        assert_eq!(record.commands.len(), 1);
        assert_eq!(
            effects,
            vec![Effect::AddUpload {
                session: SessionKey::from_bytes(&[0xAA]),
                frame_hex: "50BEEF".to_string(),
            }]
        );
    }

    #[test]
    fn server_frame_without_session_is_dropped() {
        let mut record = established_record();
        record.session = None;
        assert!(on_notification(&mut record, &[DEST_SERVER, 0xBE]).is_empty());
    }
}
