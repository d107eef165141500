//! Inbound notification frame classification
//!
//! Every notification from a lock starts with a destination byte. Server
//! frames are opaque and relayed to the upload batcher; app frames carry a
//! result byte the router interprets locally.

use crate::error::ErrorKind;

// ----------------------------------------------------------------------------
// Wire Constants
// ----------------------------------------------------------------------------

/// Destination byte for server-bound (encrypted, relayed) frames.
pub const DEST_SERVER: u8 = 0x50;
/// Destination byte for app-bound (locally interpreted) frames.
pub const DEST_APP: u8 = 0x61;

pub const RESULT_SUCCESS: u8 = 0x60;
pub const RESULT_INVALID_KEY: u8 = 0x61;
pub const RESULT_INVALID_CMD: u8 = 0x62;
pub const RESULT_INVALID_PERMISSION: u8 = 0x63;
pub const RESULT_SHUTDOWN: u8 = 0x64;
pub const RESULT_INVALID_DATA: u8 = 0x65;
pub const RESULT_INVALID: u8 = 0xFF;

// ----------------------------------------------------------------------------
// Frame Types
// ----------------------------------------------------------------------------

/// Result tag on an app-destined frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultTag {
    Success,
    InvalidKey,
    InvalidCommand,
    InvalidPermission,
    Shutdown,
    InvalidData,
    Invalid,
    /// Unrecognized result byte; handled like any other rejection.
    Unknown(u8),
}

impl ResultTag {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            RESULT_SUCCESS => Self::Success,
            RESULT_INVALID_KEY => Self::InvalidKey,
            RESULT_INVALID_CMD => Self::InvalidCommand,
            RESULT_INVALID_PERMISSION => Self::InvalidPermission,
            RESULT_SHUTDOWN => Self::Shutdown,
            RESULT_INVALID_DATA => Self::InvalidData,
            RESULT_INVALID => Self::Invalid,
            other => Self::Unknown(other),
        }
    }

    /// Error kind and message for rejection results; `None` for success and
    /// shutdown, which are not errors.
    pub fn rejection(&self) -> Option<(ErrorKind, &'static str)> {
        match self {
            Self::Success | Self::Shutdown => None,
            Self::InvalidKey => Some((ErrorKind::InvalidKey, "Invalid Key Result")),
            Self::InvalidCommand => Some((ErrorKind::InvalidCommand, "Invalid Command Result")),
            Self::InvalidPermission => Some((
                ErrorKind::InvalidPermission,
                "Invalid Permission (wrong key) Result",
            )),
            Self::InvalidData => Some((ErrorKind::InvalidData, "Invalid Data Result")),
            Self::Invalid => Some((ErrorKind::InvalidResult, "Invalid Result")),
            Self::Unknown(_) => Some((ErrorKind::UnknownResult, "Invalid packet received")),
        }
    }
}

/// One parsed notification payload from a lock.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Server-destined frame, relayed whole (hex-encoded) to the batcher.
    Server { raw_hex: String },
    /// App-destined frame interpreted by the router. `status` is the byte
    /// following the result tag, meaningful for shutdown results.
    App { result: ResultTag, status: Option<u8> },
}

impl InboundFrame {
    /// Classify a raw notification payload.
    ///
    /// Returns `None` for frames too short to carry a destination, or app
    /// frames missing a result byte; these are dropped, never a panic.
    pub fn parse(data: &[u8]) -> Option<Self> {
        match *data.first()? {
            DEST_SERVER => Some(Self::Server {
                raw_hex: hex::encode_upper(data),
            }),
            DEST_APP => {
                let result = ResultTag::from_byte(*data.get(1)?);
                Some(Self::App {
                    result,
                    status: data.get(2).copied(),
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_frame() {
        let frame = InboundFrame::parse(&[DEST_SERVER, 0xAB, 0xCD]).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Server {
                raw_hex: "50ABCD".to_string()
            }
        );
    }

    #[test]
    fn parses_app_results() {
        let frame = InboundFrame::parse(&[DEST_APP, RESULT_SUCCESS]).unwrap();
        assert_eq!(
            frame,
            InboundFrame::App {
                result: ResultTag::Success,
                status: None
            }
        );

        let frame = InboundFrame::parse(&[DEST_APP, RESULT_SHUTDOWN, 0x00]).unwrap();
        assert_eq!(
            frame,
            InboundFrame::App {
                result: ResultTag::Shutdown,
                status: Some(0x00)
            }
        );
    }

    #[test]
    fn unknown_result_byte_is_tagged() {
        let frame = InboundFrame::parse(&[DEST_APP, 0x42]).unwrap();
        assert_eq!(
            frame,
            InboundFrame::App {
                result: ResultTag::Unknown(0x42),
                status: None
            }
        );
    }

    #[test]
    fn short_or_foreign_frames_drop() {
        assert_eq!(InboundFrame::parse(&[]), None);
        assert_eq!(InboundFrame::parse(&[DEST_APP]), None);
        assert_eq!(InboundFrame::parse(&[0x00, 0x01]), None);
    }

    #[test]
    fn rejections_map_to_error_kinds() {
        assert!(ResultTag::Success.rejection().is_none());
        assert!(ResultTag::Shutdown.rejection().is_none());
        let (kind, _) = ResultTag::InvalidPermission.rejection().unwrap();
        assert_eq!(kind, crate::error::ErrorKind::InvalidPermission);
        let (kind, _) = ResultTag::Unknown(0x13).rejection().unwrap();
        assert_eq!(kind, crate::error::ErrorKind::UnknownResult);
    }
}
