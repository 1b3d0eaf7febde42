//! Error type shared by the panel core.

use panel_proto::{FrameError, SerializeError};
use thiserror::Error;

use crate::config::PinKind;
use crate::input::SourceError;

/// Errors surfaced by the panel core.
///
/// Frame-level problems (`FrameDecode`, `ChecksumMismatch`) are only ever
/// logged by the poller; they appear here so that callers decoding frames
/// directly get a uniform type.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("no serial port matching {filter:?} could be opened")]
    TransportNotFound { filter: String },

    #[error("frame decode error: {0}")]
    FrameDecode(FrameError),

    #[error("frame checksum mismatch")]
    ChecksumMismatch,

    #[error("invalid range: max ({max}) must exceed min ({min})")]
    InvalidRange { min: f64, max: f64 },

    #[error("not enough value handlers: {needed} targets, {available} potentiometers/encoders")]
    InsufficientHandlers { needed: usize, available: usize },

    #[error("{kind} pin {pin} out of range {}..={}", .kind.min_pin(), .kind.max_pin())]
    PinOutOfRange { kind: PinKind, pin: u8 },

    #[error("board did not report master role {0:?}")]
    MissingRole(String),

    #[error("timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("panel disconnected")]
    Disconnected,

    #[error("command serialization failed: {0}")]
    Command(SerializeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<FrameError> for PanelError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::ChecksumMismatch => Self::ChecksumMismatch,
            other => Self::FrameDecode(other),
        }
    }
}

impl From<SerializeError> for PanelError {
    fn from(err: SerializeError) -> Self {
        Self::Command(err)
    }
}

impl From<SourceError> for PanelError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Io(e) => Self::Io(e),
            SourceError::Disconnected => Self::Disconnected,
        }
    }
}

pub type Result<T> = std::result::Result<T, PanelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_error_mapping() {
        assert!(matches!(
            PanelError::from(FrameError::ChecksumMismatch),
            PanelError::ChecksumMismatch
        ));
        assert!(matches!(
            PanelError::from(FrameError::Overflow),
            PanelError::FrameDecode(FrameError::Overflow)
        ));
    }

    #[test]
    fn test_messages() {
        let err = PanelError::PinOutOfRange {
            kind: PinKind::Analog,
            pin: 7,
        };
        assert_eq!(err.to_string(), "analog pin 7 out of range 0..=5");

        let err = PanelError::InsufficientHandlers {
            needed: 3,
            available: 1,
        };
        assert_eq!(
            err.to_string(),
            "not enough value handlers: 3 targets, 1 potentiometers/encoders"
        );
    }
}
