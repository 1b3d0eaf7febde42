//! Host-to-board commands.
//!
//! Control commands are single ASCII bytes. Set-bounds is a text line:
//!
//! ```text
//! B <node_id>:<P|R>:<id>:<min>:<max>:<step>\r\n
//! ```
//!
//! # Example
//!
//! ```
//! use panel_proto::{Command, ComponentKind, Serialize};
//!
//! let cmd = Command::set_bounds("5", ComponentKind::Rotary, 0.0, 10.0, 0.5);
//! let mut buf = [0u8; 64];
//! let len = cmd.serialize(&mut buf).unwrap();
//! assert_eq!(&buf[..len], b"B 5:R:0:0:10:0.5\r\n");
//! ```

use alloc::string::String;
use alloc::vec::Vec;

use crate::snapshot::ComponentKind;

/// Buffer size that fits a set-bounds command with short node ids and
/// plain bounds. Use [`Command::to_bytes`] when the bounds are arbitrary.
pub const MAX_COMMAND_SIZE: usize = 96;

/// Error type for serialization operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SerializeError {
    /// The output buffer is too small to hold the serialized command.
    BufferTooSmall,
    /// A write operation failed (for I/O adapters).
    WriteError,
    /// Bounds can only be set on potentiometers and rotary encoders.
    UnsupportedKind,
}

impl core::fmt::Display for SerializeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::WriteError => write!(f, "write error"),
            Self::UnsupportedKind => write!(f, "bounds require a potentiometer or rotary encoder"),
        }
    }
}

/// Command sent from the host to the master board.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `R`: start streaming frames.
    Request,
    /// `Q`: stop streaming.
    Quit,
    /// `S`: start a configuration scan.
    Scan,
    /// `B`: set value bounds and step of one component.
    SetBounds {
        node: String,
        kind: ComponentKind,
        id: String,
        min: f64,
        max: f64,
        step: f64,
    },
}

impl Command {
    /// Set-bounds for the single component of `node` (component id `0`).
    #[must_use]
    pub fn set_bounds(node: impl Into<String>, kind: ComponentKind, min: f64, max: f64, step: f64) -> Self {
        Self::SetBounds {
            node: node.into(),
            kind,
            id: "0".into(),
            min,
            max,
            step,
        }
    }

    /// Serialize into a buffer of exactly the encoded length.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError::UnsupportedKind`] for set-bounds on a button.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializeError> {
        let mut out = String::new();
        self.write_to(&mut out)?;
        Ok(out.into_bytes())
    }

    /// Control byte that starts this command.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Request => b'R',
            Self::Quit => b'Q',
            Self::Scan => b'S',
            Self::SetBounds { .. } => b'B',
        }
    }

    fn write_to<W: core::fmt::Write>(&self, w: &mut W) -> Result<(), SerializeError> {
        match self {
            Self::Request | Self::Quit | Self::Scan => w
                .write_char(char::from(self.code()))
                .map_err(|_| SerializeError::WriteError),
            Self::SetBounds {
                node,
                kind,
                id,
                min,
                max,
                step,
            } => {
                if !kind.is_value_handler() {
                    return Err(SerializeError::UnsupportedKind);
                }
                write!(w, "B {node}:{}:{id}:{min}:{max}:{step}\r\n", kind.tag())
                    .map_err(|_| SerializeError::WriteError)
            }
        }
    }
}

/// Extension trait for serializing protocol messages.
pub trait Serialize {
    /// Serialize to the provided buffer.
    ///
    /// Returns the number of bytes written on success.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError::BufferTooSmall`] if the buffer is not large enough.
    fn serialize(&self, buf: &mut [u8]) -> Result<usize, SerializeError>;

    /// Serialize to a `core::fmt::Write` implementation.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError::WriteError`] if the write fails.
    fn serialize_fmt<W: core::fmt::Write>(&self, writer: &mut W) -> Result<(), SerializeError>;
}

/// `fmt::Write` adapter over a byte slice that records overflow.
struct SliceWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    overflow: bool,
}

impl core::fmt::Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let end = self.pos + bytes.len();
        if end > self.buf.len() {
            self.overflow = true;
            return Err(core::fmt::Error);
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }
}

impl Serialize for Command {
    fn serialize(&self, buf: &mut [u8]) -> Result<usize, SerializeError> {
        let mut writer = SliceWriter {
            buf,
            pos: 0,
            overflow: false,
        };
        match self.write_to(&mut writer) {
            Ok(()) => Ok(writer.pos),
            Err(_) if writer.overflow => Err(SerializeError::BufferTooSmall),
            Err(e) => Err(e),
        }
    }

    fn serialize_fmt<W: core::fmt::Write>(&self, writer: &mut W) -> Result<(), SerializeError> {
        self.write_to(writer)
    }
}
