//! Inbound frame splitting, validation and construction.
//!
//! ```text
//! [noise] { <dict-literal> } <crc> [\r] \n
//! ```
//!
//! The newline is consumed by the line reader. What remains is split at the
//! first `{`: anything before it is line noise. The last byte (after an
//! optional trailing `\r` is stripped) is the raw CRC-8 of the payload, and
//! the payload must end with the closing `}`.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use crate::crc::ChecksumTable;
use crate::literal::{parse_literal, LiteralError};
use crate::snapshot::{ComponentKind, SchemaError, Snapshot, MASTER_NODE};

/// Maximum length of one line, including the checksum byte.
pub const MAX_FRAME_LENGTH: usize = 1024;

/// Error type for frame decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Line longer than [`MAX_FRAME_LENGTH`]; discarded up to the next newline.
    Overflow,
    /// No `{` on the line.
    MissingPayload,
    /// The payload does not end in `}` followed by one checksum byte.
    MissingChecksum,
    /// Payload contains bytes outside 7-bit ASCII.
    NonAscii,
    /// Checksum byte does not validate the payload.
    ChecksumMismatch,
    /// Payload is not a valid literal.
    Literal(LiteralError),
    /// Literal does not match the snapshot schema.
    Schema(SchemaError),
}

impl core::fmt::Display for FrameError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Overflow => write!(f, "line exceeds {MAX_FRAME_LENGTH} bytes"),
            Self::MissingPayload => write!(f, "no payload on line"),
            Self::MissingChecksum => write!(f, "payload not terminated by '}}' and checksum"),
            Self::NonAscii => write!(f, "payload is not ASCII"),
            Self::ChecksumMismatch => write!(f, "checksum mismatch"),
            Self::Literal(e) => write!(f, "literal error: {e}"),
            Self::Schema(e) => write!(f, "schema error: {e}"),
        }
    }
}

impl From<LiteralError> for FrameError {
    fn from(err: LiteralError) -> Self {
        Self::Literal(err)
    }
}

impl From<SchemaError> for FrameError {
    fn from(err: SchemaError) -> Self {
        Self::Schema(err)
    }
}

/// One line split into its parts. Borrowed from the line buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Bytes before the first `{`.
    pub noise: &'a [u8],
    /// Dict literal including the closing `}`.
    pub payload: &'a [u8],
    /// Raw checksum byte.
    pub checksum: u8,
}

impl<'a> Frame<'a> {
    /// Split a line (without its `\n`) into noise, payload and checksum.
    pub fn split(line: &'a [u8]) -> Result<Self, FrameError> {
        let line = match line {
            [rest @ .., b'\r'] => rest,
            _ => line,
        };
        let start = line
            .iter()
            .position(|&b| b == b'{')
            .ok_or(FrameError::MissingPayload)?;
        let (noise, rest) = line.split_at(start);

        let [payload @ .., checksum] = rest else {
            return Err(FrameError::MissingChecksum);
        };
        if payload.last() != Some(&b'}') {
            return Err(FrameError::MissingChecksum);
        }

        Ok(Self {
            noise,
            payload,
            checksum: *checksum,
        })
    }

    /// Check encoding and checksum, then parse the payload.
    pub fn decode(&self, table: &ChecksumTable) -> Result<Snapshot, FrameError> {
        if !self.payload.is_ascii() {
            return Err(FrameError::NonAscii);
        }
        if !table.check(self.payload, self.checksum) {
            return Err(FrameError::ChecksumMismatch);
        }
        let literal = parse_literal(self.payload)?;
        Ok(Snapshot::from_literal(&literal)?)
    }
}

/// Split and decode one line.
pub fn decode_line(line: &[u8], table: &ChecksumTable) -> Result<Snapshot, FrameError> {
    Frame::split(line)?.decode(table)
}

/// Append checksum byte and `\r\n` to a payload.
#[must_use]
pub fn encode_frame(payload: &[u8], table: &ChecksumTable) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 3);
    out.extend_from_slice(payload);
    out.push(table.checksum(payload));
    out.extend_from_slice(b"\r\n");
    out
}

enum Entry {
    Scalar(f64),
    Tuple(Vec<f64>),
}

struct Component {
    id: String,
    value: Entry,
}

struct Group {
    kind: ComponentKind,
    components: Vec<Component>,
}

struct Node {
    id: String,
    groups: Vec<Group>,
}

/// Builds complete inbound frames the way the board emits them.
///
/// Used by simulators and tests to produce traffic for the decoder.
///
/// # Example
///
/// ```
/// use panel_proto::{ChecksumTable, ComponentKind, FrameBuilder};
///
/// let table = ChecksumTable::default();
/// let frame = FrameBuilder::new()
///     .master("Accept", 1.0)
///     .master_pins("Rotary", 0.0, 1.0)
///     .component("3", ComponentKind::Potentiometer, "0", 512.0)
///     .build(&table);
///
/// assert!(frame.starts_with(b"{'master': {'Accept': 1, 'Rotary': [0, 1]}, '3': {'P': {'0': 512}}}"));
/// assert!(frame.ends_with(b"\r\n"));
/// ```
#[derive(Default)]
pub struct FrameBuilder {
    nodes: Vec<Node>,
}

impl FrameBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a role reading on the master node.
    #[must_use]
    pub fn master(self, role: &str, value: f64) -> Self {
        self.push(MASTER_NODE, ComponentKind::Master, role, Entry::Scalar(value))
    }

    /// Add a two-pin role reading on the master node.
    #[must_use]
    pub fn master_pins(self, role: &str, a: f64, b: f64) -> Self {
        self.push(
            MASTER_NODE,
            ComponentKind::Master,
            role,
            Entry::Tuple(alloc::vec![a, b]),
        )
    }

    /// Add a scalar component reading.
    #[must_use]
    pub fn component(self, node: &str, kind: ComponentKind, id: &str, value: f64) -> Self {
        self.push(node, kind, id, Entry::Scalar(value))
    }

    /// Add a multi-pin component reading.
    #[must_use]
    pub fn component_pins(self, node: &str, kind: ComponentKind, id: &str, pins: &[f64]) -> Self {
        self.push(node, kind, id, Entry::Tuple(pins.to_vec()))
    }

    fn push(mut self, node: &str, kind: ComponentKind, id: &str, value: Entry) -> Self {
        let idx = match self.nodes.iter().position(|n| n.id == node) {
            Some(idx) => idx,
            None => {
                self.nodes.push(Node {
                    id: node.into(),
                    groups: Vec::new(),
                });
                self.nodes.len() - 1
            }
        };
        let groups = &mut self.nodes[idx].groups;
        let gidx = match groups.iter().position(|g| g.kind == kind) {
            Some(gidx) => gidx,
            None => {
                groups.push(Group {
                    kind,
                    components: Vec::new(),
                });
                groups.len() - 1
            }
        };
        groups[gidx].components.push(Component {
            id: id.into(),
            value,
        });
        self
    }

    /// The dict literal without checksum or line ending.
    #[must_use]
    pub fn payload(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.write_payload(&mut out);
        out
    }

    fn write_payload(&self, out: &mut String) -> core::fmt::Result {
        out.push('{');
        for (n, node) in self.nodes.iter().enumerate() {
            if n > 0 {
                out.push_str(", ");
            }
            write!(out, "'{}': {{", node.id)?;
            let mut first = true;
            for group in &node.groups {
                if group.kind != ComponentKind::Master {
                    if !first {
                        out.push_str(", ");
                    }
                    write!(out, "'{}': {{", group.kind.tag())?;
                    first = true;
                }
                for component in &group.components {
                    if !first {
                        out.push_str(", ");
                    }
                    first = false;
                    write!(out, "'{}': ", component.id)?;
                    match &component.value {
                        Entry::Scalar(v) => write!(out, "{v}")?,
                        Entry::Tuple(values) => {
                            out.push('[');
                            for (i, v) in values.iter().enumerate() {
                                if i > 0 {
                                    out.push_str(", ");
                                }
                                write!(out, "{v}")?;
                            }
                            out.push(']');
                        }
                    }
                }
                if group.kind != ComponentKind::Master {
                    out.push('}');
                    first = false;
                }
            }
            out.push('}');
        }
        out.push('}');
        Ok(())
    }

    /// Complete frame: payload, checksum byte, `\r\n`.
    #[must_use]
    pub fn build(&self, table: &ChecksumTable) -> Vec<u8> {
        encode_frame(self.payload().as_bytes(), table)
    }
}
