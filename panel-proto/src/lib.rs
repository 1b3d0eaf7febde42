//! Serial protocol types, parsing and serialization for the DESDEO control panel.
//!
//! This crate provides everything needed to talk to the panel's master board:
//!
//! - **Checksums**: [`ChecksumTable`] - table-driven CRC-8 with a configurable key
//! - **Parsing**: Parse and validate inbound frames
//!   - [`parse_literal()`] - strict grammar for the board's dict literals
//!   - [`Frame`] / [`decode_line()`] - split and verify one line
//!   - [`Snapshot`] - typed, mergeable component readings
//! - **Serialization**: Outbound commands and simulated frames
//!   - [`Command`] with the [`Serialize`] trait
//!   - [`FrameBuilder`] - produce board-format frames for simulators and tests
//!
//! # Protocol Format
//!
//! ## Inbound Frame (board → host)
//!
//! ```text
//! {'<node>': {'<B|P|R>': {'<id>': <raw>}}, 'master': {'<role>': <raw>}}<crc>\r\n
//! ```
//!
//! - `raw` - a number or a list of numbers (pin levels)
//! - `crc` - one raw byte, CRC-8 of everything up to and including the last `}`
//!
//! ## Outbound Commands (host → board)
//!
//! - `R` - request frames
//! - `Q` - quit streaming
//! - `S` - scan configuration
//! - `B <node>:<P|R>:<id>:<min>:<max>:<step>\r\n` - set bounds
//!
//! # Examples
//!
//! ```
//! use panel_proto::{decode_line, ChecksumTable, FrameBuilder, RawValue};
//!
//! let table = ChecksumTable::default();
//! let frame = FrameBuilder::new().master("Accept", 1.0).build(&table);
//!
//! // The line reader consumes the trailing '\n'
//! let snapshot = decode_line(&frame[..frame.len() - 1], &table).unwrap();
//! assert_eq!(snapshot.master("Accept"), Some(&RawValue::Scalar(1.0)));
//! ```
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting (for embedded logging)

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod command;
pub mod crc;
pub mod frame;
pub mod literal;
pub mod snapshot;

pub use command::{Command, Serialize, SerializeError, MAX_COMMAND_SIZE};
pub use crc::{ChecksumTable, DEFAULT_KEY};
pub use frame::{decode_line, encode_frame, Frame, FrameBuilder, FrameError, MAX_FRAME_LENGTH};
pub use literal::{parse_literal, Literal, LiteralError, LiteralErrorKind, MAX_DEPTH};
pub use snapshot::{Address, ComponentKind, RawValue, SchemaError, Snapshot, MASTER_NODE};
