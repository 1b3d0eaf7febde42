//! Host application for the DESDEO physical control panel.
//!
//! Wires the panel core to a real serial port (or a scripted session) and
//! loads configuration from TOML. The protocol and the registry live in
//! `panel-proto` and `panel-core`.

pub mod config;
pub mod input;

pub use config::{load_config, parse_config};
pub use input::{demo_session, SerialTransport};
