//! Host-side core of the DESDEO control panel.
//!
//! This crate turns the byte stream coming from the panel's master board
//! into debounced, addressable component readings and exposes them through
//! blocking calls that an MCDM loop can use directly.
//!
//! # Overview
//!
//! - [`decoder`]: line reassembly and frame validation ([`FrameDecoder`])
//! - [`component`]: button, potentiometer and rotary encoder state machines
//! - [`gesture`]: click / double click / hold recognition
//! - [`input`]: transport trait ([`FrameSource`]) and a scripted source
//! - [`poller`]: background reader thread and published state
//! - [`registry`]: the façade binding roles and targets ([`Registry`])
//! - [`config`]: [`PanelConfig`], deserializable from TOML
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use panel_core::{PanelConfig, Registry, ScriptedSource, Target, Wait, WhenExhausted};
//! use panel_proto::{ChecksumTable, ComponentKind, FrameBuilder};
//!
//! let table = ChecksumTable::default();
//! let discovery = FrameBuilder::new()
//!     .master("Accept", 0.0)
//!     .master("Decline", 0.0)
//!     .master_pins("Rotary", 0.0, 0.0)
//!     .component("1", ComponentKind::Potentiometer, "0", 1023.0)
//!     .build(&table);
//! let accept = FrameBuilder::new().master("Accept", 1.0).build(&table);
//! let source = ScriptedSource::new([discovery, accept])
//!     .when_exhausted(WhenExhausted::Idle(Duration::from_millis(5)));
//!
//! let config = PanelConfig {
//!     discovery_window_ms: 0,
//!     ..PanelConfig::default()
//! };
//! let mut panel = Registry::connect(source, config, vec![Target::new("cost", 0.0, 100.0)])?;
//! let wait = Wait::timeout(Duration::from_secs(5));
//! let values = panel.get_values(&[(0.0, 100.0)], false, &wait, |_| {})?;
//! assert_eq!(values, vec![100.0]);
//! # Ok::<(), panel_core::PanelError>(())
//! ```
//!
//! # Threads
//!
//! Unlike the protocol crate this one needs `std`: the poller runs on its
//! own thread and readers block on a condition variable.

pub mod component;
pub mod config;
pub mod decoder;
pub mod error;
pub mod gesture;
pub mod input;
pub mod poller;
pub mod registry;

pub use component::{
    ButtonEvent, ButtonState, Change, Component, Edge, EdgeLog, Granularity, PotentiometerState,
    Reading, RotaryState, StepMode,
};
pub use config::{
    BoardLayout, GestureConfig, PanelConfig, PinKind, PotentiometerConfig, RoleNames,
    RotaryConfig, SerialConfig,
};
pub use decoder::{DecoderStats, FrameDecoder};
pub use error::{PanelError, Result};
pub use gesture::{DoubleClickDetector, Gesture, GestureRecognizer, HoldDetector};
pub use input::{FrameSource, ScriptedSource, SourceError, WhenExhausted};
pub use poller::{CancelToken, Control, Poller, Published, Request, Shared, Slot, Wait};
pub use registry::{BoundTarget, ButtonRole, Registry, Target};
