//! Component state machines.
//!
//! Each physical input is one [`Component`] variant with the same
//! `update(raw, now)` / `read()` contract. The poller owns the live
//! instances; readers only see published copies.

pub mod button;
pub mod potentiometer;
pub mod rotary;

use std::time::Instant;

use panel_proto::{ComponentKind, RawValue};

use crate::config::PanelConfig;

pub use button::{ButtonEvent, ButtonState, Edge, EdgeLog};
pub use potentiometer::{Granularity, PotentiometerState};
pub use rotary::{RotaryState, StepMode};

/// Semantic value of a component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Pressed(bool),
    /// Potentiometer position as a fraction of full scale.
    Level(f64),
    Position(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    Button(ButtonState),
    Potentiometer(PotentiometerState),
    Rotary(RotaryState),
}

/// What an update changed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Change {
    Edge(Edge),
    Moved(f64),
}

impl Component {
    /// Fresh state for a component of `kind`. Master role entries have no
    /// kind of their own; use the constructors directly for those.
    pub fn for_kind(kind: ComponentKind, config: &PanelConfig) -> Option<Self> {
        match kind {
            ComponentKind::Button => Some(Self::Button(ButtonState::new())),
            ComponentKind::Potentiometer => Some(Self::Potentiometer(PotentiometerState::new(
                config.potentiometer.granularity,
                config.potentiometer.smoothing,
            ))),
            ComponentKind::Rotary => Some(Self::Rotary(RotaryState::new(config.rotary.step_mode()))),
            ComponentKind::Master => None,
        }
    }

    pub fn update(&mut self, raw: &RawValue, now: Instant) -> Option<Change> {
        match self {
            Self::Button(state) => state.update(raw.is_high(), now).map(Change::Edge),
            Self::Potentiometer(state) => {
                let before = state.level();
                state.update(raw.level());
                let delta = state.level() - before;
                (delta != 0.0).then_some(Change::Moved(delta))
            }
            Self::Rotary(state) => state.update(raw, now).map(Change::Moved),
        }
    }

    pub fn read(&self) -> Reading {
        match self {
            Self::Button(state) => Reading::Pressed(state.is_pressed()),
            Self::Potentiometer(state) => Reading::Level(state.fraction()),
            Self::Rotary(state) => Reading::Position(state.position()),
        }
    }

    /// Value mapped into an already validated `[min, max]`.
    ///
    /// Potentiometers scale linearly, encoders clamp their position and
    /// buttons report `min` or `max`.
    pub fn value_in(&self, min: f64, max: f64) -> f64 {
        match self {
            Self::Button(state) => {
                if state.is_pressed() {
                    max
                } else {
                    min
                }
            }
            Self::Potentiometer(state) => state.scaled(min, max),
            Self::Rotary(state) => state.clamped(min, max),
        }
    }

    /// [`value_in`](Self::value_in) as a whole number, ties to even.
    pub fn int_in(&self, min: f64, max: f64) -> f64 {
        match self {
            Self::Potentiometer(state) => state.linear(min, max).round_ties_even(),
            _ => self.value_in(min, max).round_ties_even(),
        }
    }

    pub fn as_button(&self) -> Option<&ButtonState> {
        match self {
            Self::Button(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_rotary(&self) -> Option<&RotaryState> {
        match self {
            Self::Rotary(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_rotary_mut(&mut self) -> Option<&mut RotaryState> {
        match self {
            Self::Rotary(state) => Some(state),
            _ => None,
        }
    }
}
