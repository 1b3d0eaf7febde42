//! Rotary encoder decoding.
//!
//! The board reports either both quadrature pins as a two-element list, or a
//! position it already accumulated itself as a scalar.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use panel_proto::RawValue;

use crate::component::potentiometer::check_range;
use crate::error::Result;

/// Window for the rotations-per-second estimate.
pub const RPS_WINDOW: Duration = Duration::from_secs(1);

/// Rotations per second that correspond to one multiple of the base step.
const RPS_PER_STEP: f64 = 5.0;
const MAX_STEP_FACTOR: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepMode {
    Fixed(f64),
    /// Step grows with rotation speed.
    Dynamic { base: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RotaryState {
    position: f64,
    previous_pin: Option<bool>,
    recent: VecDeque<Instant>,
    mode: StepMode,
    bounds: Option<(f64, f64)>,
}

impl RotaryState {
    pub fn new(mode: StepMode) -> Self {
        Self {
            position: 0.0,
            previous_pin: None,
            recent: VecDeque::new(),
            mode,
            bounds: None,
        }
    }

    /// Feed one reading. Returns the position change, if any.
    pub fn update(&mut self, raw: &RawValue, now: Instant) -> Option<f64> {
        let Some((primary, secondary)) = raw.pins() else {
            let level = raw.level();
            let delta = level - self.position;
            self.position = level;
            return (delta != 0.0).then_some(delta);
        };

        let previous = self.previous_pin.replace(primary);
        match previous {
            Some(prev) if prev != primary => {
                let direction = if primary == secondary { 1.0 } else { -1.0 };
                let delta = direction * self.step(now);
                self.advance(delta);
                Some(delta)
            }
            _ => None,
        }
    }

    /// Current step size; records a rotation at `now` in dynamic mode.
    fn step(&mut self, now: Instant) -> f64 {
        match self.mode {
            StepMode::Fixed(step) => step,
            StepMode::Dynamic { base } => {
                self.recent.push_back(now);
                while let Some(&oldest) = self.recent.front() {
                    if now.saturating_duration_since(oldest) >= RPS_WINDOW {
                        self.recent.pop_front();
                    } else {
                        break;
                    }
                }
                base * step_factor(self.recent.len() as f64)
            }
        }
    }

    /// Move by `delta`, wrapping to the opposite bound when one is crossed.
    pub fn advance(&mut self, delta: f64) {
        self.position += delta;
        if let Some((min, max)) = self.bounds {
            if self.position > max {
                self.position = min;
            } else if self.position < min {
                self.position = max;
            }
        }
    }

    /// Set wrap bounds. The current position is clamped into them.
    pub fn set_bounds(&mut self, min: f64, max: f64) -> Result<()> {
        check_range(min, max)?;
        self.bounds = Some((min, max));
        self.position = self.position.clamp(min, max);
        Ok(())
    }

    pub fn clear_bounds(&mut self) {
        self.bounds = None;
    }

    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.bounds
    }

    pub fn set_position(&mut self, position: f64) {
        self.position = position;
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Position clamped into `[min, max]`.
    pub fn value(&self, min: f64, max: f64) -> Result<f64> {
        check_range(min, max)?;
        Ok(self.clamped(min, max))
    }

    pub(crate) fn clamped(&self, min: f64, max: f64) -> f64 {
        self.position.clamp(min, max)
    }

    pub fn mode(&self) -> StepMode {
        self.mode
    }
}

/// `clamp(rps / 5, 1, 10)`: never below the base step.
pub fn step_factor(rps: f64) -> f64 {
    (rps / RPS_PER_STEP).clamp(1.0, MAX_STEP_FACTOR)
}
