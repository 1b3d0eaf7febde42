//! Button gesture recognition.
//!
//! Every detector is a pure state machine fed `(pressed, now)` samples. It
//! returns `Some(outcome)` once the gesture is decided and `None` while it
//! still needs samples. Time-based outcomes are also decided by feeding the
//! current level again with a later `now`.

use std::time::{Duration, Instant};

use crate::component::button::{ButtonState, Edge};

/// Result of [`GestureRecognizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// No press before the wait ended.
    None,
    Click,
    DoubleClick,
    Hold,
}

/// Decides whether the first press lasts at least `hold_time`.
#[derive(Debug, Clone)]
pub struct HoldDetector {
    hold_time: Duration,
    since: Option<Instant>,
}

impl HoldDetector {
    pub fn new(hold_time: Duration) -> Self {
        Self {
            hold_time,
            since: None,
        }
    }

    pub fn feed(&mut self, pressed: bool, now: Instant) -> Option<bool> {
        if !pressed {
            return self.since.map(|_| false);
        }
        let since = *self.since.get_or_insert(now);
        (now.saturating_duration_since(since) >= self.hold_time).then_some(true)
    }
}

/// Decides whether a click is followed by a second one within `max_gap`.
#[derive(Debug, Clone)]
pub struct DoubleClickDetector {
    max_gap: Duration,
    button: ButtonState,
    first_click: Option<Instant>,
}

impl DoubleClickDetector {
    pub fn new(max_gap: Duration) -> Self {
        Self {
            max_gap,
            button: ButtonState::new(),
            first_click: None,
        }
    }

    /// Whether the first click has been seen.
    pub fn armed(&self) -> bool {
        self.first_click.is_some()
    }

    pub fn feed(&mut self, pressed: bool, now: Instant) -> Option<bool> {
        let edge = self.button.update(pressed, now);
        match self.first_click {
            None => {
                if edge == Some(Edge::Rising) {
                    self.first_click = Some(now);
                }
                None
            }
            Some(first) => {
                if now.saturating_duration_since(first) > self.max_gap {
                    Some(false)
                } else if edge == Some(Edge::Rising) {
                    Some(true)
                } else {
                    None
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    WaitingForPress,
    Pressed { since: Instant },
    Released { at: Instant },
}

/// Single-pass click / double-click / hold classification.
///
/// Waits for a press. A press held past `hold_time` is a hold; otherwise,
/// after release, a second press within `max_gap` is a double click and
/// silence is a click.
#[derive(Debug, Clone)]
pub struct GestureRecognizer {
    hold_time: Duration,
    max_gap: Duration,
    button: ButtonState,
    phase: Phase,
}

impl GestureRecognizer {
    pub fn new(hold_time: Duration, max_gap: Duration) -> Self {
        Self {
            hold_time,
            max_gap,
            button: ButtonState::new(),
            phase: Phase::WaitingForPress,
        }
    }

    pub fn feed(&mut self, pressed: bool, now: Instant) -> Option<Gesture> {
        let edge = self.button.update(pressed, now);
        match self.phase {
            Phase::WaitingForPress => {
                if edge == Some(Edge::Rising) {
                    self.phase = Phase::Pressed { since: now };
                }
                None
            }
            Phase::Pressed { since } => {
                if edge == Some(Edge::Falling) {
                    self.phase = Phase::Released { at: now };
                    None
                } else if pressed && now.saturating_duration_since(since) >= self.hold_time {
                    Some(Gesture::Hold)
                } else {
                    None
                }
            }
            Phase::Released { at } => {
                if edge == Some(Edge::Rising) {
                    Some(Gesture::DoubleClick)
                } else if now.saturating_duration_since(at) > self.max_gap {
                    Some(Gesture::Click)
                } else {
                    None
                }
            }
        }
    }

    /// Outcome when the surrounding wait ends early: a completed press
    /// counts as a click, anything else as no gesture.
    pub fn finish(&self) -> Gesture {
        match self.phase {
            Phase::Released { .. } => Gesture::Click,
            Phase::WaitingForPress | Phase::Pressed { .. } => Gesture::None,
        }
    }
}
