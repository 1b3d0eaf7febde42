//! Button edge detection.
//!
//! Clicks are debounced by edge detection, not by time: a click fires on the
//! sample that first observes `pressed` after a released sample, and never
//! again until the button has been released.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Level transition of a button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

impl Edge {
    /// Button level after this edge.
    pub const fn level(self) -> bool {
        matches!(self, Self::Rising)
    }
}

/// State of one push button.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonState {
    pressed: bool,
    previous_pressed: bool,
    primed: bool,
    press_started_at: Option<Instant>,
    presses: u64,
    releases: u64,
}

impl ButtonState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sample. The first sample only primes the state.
    pub fn update(&mut self, pressed: bool, now: Instant) -> Option<Edge> {
        if !self.primed {
            self.primed = true;
            self.pressed = pressed;
            self.previous_pressed = pressed;
            self.press_started_at = pressed.then_some(now);
            return None;
        }

        self.previous_pressed = self.pressed;
        self.pressed = pressed;
        match (self.previous_pressed, pressed) {
            (false, true) => {
                self.presses += 1;
                self.press_started_at = Some(now);
                Some(Edge::Rising)
            }
            (true, false) => {
                self.releases += 1;
                self.press_started_at = None;
                Some(Edge::Falling)
            }
            _ => None,
        }
    }

    /// Feed one sample and report whether it is a click.
    pub fn click(&mut self, pressed: bool, now: Instant) -> bool {
        self.update(pressed, now) == Some(Edge::Rising)
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    /// How long the current press has lasted, if pressed.
    pub fn held_for(&self, now: Instant) -> Option<Duration> {
        self.press_started_at
            .map(|since| now.saturating_duration_since(since))
    }

    pub fn presses(&self) -> u64 {
        self.presses
    }

    pub fn releases(&self) -> u64 {
        self.releases
    }
}

/// Edge observed by the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub seq: u64,
    pub edge: Edge,
    pub at: Instant,
}

/// Bounded history of button edges.
///
/// Readers keep a cursor (the next sequence number they have not consumed),
/// so no edge is lost between two reader wake-ups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeLog {
    events: VecDeque<ButtonEvent>,
    next_seq: u64,
}

impl EdgeLog {
    /// Edges retained per button.
    pub const CAPACITY: usize = 64;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edge: Edge, at: Instant) {
        if self.events.len() == Self::CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(ButtonEvent {
            seq: self.next_seq,
            edge,
            at,
        });
        self.next_seq += 1;
    }

    /// Sequence number the next edge will get.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Retained edges with `seq >= cursor`, oldest first.
    pub fn since(&self, cursor: u64) -> impl Iterator<Item = &ButtonEvent> {
        self.events.iter().filter(move |ev| ev.seq >= cursor)
    }

    /// First rising edge at or after `cursor`.
    pub fn first_press_since(&self, cursor: u64) -> Option<&ButtonEvent> {
        self.since(cursor).find(|ev| ev.edge == Edge::Rising)
    }
}
