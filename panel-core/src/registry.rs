//! The panel façade.
//!
//! A [`Registry`] discovers what is plugged into the master board, binds
//! the fixed roles (confirm, decline, selection wheel) and one value handler
//! per target, then hands the transport to a [`Poller`] thread. Every input
//! operation blocks on the published state until it is decided, the
//! [`Wait`] deadline passes, or the wait is cancelled.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use panel_proto::{Address, ChecksumTable, Command, ComponentKind, Snapshot};

use crate::component::potentiometer::check_range;
use crate::component::{ButtonEvent, ButtonState, Component, Edge, EdgeLog, RotaryState};
use crate::config::PanelConfig;
use crate::decoder::FrameDecoder;
use crate::error::{PanelError, Result};
use crate::gesture::{DoubleClickDetector, Gesture, GestureRecognizer, HoldDetector};
use crate::input::{FrameSource, SourceError};
use crate::poller::{Binding, Poller, Published, Request, Shared, Slot, Wait, READ_CHUNK};

/// A value the decision maker sets, with the range it is mapped into.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
}

impl Target {
    pub fn new(name: impl Into<String>, lower: f64, upper: f64) -> Self {
        Self {
            name: name.into(),
            lower,
            upper,
        }
    }
}

/// A target and the component that sets it.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundTarget {
    pub target: Target,
    pub address: Address,
}

impl BoundTarget {
    pub fn kind(&self) -> ComponentKind {
        self.address.kind
    }
}

/// Which master button a gesture is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonRole {
    Confirm,
    Decline,
}

impl ButtonRole {
    fn slot(self) -> Slot {
        match self {
            Self::Confirm => Slot::Confirm,
            Self::Decline => Slot::Decline,
        }
    }
}

/// Live connection to a panel.
///
/// Dropping the registry sends `Q` to the board and stops the poller.
pub struct Registry {
    config: PanelConfig,
    shared: Arc<Shared>,
    requests: Sender<Request>,
    poller: Option<JoinHandle<()>>,
    targets: Vec<BoundTarget>,
    /// Next unconsumed edge per button.
    cursors: BTreeMap<Slot, u64>,
}

impl Registry {
    /// Discover the panel behind `source` and bind `targets` to it.
    ///
    /// Value handlers are taken in the order the board first reported them;
    /// buttons and master entries are never bound to targets.
    pub fn connect<S>(mut source: S, config: PanelConfig, targets: Vec<Target>) -> Result<Self>
    where
        S: FrameSource + 'static,
    {
        config.validate()?;
        for target in &targets {
            check_range(target.lower, target.upper)?;
        }

        let mut decoder = FrameDecoder::new(ChecksumTable::new(config.checksum_key));
        send_command(&mut source, &Command::Request)?;
        let discovered = discover(&mut source, &mut decoder, &config)?;
        info!(
            "discovered {} potentiometers, {} rotary encoders, {} buttons",
            discovered.count(ComponentKind::Potentiometer),
            discovered.count(ComponentKind::Rotary),
            discovered.count(ComponentKind::Button),
        );

        let (bound, mut bindings) = bind_targets(&discovered, &config, targets)?;
        bindings.extend(role_bindings(&config));

        let now = Instant::now();
        for binding in &mut bindings {
            if let Some(raw) = discovered.get(&binding.address) {
                binding.component.update(raw, now);
            }
        }

        let published = Published {
            components: bindings
                .iter()
                .map(|b| (b.slot, b.component.clone()))
                .collect(),
            edges: [Slot::Confirm, Slot::Decline]
                .into_iter()
                .map(|slot| (slot, EdgeLog::new()))
                .collect(),
            snapshot: discovered,
            ..Published::default()
        };
        let shared = Arc::new(Shared::new(published));
        let (requests, inbox) = mpsc::channel();
        let poller = Poller::new(source, decoder, bindings, Arc::clone(&shared), inbox).spawn()?;

        Ok(Self {
            config,
            shared,
            requests,
            poller: Some(poller),
            targets: bound,
            cursors: BTreeMap::new(),
        })
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn targets(&self) -> &[BoundTarget] {
        &self.targets
    }

    /// Latest merged snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.shared.read(|p| p.snapshot.clone())
    }

    /// False once the poller has stopped.
    pub fn is_connected(&self) -> bool {
        !self.shared.read(|p| p.closed)
    }

    /// Current value of target `index` within its own bounds.
    pub fn target_value(&self, index: usize) -> Option<f64> {
        let target = &self.targets.get(index)?.target;
        self.shared.read(|p| {
            p.component(Slot::Target(index))
                .map(|c| c.value_in(target.lower, target.upper))
        })
    }

    /// Ask the board to rescan its nodes.
    pub fn scan(&self) -> Result<()> {
        self.send(Command::Scan)
    }

    /// Send every target's range to the board and wrap rotary targets.
    pub fn push_bounds(&self) -> Result<()> {
        for (index, bound) in self.targets.iter().enumerate() {
            let Target { lower, upper, .. } = bound.target;
            let step = match bound.kind() {
                ComponentKind::Rotary => {
                    self.request(Request::SetBounds {
                        slot: Slot::Target(index),
                        min: lower,
                        max: upper,
                    })?;
                    self.config.rotary.step
                }
                _ => 0.0,
            };
            self.send(Command::SetBounds {
                node: bound.address.node.clone(),
                kind: bound.kind(),
                id: bound.address.id.clone(),
                min: lower,
                max: upper,
                step,
            })?;
        }
        Ok(())
    }

    /// Wait for a click on confirm (true) or decline (false).
    ///
    /// When both are pressed in the same sample, confirm wins.
    pub fn confirm(&mut self, wait: &Wait) -> Result<bool> {
        let confirm_from = self.cursor(Slot::Confirm);
        let decline_from = self.cursor(Slot::Decline);
        let result = self.shared.wait_for(
            wait,
            self.config.poll_interval(),
            self.config.settle_delay(),
            |published| {
                let accept = published
                    .edges(Slot::Confirm)
                    .and_then(|log| log.first_press_since(confirm_from));
                let decline = published
                    .edges(Slot::Decline)
                    .and_then(|log| log.first_press_since(decline_from));
                let accepted = match (accept, decline) {
                    (Some(a), Some(d)) => a.at <= d.at,
                    (Some(_), None) => true,
                    (None, Some(_)) => false,
                    (None, None) => return None,
                };
                Some((accepted, edge_heads(published)))
            },
        );
        let accepted = self.settle(result)?;
        debug!("confirm -> {accepted}");
        Ok(accepted)
    }

    /// Wrap the selection wheel into `[min, max]` and return its position.
    pub fn select(&self, min: f64, max: f64) -> Result<f64> {
        check_range(min, max)?;
        self.request(Request::SetBounds {
            slot: Slot::Wheel,
            min,
            max,
        })?;
        thread::sleep(self.config.settle_delay());
        Ok(self.shared.read(|p| wheel_position(p, min, max)))
    }

    /// Let the wheel pick an index in `[min, max]`, returned on confirm.
    pub fn choose(&mut self, min: i64, max: i64, wait: &Wait) -> Result<i64> {
        let (lower, upper) = (min as f64, max as f64);
        check_range(lower, upper)?;
        self.request(Request::SetBounds {
            slot: Slot::Wheel,
            min: lower,
            max: upper,
        })?;

        let from = self.cursor(Slot::Confirm);
        let result = self.shared.wait_for(
            wait,
            self.config.poll_interval(),
            self.config.settle_delay(),
            |published| {
                pressed_since(published.edges(Slot::Confirm), from)?;
                Some((wheel_position(published, lower, upper), edge_heads(published)))
            },
        );
        let position = self.settle(result)?;
        Ok(position.round_ties_even() as i64)
    }

    /// Live values of the first `bounds.len()` targets, returned when
    /// confirm is clicked.
    ///
    /// `on_update` sees every distinct set of values while waiting.
    pub fn get_values(
        &mut self,
        bounds: &[(f64, f64)],
        as_int: bool,
        wait: &Wait,
        mut on_update: impl FnMut(&[f64]),
    ) -> Result<Vec<f64>> {
        if bounds.len() > self.targets.len() {
            return Err(PanelError::InsufficientHandlers {
                needed: bounds.len(),
                available: self.targets.len(),
            });
        }
        for &(min, max) in bounds {
            check_range(min, max)?;
        }

        let from = self.cursor(Slot::Confirm);
        let mut last: Option<Vec<f64>> = None;
        let result = self.shared.wait_for(
            wait,
            self.config.poll_interval(),
            self.config.settle_delay(),
            |published| {
                let values = current_values(published, bounds, as_int);
                if last.as_ref() != Some(&values) {
                    on_update(&values);
                    last = Some(values.clone());
                }
                pressed_since(published.edges(Slot::Confirm), from)?;
                Some((values, edge_heads(published)))
            },
        );
        self.settle(result)
    }

    /// [`get_values`](Self::get_values) over every target's own range,
    /// echoing the values on one terminal line.
    pub fn get_target_values(&mut self, as_int: bool, wait: &Wait) -> Result<Vec<f64>> {
        let bounds: Vec<(f64, f64)> = self
            .targets
            .iter()
            .map(|b| (b.target.lower, b.target.upper))
            .collect();
        let names: Vec<String> = self.targets.iter().map(|b| b.target.name.clone()).collect();

        let result = self.get_values(&bounds, as_int, wait, |values| {
            let line = names
                .iter()
                .zip(values)
                .map(|(name, value)| format!("{name}: {value}"))
                .collect::<Vec<_>>()
                .join("  ");
            let mut stdout = std::io::stdout().lock();
            let _ = write!(stdout, "\r{line}  ");
            let _ = stdout.flush();
        });
        println!();
        result
    }

    /// True if the button is held for the configured hold time, false if
    /// it is released first.
    pub fn hold(&mut self, role: ButtonRole, wait: &Wait) -> Result<bool> {
        let mut detector = HoldDetector::new(self.config.gestures.hold_time());
        self.track(role, wait, |pressed, at| detector.feed(pressed, at))
    }

    /// True on a second click within the configured gap after the first.
    pub fn double_click(&mut self, role: ButtonRole, wait: &Wait) -> Result<bool> {
        let mut detector = DoubleClickDetector::new(self.config.gestures.double_click_gap());
        self.track(role, wait, |pressed, at| detector.feed(pressed, at))
    }

    /// Classify the next press as click, double click or hold.
    ///
    /// A timeout is not an error here: it yields [`Gesture::None`], or
    /// [`Gesture::Click`] when a press was already completed.
    pub fn action(&mut self, role: ButtonRole, wait: &Wait) -> Result<Gesture> {
        let gestures = &self.config.gestures;
        let mut recognizer = GestureRecognizer::new(gestures.hold_time(), gestures.double_click_gap());
        match self.track(role, wait, |pressed, at| recognizer.feed(pressed, at)) {
            Err(PanelError::Timeout) => Ok(recognizer.finish()),
            other => other,
        }
    }

    /// Feed a button's edges, then its current level, into `feed` until
    /// it decides.
    fn track<T>(
        &mut self,
        role: ButtonRole,
        wait: &Wait,
        mut feed: impl FnMut(bool, Instant) -> Option<T>,
    ) -> Result<T> {
        let slot = role.slot();
        let mut cursor = self.cursor(slot);
        let mut primed = false;

        let result = self.shared.wait_for(
            wait,
            self.config.poll_interval(),
            self.config.settle_delay(),
            |published| {
                let log = published.edges(slot)?;
                let decided = |out: T| Some((out, edge_heads(published)));
                if !primed {
                    primed = true;
                    // Releases of a press consumed by an earlier call
                    if let Some(stale) = log
                        .since(cursor)
                        .take_while(|ev| ev.edge == Edge::Falling)
                        .last()
                    {
                        cursor = stale.seq + 1;
                    }
                    let (level, at) = match log.since(cursor).next() {
                        Some(ev) => (false, ev.at),
                        None => (published.is_pressed(slot), Instant::now()),
                    };
                    if let Some(out) = feed(level, at) {
                        return decided(out);
                    }
                }
                for ev in log.since(cursor) {
                    cursor = ev.seq + 1;
                    if let Some(out) = feed(ev.edge.level(), ev.at) {
                        return decided(out);
                    }
                }
                feed(published.is_pressed(slot), Instant::now()).and_then(decided)
            },
        );
        self.settle(result)
    }

    /// Mark every button edge seen by a finished operation as consumed.
    ///
    /// On success the heads come from the state the operation decided on;
    /// otherwise from the latest published state.
    fn settle<T>(&mut self, result: Result<(T, BTreeMap<Slot, u64>)>) -> Result<T> {
        let (out, heads) = match result {
            Ok((out, heads)) => (Ok(out), heads),
            Err(e) => (Err(e), self.shared.read(edge_heads)),
        };
        self.cursors.extend(heads);
        out
    }

    fn cursor(&self, slot: Slot) -> u64 {
        self.cursors.get(&slot).copied().unwrap_or(0)
    }

    /// Queue a command once it is known to encode.
    fn send(&self, command: Command) -> Result<()> {
        command.to_bytes()?;
        self.request(Request::Send(command))
    }

    fn request(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| PanelError::Disconnected)
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        let _ = self.requests.send(Request::Send(Command::Quit));
        let _ = self.requests.send(Request::Stop);
        if let Some(poller) = self.poller.take() {
            if poller.join().is_err() {
                warn!("poller thread panicked");
            }
        }
    }
}

fn send_command<S: FrameSource>(source: &mut S, command: &Command) -> Result<()> {
    source.send(&command.to_bytes()?)?;
    Ok(())
}

/// Read frames until the master roles are known and the discovery window
/// has passed.
///
/// Frames are taken one at a time, so anything that arrived after the
/// deciding frame stays queued in `decoder` for the poller.
fn discover<S: FrameSource>(
    source: &mut S,
    decoder: &mut FrameDecoder,
    config: &PanelConfig,
) -> Result<Snapshot> {
    let started = Instant::now();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        while let Some(result) = decoder.next_frame() {
            if result.is_err() {
                continue;
            }
            debug!("discovery: {} readings so far", decoder.snapshot().len());
            if missing_role(decoder.snapshot(), config).is_none()
                && started.elapsed() >= config.discovery_window()
            {
                return Ok(decoder.snapshot().clone());
            }
        }

        let elapsed = started.elapsed();
        match missing_role(decoder.snapshot(), config) {
            None if elapsed >= config.discovery_window() => return Ok(decoder.snapshot().clone()),
            Some(role) if elapsed >= config.discovery_timeout() => {
                return Err(PanelError::MissingRole(role.to_owned()));
            }
            _ => {}
        }

        match source.read(&mut buf) {
            Ok(n) => decoder.push(&buf[..n]),
            Err(SourceError::Disconnected) => return Err(PanelError::Disconnected),
            Err(e) => {
                warn!("read failed during discovery: {e}");
                thread::sleep(config.poll_interval().max(Duration::from_millis(1)));
            }
        }
    }
}

fn missing_role<'a>(snapshot: &Snapshot, config: &'a PanelConfig) -> Option<&'a str> {
    config
        .roles
        .all()
        .into_iter()
        .find(|role| snapshot.master(role).is_none())
}

/// Pair targets with value handlers in discovery order.
fn bind_targets(
    discovered: &Snapshot,
    config: &PanelConfig,
    targets: Vec<Target>,
) -> Result<(Vec<BoundTarget>, Vec<Binding>)> {
    let handlers: Vec<&Address> = discovered
        .addresses()
        .filter(|address| address.kind.is_value_handler())
        .collect();
    if handlers.len() < targets.len() {
        return Err(PanelError::InsufficientHandlers {
            needed: targets.len(),
            available: handlers.len(),
        });
    }

    let mut bound = Vec::with_capacity(targets.len());
    let mut bindings = Vec::with_capacity(targets.len() + 3);
    for (index, (target, address)) in targets.into_iter().zip(handlers).enumerate() {
        let component = Component::for_kind(address.kind, config)
            .ok_or_else(|| PanelError::Config(format!("{address} cannot hold a value")))?;
        info!("target {:?} -> {address}", target.name);
        bindings.push(Binding::new(Slot::Target(index), address.clone(), component));
        bound.push(BoundTarget {
            target,
            address: address.clone(),
        });
    }
    Ok((bound, bindings))
}

fn role_bindings(config: &PanelConfig) -> [Binding; 3] {
    let roles = &config.roles;
    [
        Binding::new(
            Slot::Confirm,
            Address::master(roles.confirm.as_str()),
            Component::Button(ButtonState::new()),
        ),
        Binding::new(
            Slot::Decline,
            Address::master(roles.decline.as_str()),
            Component::Button(ButtonState::new()),
        ),
        Binding::new(
            Slot::Wheel,
            Address::master(roles.wheel.as_str()),
            Component::Rotary(RotaryState::new(config.rotary.step_mode())),
        ),
    ]
}

/// The first press at or after `from`, if any.
fn pressed_since(log: Option<&EdgeLog>, from: u64) -> Option<&ButtonEvent> {
    log.and_then(|log| log.first_press_since(from))
}

/// Sequence number of the next edge of every button.
fn edge_heads(published: &Published) -> BTreeMap<Slot, u64> {
    published
        .edges
        .iter()
        .map(|(slot, log)| (*slot, log.next_seq()))
        .collect()
}

fn wheel_position(published: &Published, min: f64, max: f64) -> f64 {
    published
        .component(Slot::Wheel)
        .map_or(min, |wheel| wheel.value_in(min, max))
}

fn current_values(published: &Published, bounds: &[(f64, f64)], as_int: bool) -> Vec<f64> {
    bounds
        .iter()
        .enumerate()
        .map(|(index, &(min, max))| {
            match published.component(Slot::Target(index)) {
                Some(c) if as_int => c.int_in(min, max),
                Some(c) => c.value_in(min, max),
                None if as_int => min.round_ties_even(),
                None => min,
            }
        })
        .collect()
}
