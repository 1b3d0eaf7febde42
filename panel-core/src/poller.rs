//! Background poller and published state.
//!
//! The poller thread is the only writer of component state. After each read
//! it publishes a fresh [`Published`] copy under a mutex and wakes every
//! waiter through a condition variable. Readers never touch the transport;
//! outbound commands travel through a [`Request`] channel and are written
//! by the poller between reads.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use panel_proto::{Address, Command, Snapshot};

use crate::component::{Change, Component, EdgeLog};
use crate::decoder::FrameDecoder;
use crate::error::{PanelError, Result};
use crate::input::{FrameSource, SourceError};

/// Bytes requested from the source per read.
pub const READ_CHUNK: usize = 256;

/// Pause after a failed read before trying again.
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Logical position a component is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Slot {
    Confirm,
    Decline,
    Wheel,
    /// Value handler bound to the target with this index.
    Target(usize),
}

/// A component the poller keeps up to date.
#[derive(Debug, Clone)]
pub struct Binding {
    pub slot: Slot,
    pub address: Address,
    pub component: Component,
}

impl Binding {
    pub fn new(slot: Slot, address: Address, component: Component) -> Self {
        Self {
            slot,
            address,
            component,
        }
    }
}

/// Work queued for the poller thread.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Send(Command),
    /// Set wrap bounds on the encoder in `slot`.
    SetBounds { slot: Slot, min: f64, max: f64 },
    Stop,
}

/// State visible to readers.
#[derive(Debug, Clone, Default)]
pub struct Published {
    /// Bumped on every publish.
    pub generation: u64,
    /// Set once the poller has stopped; nothing will change any more.
    pub closed: bool,
    pub snapshot: Snapshot,
    pub components: BTreeMap<Slot, Component>,
    pub edges: BTreeMap<Slot, EdgeLog>,
}

impl Published {
    pub fn component(&self, slot: Slot) -> Option<&Component> {
        self.components.get(&slot)
    }

    pub fn edges(&self, slot: Slot) -> Option<&EdgeLog> {
        self.edges.get(&slot)
    }

    /// Current level of the button in `slot`; false for anything else.
    pub fn is_pressed(&self, slot: Slot) -> bool {
        self.component(slot)
            .and_then(Component::as_button)
            .is_some_and(|button| button.is_pressed())
    }
}

/// Cancellation flag shared between a blocked call and whoever cancels it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// How long a blocking call may wait, and how it can be cancelled.
///
/// ```
/// use std::time::Duration;
/// use panel_core::{CancelToken, Wait};
///
/// let token = CancelToken::new();
/// let wait = Wait::timeout(Duration::from_secs(30)).with_cancel(token.clone());
/// assert!(!wait.is_cancelled());
/// token.cancel();
/// assert!(wait.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Wait {
    deadline: Option<Instant>,
    cancel: Option<CancelToken>,
}

impl Wait {
    /// No deadline and no cancellation.
    pub fn forever() -> Self {
        Self::default()
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self::until(Instant::now() + timeout)
    }

    pub fn until(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: None,
        }
    }

    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// Latest published state plus the condition variable signalling updates.
#[derive(Debug, Default)]
pub struct Shared {
    state: Mutex<Published>,
    changed: Condvar,
}

impl Shared {
    pub fn new(initial: Published) -> Self {
        Self {
            state: Mutex::new(initial),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Published> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `update`, bump the generation and wake all waiters.
    pub fn publish(&self, update: impl FnOnce(&mut Published)) {
        let mut state = self.lock();
        update(&mut *state);
        state.generation += 1;
        drop(state);
        self.changed.notify_all();
    }

    pub fn close(&self) {
        self.publish(|state| state.closed = true);
    }

    /// Copy of the current state.
    pub fn latest(&self) -> Published {
        self.lock().clone()
    }

    pub fn read<T>(&self, f: impl FnOnce(&Published) -> T) -> T {
        f(&*self.lock())
    }

    /// Block until `check` returns `Some`.
    ///
    /// `check` runs once up front and again after every publish, and at
    /// least every `poll` so that cancellation and deadlines are noticed.
    /// Each check is preceded by `settle`.
    pub fn wait_for<T>(
        &self,
        wait: &Wait,
        poll: Duration,
        settle: Duration,
        mut check: impl FnMut(&Published) -> Option<T>,
    ) -> Result<T> {
        loop {
            if wait.is_cancelled() {
                return Err(PanelError::Cancelled);
            }
            if !settle.is_zero() {
                thread::sleep(settle);
            }

            let state = self.lock();
            if let Some(found) = check(&*state) {
                return Ok(found);
            }
            if state.closed {
                return Err(PanelError::Disconnected);
            }

            let timeout = match wait.deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(PanelError::Timeout);
                    }
                    poll.min(deadline - now)
                }
                None => poll,
            };
            let generation = state.generation;
            let _ = self
                .changed
                .wait_timeout_while(state, timeout, |state| state.generation == generation)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Whether [`Poller::process_one`] should be called again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Stop,
}

/// Owns the transport and every bound component.
pub struct Poller<S> {
    source: S,
    decoder: FrameDecoder,
    bindings: Vec<Binding>,
    shared: Arc<Shared>,
    requests: Receiver<Request>,
    buf: [u8; READ_CHUNK],
}

impl<S: FrameSource> Poller<S> {
    pub fn new(
        source: S,
        decoder: FrameDecoder,
        bindings: Vec<Binding>,
        shared: Arc<Shared>,
        requests: Receiver<Request>,
    ) -> Self {
        Self {
            source,
            decoder,
            bindings,
            shared,
            requests,
            buf: [0; READ_CHUNK],
        }
    }

    /// Handle queued requests, then read and route one chunk.
    pub fn process_one(&mut self) -> Control {
        loop {
            let control = match self.requests.try_recv() {
                Ok(request) => self.handle(request),
                Err(TryRecvError::Disconnected) => Control::Stop,
                Err(TryRecvError::Empty) => break,
            };
            if control == Control::Stop {
                self.shared.close();
                return Control::Stop;
            }
        }

        match self.source.read(&mut self.buf) {
            Ok(0) => {}
            Ok(n) => {
                self.decoder.push(&self.buf[..n]);
                self.route_frames();
            }
            Err(SourceError::Disconnected) => {
                warn!("frame source disconnected");
                self.shared.close();
                return Control::Stop;
            }
            Err(e) => {
                warn!("read failed, retrying: {e}");
                thread::sleep(RETRY_DELAY);
            }
        }
        Control::Continue
    }

    /// Loop until stopped or disconnected.
    pub fn run(mut self) {
        info!("poller started with {} bindings", self.bindings.len());
        // Frames already buffered by discovery
        self.route_frames();
        while self.process_one() == Control::Continue {}
        let stats = self.decoder.stats();
        info!(
            "poller stopped: {} frames accepted, {} dropped",
            stats.accepted, stats.dropped
        );
    }

    /// Run on a dedicated thread.
    pub fn spawn(self) -> Result<JoinHandle<()>>
    where
        S: 'static,
    {
        thread::Builder::new()
            .name("panel-poller".into())
            .spawn(move || self.run())
            .map_err(PanelError::from)
    }

    fn handle(&mut self, request: Request) -> Control {
        match request {
            Request::Send(command) => match command.to_bytes() {
                Ok(bytes) => {
                    debug!("sending command {:?}", char::from(command.code()));
                    if let Err(e) = self.source.send(&bytes) {
                        warn!("failed to send command: {e}");
                    }
                }
                Err(e) => warn!("dropping command: {e}"),
            },
            Request::SetBounds { slot, min, max } => self.set_bounds(slot, min, max),
            Request::Stop => return Control::Stop,
        }
        Control::Continue
    }

    fn set_bounds(&mut self, slot: Slot, min: f64, max: f64) {
        let Some(binding) = self.bindings.iter_mut().find(|b| b.slot == slot) else {
            warn!("no component bound to {slot:?}");
            return;
        };
        let Some(rotary) = binding.component.as_rotary_mut() else {
            warn!("{} is not a rotary encoder", binding.address);
            return;
        };
        if let Err(e) = rotary.set_bounds(min, max) {
            warn!("rejecting bounds for {}: {e}", binding.address);
            return;
        }
        let (slot, component) = (binding.slot, binding.component.clone());
        self.shared.publish(|state| {
            state.components.insert(slot, component);
        });
    }

    fn route_frames(&mut self) {
        let mut edges = Vec::new();
        let mut accepted = false;

        while let Some(result) = self.decoder.next_frame() {
            // Already logged by the decoder
            let Ok(frame) = result else { continue };
            accepted = true;
            let now = Instant::now();
            for binding in &mut self.bindings {
                let Some(raw) = frame.get(&binding.address) else {
                    continue;
                };
                match binding.component.update(raw, now) {
                    Some(Change::Edge(edge)) => {
                        trace!("{} {edge:?}", binding.address);
                        edges.push((binding.slot, edge, now));
                    }
                    Some(Change::Moved(delta)) => trace!("{} moved by {delta}", binding.address),
                    None => {}
                }
            }
        }

        if !accepted {
            return;
        }
        let snapshot = self.decoder.snapshot().clone();
        let components: BTreeMap<Slot, Component> = self
            .bindings
            .iter()
            .map(|b| (b.slot, b.component.clone()))
            .collect();
        self.shared.publish(|state| {
            state.snapshot = snapshot;
            state.components = components;
            for (slot, edge, at) in edges {
                state.edges.entry(slot).or_default().push(edge, at);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    use panel_proto::{ChecksumTable, ComponentKind, FrameBuilder};

    use crate::component::{ButtonState, Edge, RotaryState, StepMode};
    use crate::input::ScriptedSource;

    fn frame(builder: FrameBuilder) -> Vec<u8> {
        builder.build(&ChecksumTable::default())
    }

    fn bindings() -> Vec<Binding> {
        vec![
            Binding::new(
                Slot::Confirm,
                Address::master("Accept"),
                Component::Button(ButtonState::new()),
            ),
            Binding::new(
                Slot::Wheel,
                Address::master("Rotary"),
                Component::Rotary(RotaryState::new(StepMode::Fixed(1.0))),
            ),
        ]
    }

    fn poller(
        source: ScriptedSource,
    ) -> (Poller<ScriptedSource>, Arc<Shared>, mpsc::Sender<Request>) {
        let shared = Arc::new(Shared::default());
        let (tx, rx) = mpsc::channel();
        let poller = Poller::new(
            source,
            FrameDecoder::new(ChecksumTable::default()),
            bindings(),
            Arc::clone(&shared),
            rx,
        );
        (poller, shared, tx)
    }

    #[test]
    fn test_edges_from_one_read_are_all_kept() {
        // Press and release inside a single chunk
        let mut chunk = frame(FrameBuilder::new().master("Accept", 0.0));
        chunk.extend(frame(FrameBuilder::new().master("Accept", 1.0)));
        chunk.extend(frame(FrameBuilder::new().master("Accept", 0.0)));
        let (mut poller, shared, _tx) = poller(ScriptedSource::new([chunk]));

        assert_eq!(poller.process_one(), Control::Continue);
        let published = shared.latest();
        let edges: Vec<Edge> = published
            .edges(Slot::Confirm)
            .unwrap()
            .since(0)
            .map(|ev| ev.edge)
            .collect();
        assert_eq!(edges, vec![Edge::Rising, Edge::Falling]);
        assert!(!published.is_pressed(Slot::Confirm));
        assert_eq!(published.generation, 1);
    }

    #[test]
    fn test_wheel_steps_and_bounds() {
        let source = ScriptedSource::new([
            frame(FrameBuilder::new().master_pins("Rotary", 0.0, 0.0)),
            frame(FrameBuilder::new().master_pins("Rotary", 1.0, 1.0)),
        ]);
        let (mut poller, shared, tx) = poller(source);
        poller.process_one();
        poller.process_one();
        let position = |shared: &Shared| {
            shared.read(|p| p.component(Slot::Wheel).and_then(Component::as_rotary).map(RotaryState::position))
        };
        assert_eq!(position(&shared), Some(1.0));

        tx.send(Request::SetBounds {
            slot: Slot::Wheel,
            min: 5.0,
            max: 10.0,
        })
        .unwrap();
        poller.process_one();
        assert_eq!(position(&shared), Some(5.0));
    }

    #[test]
    fn test_commands_are_written_before_reading() {
        let source = ScriptedSource::new(Vec::<Vec<u8>>::new());
        let handle = source.clone();
        let (mut poller, _shared, tx) = poller(source);
        tx.send(Request::Send(Command::Scan)).unwrap();
        tx.send(Request::Send(Command::set_bounds(
            "2",
            ComponentKind::Rotary,
            0.0,
            4.0,
            0.5,
        )))
        .unwrap();

        // Source is empty, so the read disconnects after the writes
        assert_eq!(poller.process_one(), Control::Stop);
        assert_eq!(
            handle.sent(),
            vec![b"S".to_vec(), b"B 2:R:0:0:4:0.5\r\n".to_vec()]
        );
    }

    #[test]
    fn test_disconnect_closes_and_wakes_waiters() {
        let (poller, shared, _tx) = poller(ScriptedSource::new(Vec::<Vec<u8>>::new()));
        let handle = poller.spawn().unwrap();
        let result = shared.wait_for(
            &Wait::timeout(Duration::from_secs(5)),
            Duration::from_millis(10),
            Duration::ZERO,
            |_| None::<()>,
        );
        assert!(matches!(result, Err(PanelError::Disconnected)));
        handle.join().unwrap();
    }

    #[test]
    fn test_stop_request() {
        let (mut poller, shared, tx) = poller(ScriptedSource::new(Vec::<Vec<u8>>::new()));
        tx.send(Request::Stop).unwrap();
        assert_eq!(poller.process_one(), Control::Stop);
        assert!(shared.latest().closed);
    }

    #[test]
    fn test_wait_timeout_and_cancel() {
        let shared = Shared::default();
        let poll = Duration::from_millis(5);

        let result = shared.wait_for(&Wait::timeout(Duration::from_millis(20)), poll, Duration::ZERO, |_| {
            None::<()>
        });
        assert!(matches!(result, Err(PanelError::Timeout)));

        let token = CancelToken::new();
        let canceller = token.clone();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });
        let result = shared.wait_for(&Wait::forever().with_cancel(token), poll, Duration::ZERO, |_| {
            None::<()>
        });
        assert!(matches!(result, Err(PanelError::Cancelled)));
        worker.join().unwrap();
    }

    #[test]
    fn test_wait_wakes_on_publish() {
        let shared = Arc::new(Shared::default());
        let publisher = Arc::clone(&shared);
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            publisher.publish(|_| {});
        });
        let generation = shared.wait_for(
            &Wait::timeout(Duration::from_secs(5)),
            Duration::from_secs(1),
            Duration::ZERO,
            |p| (p.generation > 0).then_some(p.generation),
        );
        assert_eq!(generation.unwrap(), 1);
        worker.join().unwrap();
    }
}
