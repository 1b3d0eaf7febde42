//! Byte source trait and error types.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;

/// Error type for frame source operations.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Serial/communication I/O error. Retried by the poller.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The link is gone for good.
    #[error("source disconnected")]
    Disconnected,
}

/// Blocking, bidirectional byte link to the master board.
///
/// This trait abstracts the transport, allowing a serial port, a simulator
/// or a scripted test double to be used interchangeably. Only the poller
/// thread touches a source once the registry is running, so reads and
/// writes are never concurrent.
pub trait FrameSource: Send {
    /// Read whatever bytes are available into `buf`.
    ///
    /// Blocks for at most the source's read timeout; `Ok(0)` means nothing
    /// arrived in time.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SourceError>;

    /// Write all of `bytes`.
    fn send(&mut self, bytes: &[u8]) -> Result<(), SourceError>;

    /// Check if the source is connected/ready.
    fn is_connected(&self) -> bool;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        (**self).read(buf)
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), SourceError> {
        (**self).send(bytes)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

/// What a [`ScriptedSource`] does once its chunks run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhenExhausted {
    /// Report [`SourceError::Disconnected`].
    Disconnect,
    /// Sleep for the given time and return `Ok(0)`, like a read timeout.
    Idle(Duration),
}

#[derive(Debug, Default)]
struct Script {
    chunks: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
}

/// In-memory source replaying prepared chunks, one per read.
///
/// Clones share the same script, so a test can keep a handle to push more
/// chunks and inspect what was sent after moving the source into a poller.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    script: Arc<Mutex<Script>>,
    when_exhausted: WhenExhausted,
}

impl ScriptedSource {
    pub fn new(chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                chunks: chunks.into_iter().collect(),
                sent: Vec::new(),
            })),
            when_exhausted: WhenExhausted::Disconnect,
        }
    }

    #[must_use]
    pub fn when_exhausted(mut self, behaviour: WhenExhausted) -> Self {
        self.when_exhausted = behaviour;
        self
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue another chunk.
    pub fn push(&self, chunk: impl Into<Vec<u8>>) {
        self.script().chunks.push_back(chunk.into());
    }

    /// Chunks not yet read.
    pub fn pending(&self) -> usize {
        self.script().chunks.len()
    }

    /// Every write so far, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.script().sent.clone()
    }
}

impl FrameSource for ScriptedSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        let next = self.script().chunks.pop_front();
        let Some(mut chunk) = next else {
            return match self.when_exhausted {
                WhenExhausted::Disconnect => Err(SourceError::Disconnected),
                WhenExhausted::Idle(delay) => {
                    std::thread::sleep(delay);
                    Ok(0)
                }
            };
        };

        let len = chunk.len().min(buf.len());
        buf[..len].copy_from_slice(&chunk[..len]);
        if len < chunk.len() {
            let rest = chunk.split_off(len);
            self.script().chunks.push_front(rest);
        }
        Ok(len)
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), SourceError> {
        self.script().sent.push(bytes.to_vec());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.when_exhausted != WhenExhausted::Disconnect || self.pending() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_reads_one_chunk_each() {
        let mut source = ScriptedSource::new([b"abc".to_vec(), b"de".to_vec()]);
        let mut buf = [0u8; 16];
        assert_eq!(source.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(source.read(&mut buf).unwrap(), 2);
        assert!(matches!(source.read(&mut buf), Err(SourceError::Disconnected)));
        assert!(!source.is_connected());
    }

    #[test]
    fn test_scripted_splits_large_chunks() {
        let mut source = ScriptedSource::new([b"0123456789".to_vec()]);
        let mut buf = [0u8; 4];
        assert_eq!(source.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"0123");
        assert_eq!(source.pending(), 1);
        assert_eq!(source.read(&mut buf).unwrap(), 4);
        assert_eq!(source.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"89");
    }

    #[test]
    fn test_scripted_idle_and_shared_handle() {
        let handle = ScriptedSource::new(Vec::<Vec<u8>>::new())
            .when_exhausted(WhenExhausted::Idle(Duration::from_millis(1)));
        let mut source = handle.clone();
        let mut buf = [0u8; 8];
        assert_eq!(source.read(&mut buf).unwrap(), 0);
        assert!(source.is_connected());

        handle.push(b"hi".to_vec());
        assert_eq!(source.read(&mut buf).unwrap(), 2);

        source.send(b"R").unwrap();
        source.send(b"Q").unwrap();
        assert_eq!(handle.sent(), vec![b"R".to_vec(), b"Q".to_vec()]);
    }
}
