//! Incremental frame decoder.
//!
//! Bytes arrive in arbitrary chunks. The decoder reassembles newline
//! terminated lines in a fixed-capacity buffer, validates each one and merges
//! the valid frames into a persistent [`Snapshot`]. Bad frames are logged and
//! dropped; nothing is ever partially merged.

use std::collections::VecDeque;

use heapless::Vec;
use log::{debug, warn};
use panel_proto::{ChecksumTable, Frame, FrameError, Snapshot, MAX_FRAME_LENGTH};

/// Counters for frames seen by a decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub accepted: u64,
    pub dropped: u64,
    /// Bytes discarded before the start of a payload.
    pub noise_bytes: u64,
}

pub struct FrameDecoder {
    table: ChecksumTable,
    inbox: VecDeque<u8>,
    line: Vec<u8, MAX_FRAME_LENGTH>,
    /// Inside an overlong line; skip to the next newline.
    discarding: bool,
    accumulator: Snapshot,
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new(table: ChecksumTable) -> Self {
        Self {
            table,
            inbox: VecDeque::new(),
            line: Vec::new(),
            discarding: false,
            accumulator: Snapshot::new(),
            stats: DecoderStats::default(),
        }
    }

    /// Buffer raw bytes without processing them.
    pub fn push(&mut self, bytes: &[u8]) {
        self.inbox.extend(bytes);
    }

    /// Process buffered bytes up to the next completed line.
    ///
    /// Valid frames are merged into the accumulator and returned on their
    /// own, so that callers see every sample even when several frames
    /// arrive in one read. Returns `None` once no complete line is left.
    pub fn next_frame(&mut self) -> Option<Result<Snapshot, FrameError>> {
        while let Some(byte) = self.inbox.pop_front() {
            if byte == b'\n' {
                if self.discarding {
                    self.discarding = false;
                    self.stats.dropped += 1;
                    return Some(Err(FrameError::Overflow));
                }
                // A checksum byte of 0x0A directly follows the closing brace
                if self.line.last() != Some(&b'}') {
                    if let Some(result) = self.finish_line() {
                        return Some(result);
                    }
                    continue;
                }
            }

            if self.discarding {
                continue;
            }
            if self.line.push(byte).is_err() {
                warn!("line exceeds {MAX_FRAME_LENGTH} bytes, discarding");
                self.line.clear();
                self.discarding = true;
            }
        }
        None
    }

    /// Buffer `bytes` and merge every completed frame.
    ///
    /// Returns a copy of the accumulated snapshot when at least one frame
    /// was merged.
    pub fn feed(&mut self, bytes: &[u8]) -> Option<Snapshot> {
        self.push(bytes);
        let mut merged = false;
        while let Some(result) = self.next_frame() {
            merged |= result.is_ok();
        }
        merged.then(|| self.accumulator.clone())
    }

    fn finish_line(&mut self) -> Option<Result<Snapshot, FrameError>> {
        if matches!(self.line.as_slice(), [] | [b'\r']) {
            self.line.clear();
            return None;
        }

        let result = Frame::split(&self.line).and_then(|frame| {
            if !frame.noise.is_empty() {
                debug!("dropping {} noise bytes before frame", frame.noise.len());
                self.stats.noise_bytes += frame.noise.len() as u64;
            }
            frame.decode(&self.table)
        });
        self.line.clear();

        match &result {
            Ok(frame) => {
                self.stats.accepted += 1;
                self.accumulator.merge(frame.clone());
            }
            Err(e) => {
                self.stats.dropped += 1;
                warn!("dropping frame: {e}");
            }
        }
        Some(result)
    }

    /// Everything merged so far.
    pub fn snapshot(&self) -> &Snapshot {
        &self.accumulator
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    pub fn table(&self) -> &ChecksumTable {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use panel_proto::{encode_frame, Address, ComponentKind, FrameBuilder, RawValue};

    fn decoder() -> FrameDecoder {
        FrameDecoder::new(ChecksumTable::default())
    }

    fn frame(builder: FrameBuilder) -> std::vec::Vec<u8> {
        builder.build(&ChecksumTable::default())
    }

    fn pot(node: &str, id: &str) -> Address {
        Address::new(node, ComponentKind::Potentiometer, id)
    }

    #[test]
    fn test_single_frame() {
        let mut dec = decoder();
        let snap = dec
            .feed(&frame(FrameBuilder::new().master("Accept", 1.0)))
            .unwrap();
        assert_eq!(snap.master("Accept"), Some(&RawValue::Scalar(1.0)));
        assert_eq!(dec.stats().accepted, 1);
    }

    #[test]
    fn test_frame_split_across_reads() {
        let mut dec = decoder();
        let bytes = frame(FrameBuilder::new().component("1", ComponentKind::Potentiometer, "0", 300.0));
        let (a, b) = bytes.split_at(7);
        assert_eq!(dec.feed(a), None);
        let (b1, b2) = b.split_at(b.len() - 1);
        assert_eq!(dec.feed(b1), None);
        let snap = dec.feed(b2).unwrap();
        assert_eq!(snap.get(&pot("1", "0")), Some(&RawValue::Scalar(300.0)));
    }

    #[test]
    fn test_noise_between_valid_frames() {
        let mut dec = decoder();
        let mut bytes = frame(FrameBuilder::new().component("1", ComponentKind::Potentiometer, "x", 1.0));
        bytes.extend_from_slice(b"\xff\xfe\x00garbage\r\n\x80\x81\n");
        bytes.extend_from_slice(&frame(
            FrameBuilder::new().component("1", ComponentKind::Potentiometer, "y", 2.0),
        ));

        let mut merges = 0;
        dec.push(&bytes);
        while let Some(result) = dec.next_frame() {
            if result.is_ok() {
                merges += 1;
            }
        }
        assert_eq!(merges, 2);
        assert_eq!(dec.stats().accepted, 2);
        assert_eq!(dec.stats().dropped, 2);
        assert_eq!(dec.snapshot().get(&pot("1", "x")), Some(&RawValue::Scalar(1.0)));
        assert_eq!(dec.snapshot().get(&pot("1", "y")), Some(&RawValue::Scalar(2.0)));
    }

    #[test]
    fn test_noise_prefix_is_stripped() {
        let mut dec = decoder();
        let mut bytes = b"\x00\x13boot".to_vec();
        bytes.extend_from_slice(&frame(FrameBuilder::new().master("Decline", 1.0)));
        let snap = dec.feed(&bytes).unwrap();
        assert_eq!(snap.master("Decline"), Some(&RawValue::Scalar(1.0)));
        assert_eq!(dec.stats().noise_bytes, 6);
    }

    #[test]
    fn test_checksum_mismatch_is_not_merged() {
        let mut dec = decoder();
        let mut bytes = frame(FrameBuilder::new().master("Accept", 1.0));
        let crc = bytes.len() - 3;
        bytes[crc] = bytes[crc].wrapping_add(1);
        if bytes[crc] == b'\n' {
            bytes[crc] = bytes[crc].wrapping_add(1);
        }
        assert_eq!(dec.feed(&bytes), None);
        assert!(dec.snapshot().is_empty());
        assert_eq!(dec.stats().dropped, 1);
    }

    #[test]
    fn test_per_leaf_merge() {
        let mut dec = decoder();
        dec.feed(&frame(
            FrameBuilder::new()
                .component("1", ComponentKind::Potentiometer, "x", 1.0)
                .master("Accept", 0.0),
        ));
        let snap = dec
            .feed(&frame(FrameBuilder::new().component("1", ComponentKind::Potentiometer, "y", 2.0)))
            .unwrap();
        assert_eq!(snap.get(&pot("1", "x")), Some(&RawValue::Scalar(1.0)));
        assert_eq!(snap.get(&pot("1", "y")), Some(&RawValue::Scalar(2.0)));
        assert_eq!(snap.master("Accept"), Some(&RawValue::Scalar(0.0)));
    }

    #[test]
    fn test_next_frame_returns_each_frame() {
        let mut dec = decoder();
        let mut bytes = frame(FrameBuilder::new().master("Accept", 0.0));
        bytes.extend_from_slice(&frame(FrameBuilder::new().master("Accept", 1.0)));
        bytes.extend_from_slice(&frame(FrameBuilder::new().master("Accept", 0.0)));
        dec.push(&bytes);

        let levels: std::vec::Vec<f64> = std::iter::from_fn(|| dec.next_frame())
            .map(|r| r.unwrap().master("Accept").unwrap().level())
            .collect();
        assert_eq!(levels, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_overlong_line_discarded() {
        let mut dec = decoder();
        let mut bytes = vec![b'{'; MAX_FRAME_LENGTH + 10];
        bytes.push(b'\n');
        bytes.extend_from_slice(&frame(FrameBuilder::new().master("Accept", 1.0)));
        dec.push(&bytes);

        assert_eq!(dec.next_frame(), Some(Err(FrameError::Overflow)));
        assert!(dec.next_frame().unwrap().is_ok());
        assert_eq!(dec.next_frame(), None);
    }

    #[test]
    fn test_blank_lines_ignored() {
        let mut dec = decoder();
        dec.push(b"\r\n\n\r\n");
        assert_eq!(dec.next_frame(), None);
        assert_eq!(dec.stats(), DecoderStats::default());
    }

    #[test]
    fn test_newline_checksum_byte() {
        // Find a payload whose checksum is 0x0A
        let table = ChecksumTable::default();
        let payload = (0..100_000)
            .map(|n| std::format!("{{'master': {{'Accept': {n}}}}}"))
            .find(|p| table.checksum(p.as_bytes()) == b'\n')
            .unwrap();

        let mut dec = decoder();
        let snap = dec.feed(&encode_frame(payload.as_bytes(), &table)).unwrap();
        assert!(snap.master("Accept").is_some());
        assert_eq!(dec.stats().dropped, 0);
    }
}
