//! CRC-8 checksum for inbound frames.
//!
//! The board appends one raw checksum byte after the closing `}` of every
//! frame. The host validates it by running the payload *and* the claimed
//! checksum byte through the table-driven remainder recurrence: a valid frame
//! leaves a zero remainder. The polynomial is configurable; the default key
//! (`0x07`) makes the table equivalent to CRC-8/SMBUS.

/// Polynomial key used by the panel firmware.
pub const DEFAULT_KEY: u8 = 7;

/// Precomputed 256-entry CRC-8 lookup table for one polynomial key.
#[derive(Clone, PartialEq, Eq)]
pub struct ChecksumTable {
    key: u8,
    table: [u8; 256],
}

impl ChecksumTable {
    /// Build the lookup table for `key`.
    ///
    /// Each entry is the byte value shifted left eight times, XOR-ing in the
    /// key whenever the high bit was set before the shift.
    #[must_use]
    pub const fn new(key: u8) -> Self {
        let mut table = [0u8; 256];
        let mut dividend = 0;
        while dividend < 256 {
            let mut cur = dividend as u8;
            let mut bit = 0;
            while bit < 8 {
                cur = if cur & 0x80 != 0 {
                    (cur << 1) ^ key
                } else {
                    cur << 1
                };
                bit += 1;
            }
            table[dividend] = cur;
            dividend += 1;
        }
        Self { key, table }
    }

    /// The polynomial key this table was built from.
    #[inline]
    #[must_use]
    pub const fn key(&self) -> u8 {
        self.key
    }

    /// Raw table entry for `index`.
    #[inline]
    #[must_use]
    pub const fn entry(&self, index: u8) -> u8 {
        self.table[index as usize]
    }

    /// Feed one byte into a running remainder.
    #[inline]
    #[must_use]
    pub const fn step(&self, remainder: u8, byte: u8) -> u8 {
        self.table[(byte ^ remainder) as usize]
    }

    /// Checksum of `data`: the remainder after feeding every byte.
    #[inline]
    #[must_use]
    pub fn checksum(&self, data: &[u8]) -> u8 {
        data.iter().fold(0u8, |rem, &b| self.step(rem, b))
    }

    /// Validate `data` against the claimed checksum byte.
    ///
    /// The claimed `crc` is appended to the stream; the frame is valid iff the
    /// final remainder is zero. The firmware verifies the same way, so this
    /// must stay a byte-by-byte recurrence.
    #[inline]
    #[must_use]
    pub fn check(&self, data: &[u8], crc: u8) -> bool {
        self.step(self.checksum(data), crc) == 0
    }
}

impl Default for ChecksumTable {
    fn default() -> Self {
        Self::new(DEFAULT_KEY)
    }
}

impl core::fmt::Debug for ChecksumTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChecksumTable")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
