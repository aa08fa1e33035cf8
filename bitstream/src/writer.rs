//! Bit-level writer.

use crate::error::{BitError, BitResult};

/// Packs values MSB-first into a byte buffer.
///
/// Whole bytes are flushed as soon as they fill up; at most seven bits wait
/// in the accumulator. [`finish`](Self::finish) pads the last byte with zeros.
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    acc: u64,
    acc_bits: u8,
}

impl BitWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer that can hold `bytes` bytes before reallocating.
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bytes),
            ..Self::default()
        }
    }

    /// Number of bits written so far, padding excluded.
    #[must_use]
    pub fn bits_written(&self) -> usize {
        self.bytes.len() * 8 + usize::from(self.acc_bits)
    }

    pub fn write_bool(&mut self, value: bool) {
        self.push(u64::from(value), 1);
    }

    /// Writes the low `bits` bits of `value`, most significant first.
    ///
    /// # Errors
    ///
    /// [`BitError::InvalidBitCount`] if `bits > 64`, and
    /// [`BitError::ValueOutOfRange`] if `value` does not fit in `bits`.
    pub fn write_bits(&mut self, value: u64, bits: u8) -> BitResult<()> {
        if bits > 64 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 64 });
        }
        if bits < 64 && value >> bits != 0 {
            return Err(BitError::ValueOutOfRange { value, bits });
        }

        let mut remaining = bits;
        while remaining > 0 {
            let take = remaining.min(8);
            remaining -= take;
            let chunk = (value >> remaining) & ((1u64 << take) - 1);
            self.push(chunk, take);
        }
        Ok(())
    }

    /// Pads the trailing partial byte and returns the buffer.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        if self.acc_bits > 0 {
            self.bytes.push((self.acc << (8 - self.acc_bits)) as u8);
        }
        self.bytes
    }

    // `bits` is at most 8, so the accumulator never holds more than 15 bits.
    fn push(&mut self, chunk: u64, bits: u8) {
        self.acc = (self.acc << bits) | chunk;
        self.acc_bits += bits;
        if self.acc_bits >= 8 {
            self.acc_bits -= 8;
            self.bytes.push((self.acc >> self.acc_bits) as u8);
            self.acc &= (1u64 << self.acc_bits) - 1;
        }
    }
}
