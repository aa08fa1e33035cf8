//! Bit-level reader.

use crate::error::{BitError, BitResult};

/// Reads values packed MSB-first by [`BitWriter`](crate::BitWriter).
///
/// Every read is checked against the end of the slice, so malformed input
/// yields [`BitError::UnexpectedEof`] instead of a panic. The reader is
/// `Clone`; peeking reads from a copy.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Unread bits, trailing padding included.
    #[must_use]
    pub const fn bits_remaining(&self) -> usize {
        self.data.len().saturating_mul(8).saturating_sub(self.pos)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bits_remaining() == 0
    }

    /// Bits consumed so far.
    #[must_use]
    pub const fn bit_position(&self) -> usize {
        self.pos
    }

    pub fn read_bool(&mut self) -> BitResult<bool> {
        self.read_bits(1).map(|bit| bit == 1)
    }

    /// Reads `bits` (at most 64) as an unsigned integer.
    ///
    /// # Errors
    ///
    /// [`BitError::InvalidBitCount`] for more than 64 bits and
    /// [`BitError::UnexpectedEof`] if the slice is too short. A failed read
    /// leaves the position untouched.
    pub fn read_bits(&mut self, bits: u8) -> BitResult<u64> {
        if bits > 64 {
            return Err(BitError::InvalidBitCount { bits, max_bits: 64 });
        }
        let available = self.bits_remaining();
        if usize::from(bits) > available {
            return Err(BitError::UnexpectedEof {
                requested: usize::from(bits),
                available,
            });
        }

        let mut value = 0u64;
        let mut left = bits;
        while left > 0 {
            let used = (self.pos % 8) as u8;
            let take = left.min(8 - used);
            let byte = u64::from(self.data[self.pos / 8]);
            let chunk = (byte >> (8 - used - take)) & ((1 << take) - 1);
            value = (value << take) | chunk;
            self.pos += usize::from(take);
            left -= take;
        }
        Ok(value)
    }

    /// Reads `bits` without advancing.
    pub fn peek_bits(&self, bits: u8) -> BitResult<u64> {
        self.clone().read_bits(bits)
    }

    /// Returns `true` when less than a byte remains and all of it is zero.
    #[must_use]
    pub fn only_padding_left(&self) -> bool {
        let left = self.bits_remaining();
        left < 8 && (left == 0 || self.peek_bits(left as u8) == Ok(0))
    }
}
