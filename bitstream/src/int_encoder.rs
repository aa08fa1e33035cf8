//! Bounded-range integer encoding.

use crate::error::{BitError, BitResult};
use crate::{BitReader, BitWriter};

/// Packs integers from an inclusive range `[min, max]` into the minimum
/// number of bits needed to represent `max - min`.
///
/// Every identifier and field value on the wire goes through an encoder of
/// this kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntEncoder {
    min: i64,
    max: i64,
    bits: u8,
}

impl IntEncoder {
    /// Creates an encoder for the inclusive range `[min, max]`.
    ///
    /// # Panics
    ///
    /// Panics if `min > max`.
    #[must_use]
    pub const fn new(min: i64, max: i64) -> Self {
        assert!(min <= max, "IntEncoder range is empty");
        let span = (max as i128 - min as i128) as u64;
        let bits = if span == 0 {
            0
        } else {
            (64 - span.leading_zeros()) as u8
        };
        Self { min, max, bits }
    }

    /// Creates an encoder covering every value of an unsigned `bits`-wide integer.
    #[must_use]
    pub const fn unsigned(bits: u8) -> Self {
        assert!(bits >= 1 && bits <= 63, "unsigned width must be 1..=63");
        Self::new(0, (1i64 << bits) - 1)
    }

    /// Creates an encoder covering every value of a signed `bits`-wide integer.
    #[must_use]
    pub const fn signed(bits: u8) -> Self {
        assert!(bits >= 1 && bits <= 64, "signed width must be 1..=64");
        if bits == 64 {
            return Self::new(i64::MIN, i64::MAX);
        }
        let half = 1i64 << (bits - 1);
        Self::new(-half, half - 1)
    }

    /// Inclusive lower bound.
    #[must_use]
    pub const fn min(&self) -> i64 {
        self.min
    }

    /// Inclusive upper bound.
    #[must_use]
    pub const fn max(&self) -> i64 {
        self.max
    }

    /// Number of bits every encoded value occupies.
    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.bits
    }

    /// Returns `true` if `value` lies inside the encoder's range.
    #[must_use]
    pub const fn contains(&self, value: i64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Encoded cost of `value` in bits.
    ///
    /// Fixed-width: the cost does not depend on the value, but the signature
    /// keeps the door open for variable-width encoders.
    #[must_use]
    pub const fn cost(&self, _value: i64) -> usize {
        self.bits as usize
    }

    /// Writes `value` as an offset from `min`.
    pub fn write(&self, writer: &mut BitWriter, value: i64) -> BitResult<()> {
        if !self.contains(value) {
            return Err(BitError::OutsideRange {
                value: i128::from(value),
                min: self.min,
                max: self.max,
            });
        }
        let offset = (i128::from(value) - i128::from(self.min)) as u64;
        writer.write_bits(offset, self.bits)
    }

    /// Reads a value, rejecting offsets that decode past `max`.
    pub fn read(&self, reader: &mut BitReader<'_>) -> BitResult<i64> {
        let offset = reader.read_bits(self.bits)?;
        self.decode_offset(offset)
    }

    /// Reads a value without advancing the reader.
    pub fn peek(&self, reader: &BitReader<'_>) -> BitResult<i64> {
        let offset = reader.peek_bits(self.bits)?;
        self.decode_offset(offset)
    }

    fn decode_offset(&self, offset: u64) -> BitResult<i64> {
        let value = i128::from(self.min) + i128::from(offset);
        if value > i128::from(self.max) {
            return Err(BitError::OutsideRange {
                value,
                min: self.min,
                max: self.max,
            });
        }
        // In range of [min, max] so it fits in i64.
        Ok(value as i64)
    }
}
