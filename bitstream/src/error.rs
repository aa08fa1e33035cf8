//! Bitstream errors.

use thiserror::Error;

pub type BitResult<T> = Result<T, BitError>;

/// Failure while packing or unpacking bits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BitError {
    /// The buffer ended before the requested bits.
    #[error("need {requested} bits, buffer has {available} bits left")]
    UnexpectedEof { requested: usize, available: usize },

    /// A single read or write was asked for more than `max_bits`.
    #[error("bit count {bits} exceeds the limit of {max_bits}")]
    InvalidBitCount { bits: u8, max_bits: u8 },

    /// `value` has set bits above the requested width.
    #[error("{value} does not fit in {bits} bits")]
    ValueOutOfRange { value: u64, bits: u8 },

    /// Value lies outside the inclusive range of an [`IntEncoder`](crate::IntEncoder).
    #[error("{value} is outside the encoder range [{min}, {max}]")]
    OutsideRange { value: i128, min: i64, max: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_the_numbers() {
        let cases = [
            (
                BitError::UnexpectedEof {
                    requested: 8,
                    available: 3,
                },
                "need 8 bits, buffer has 3 bits left",
            ),
            (
                BitError::InvalidBitCount {
                    bits: 65,
                    max_bits: 64,
                },
                "bit count 65 exceeds the limit of 64",
            ),
            (
                BitError::ValueOutOfRange {
                    value: 256,
                    bits: 8,
                },
                "256 does not fit in 8 bits",
            ),
            (
                BitError::OutsideRange {
                    value: -5,
                    min: 0,
                    max: 10,
                },
                "-5 is outside the encoder range [0, 10]",
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.to_string(), expected);
        }
    }
}
