//! Wire errors.

use thiserror::Error;

pub type WireResult<T> = Result<T, DecodeError>;

/// Why an inbound packet was rejected before any section reached the codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("{actual} bytes is shorter than the {required}-byte header")]
    PacketTooSmall { actual: usize, required: usize },

    /// Not a ticksync packet.
    #[error("bad magic 0x{found:08X}")]
    InvalidMagic { found: u32 },

    #[error("wire version {found} is not supported")]
    UnsupportedVersion { found: u16 },

    /// Unknown bits set, or both or neither direction flag.
    #[error("bad flags 0x{flags:04X}")]
    InvalidFlags { flags: u16 },

    #[error("header announces {header_len} payload bytes, packet has {actual_len}")]
    PayloadLengthMismatch { header_len: u32, actual_len: usize },

    #[error("section tag {tag} is not known")]
    UnknownSectionTag { tag: u8 },

    #[error("{kind} is {actual}, limit is {limit}")]
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },

    #[error(transparent)]
    SectionFraming(#[from] SectionFramingError),
}

/// Which [`Limits`](crate::Limits) bound was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LimitKind {
    #[error("packet size")]
    PacketBytes,
    #[error("section count")]
    SectionCount,
    #[error("section length")]
    SectionLength,
}

/// A section's length prefix or body is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SectionFramingError {
    #[error("section length prefix is not a valid varint")]
    InvalidVarint,
    #[error("section body truncated: {needed} bytes announced, {available} present")]
    Truncated { needed: usize, available: usize },
}

/// Failure while framing an outbound packet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("output buffer holds {available} bytes, {needed} required")]
    BufferTooSmall { needed: usize, available: usize },
    #[error("length {length} does not fit its prefix")]
    LengthOverflow { length: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_message_names_the_bound() {
        let err = DecodeError::LimitsExceeded {
            kind: LimitKind::SectionCount,
            limit: 4,
            actual: 10,
        };
        assert_eq!(err.to_string(), "section count is 10, limit is 4");
        assert_eq!(
            DecodeError::InvalidMagic { found: 0xDEAD_BEEF }.to_string(),
            "bad magic 0xDEADBEEF"
        );
    }

    #[test]
    fn framing_errors_pass_through() {
        let framing = SectionFramingError::Truncated {
            needed: 10,
            available: 4,
        };
        let err = DecodeError::from(framing.clone());
        assert_eq!(err.to_string(), framing.to_string());
        assert!(matches!(err, DecodeError::SectionFraming(_)));
    }
}
