//! Codec errors.

use schema::{FieldId, TypeKind};
use thiserror::Error;

use crate::{EntityId, Tick};

pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while building, encoding, decoding or applying
/// packets and deltas.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("wire: {0}")]
    Wire(#[from] wire::DecodeError),

    #[error("wire encode: {0}")]
    WireEncode(#[from] wire::EncodeError),

    #[error("bitstream: {0}")]
    Bitstream(#[from] bitstream::BitError),

    /// The registry failed validation.
    #[error("invalid registry: {0}")]
    Schema(#[from] schema::SchemaError),

    #[error(transparent)]
    History(#[from] HistoryError),

    /// Sender and receiver registries differ.
    #[error("registry hash mismatch: expected 0x{expected:016X}, found 0x{found:016X}")]
    RegistryMismatch { expected: u64, found: u64 },

    /// A server packet arrived where a client packet was expected, or vice versa.
    #[error("packet travels in the wrong direction")]
    UnexpectedDirection,

    #[error("{actual} {kind} exceed the limit of {limit}")]
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },

    /// A state or event kind is not registered.
    #[error("kind {} is not registered", kind.get())]
    UnknownKind { kind: TypeKind },

    /// Commands were sent but the registry has no command layout.
    #[error("registry has no command layout")]
    MissingCommandLayout,

    /// A value does not fit its field codec.
    #[error("invalid value for field {} of type {}", field.get(), kind.get())]
    InvalidValue { kind: TypeKind, field: FieldId },

    /// A value vector does not match the layout's field count.
    #[error("type {} expects {expected} fields, got {actual}", kind.get())]
    FieldCountMismatch {
        kind: TypeKind,
        expected: usize,
        actual: usize,
    },

    /// Changed-field indices must be strictly ascending.
    #[error("field index {index} out of order for entity {entity}")]
    InvalidFieldOrder { entity: EntityId, index: usize },

    /// Header carried an event id outside the reliable range.
    #[error("invalid event id {raw}")]
    InvalidEventId { raw: u32 },

    /// Non-zero bits remain after the last item of a section.
    #[error("{remaining_bits} stray bits after {section:?} section")]
    TrailingSectionData {
        section: wire::SectionTag,
        remaining_bits: usize,
    },

    #[error("{section:?} section not allowed in this direction")]
    UnexpectedSection { section: wire::SectionTag },

    #[error("{section:?} section appears twice")]
    DuplicateSection { section: wire::SectionTag },

    /// The baseline a delta references is not available.
    #[error("baseline tick {tick} not found for entity {entity}")]
    BaselineNotFound { entity: EntityId, tick: Tick },

    /// The baseline state has a different kind than the delta.
    #[error("entity {entity} changed kind")]
    KindMismatch { entity: EntityId },
}

/// Which per-section count in [`CodecLimits`](crate::CodecLimits) was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LimitKind {
    #[error("events")]
    Events,
    #[error("removals")]
    Removals,
    #[error("deltas")]
    Deltas,
    #[error("commands")]
    Commands,
}

/// Rejected [`TickRing`](crate::TickRing) insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("tick {new_tick} stored after {last_tick}")]
    OutOfOrder { last_tick: Tick, new_tick: Tick },

    /// The invalid tick cannot key an entry.
    #[error("cannot store an entry at the invalid tick")]
    InvalidTick,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn messages() {
        let cases = [
            (
                CodecError::BaselineNotFound {
                    entity: EntityId::new(7),
                    tick: Tick::new(42),
                },
                "baseline tick 42 not found for entity #7",
            ),
            (
                CodecError::LimitsExceeded {
                    kind: LimitKind::Deltas,
                    limit: 4,
                    actual: 9,
                },
                "9 deltas exceed the limit of 4",
            ),
            (
                HistoryError::OutOfOrder {
                    last_tick: Tick::new(5),
                    new_tick: Tick::new(4),
                }
                .into(),
                "tick 4 stored after 5",
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn lower_layers_convert_with_source() {
        let wire: CodecError = wire::DecodeError::InvalidMagic { found: 0x1234 }.into();
        assert!(matches!(wire, CodecError::Wire(_)));
        assert!(wire.source().is_some());

        let bits: CodecError = bitstream::BitError::UnexpectedEof {
            requested: 1,
            available: 0,
        }
        .into();
        assert!(matches!(bits, CodecError::Bitstream(_)));
        assert!(CodecError::UnexpectedDirection.source().is_none());
    }
}
