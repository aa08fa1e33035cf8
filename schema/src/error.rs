//! Registry validation errors.

use thiserror::Error;

use crate::{FieldId, TypeKind};

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur when building or validating a registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Two state layouts share a kind.
    #[error("duplicate state kind {}", kind.get())]
    DuplicateStateKind { kind: TypeKind },

    /// Two event layouts share a kind.
    #[error("duplicate event kind {}", kind.get())]
    DuplicateEventKind { kind: TypeKind },

    /// Duplicate field ID within a type.
    #[error("duplicate field {} in type {}", field.get(), kind.get())]
    DuplicateFieldId { kind: TypeKind, field: FieldId },

    /// Invalid bit width for fixed-width integers.
    #[error("invalid bit width {bits} for field {} in type {}", field.get(), kind.get())]
    InvalidBitWidth {
        kind: TypeKind,
        field: FieldId,
        bits: u8,
    },

    /// Fixed-point scale must be non-zero.
    #[error("fixed-point scale must be non-zero")]
    InvalidFixedPointScale { scale: u32 },

    /// Fixed-point min/max range is invalid.
    #[error("invalid fixed-point range [{min_q}, {max_q}]")]
    InvalidFixedPointRange { min_q: i64, max_q: i64 },

    /// Ranged integer min/max range is invalid.
    #[error("invalid integer range [{min}, {max}]")]
    InvalidRange { min: i64, max: i64 },

    /// A type declares more fields than a delta can address.
    #[error("type {} declares {count} fields, at most {max}", kind.get())]
    TooManyFields {
        kind: TypeKind,
        count: usize,
        max: usize,
    },
}
