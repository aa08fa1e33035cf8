//! Runtime state, event and command layouts for ticksync.
//!
//! This crate describes the data the application replicates:
//! - Field codecs (bool, fixed-width integers, bounded ranges, fixed-point)
//! - Type definitions for entity states, events and commands
//! - The [`Registry`] that maps a [`TypeKind`] to its layout
//! - Deterministic registry hashing
//!
//! # Design Principles
//!
//! - **Runtime-first** - Layouts are built at runtime, no derive macros.
//! - **Explicit layouts** - No reflection on arbitrary Rust types.
//! - **Deterministic hashing** - The registry hash is stable given the same definition.

use std::num::NonZeroU16;

mod error;
mod field;
mod hash;
mod registry;

pub use error::{SchemaError, SchemaResult};
pub use field::{FieldCodec, FieldDef, FieldValue, FixedPoint};
pub use hash::registry_hash;
pub use registry::{Registry, RegistryBuilder, TypeDef};

/// Identifies a state, event or command layout within a [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeKind(NonZeroU16);

impl TypeKind {
    /// Creates a type kind; zero is reserved.
    #[must_use]
    pub const fn new(value: u16) -> Option<Self> {
        match NonZeroU16::new(value) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0.get()
    }
}

/// Identifies a field within a [`TypeDef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldId(NonZeroU16);

impl FieldId {
    /// Creates a field id; zero is reserved.
    #[must_use]
    pub const fn new(value: u16) -> Option<Self> {
        match NonZeroU16::new(value) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn ids_reject_zero() {
        assert!(TypeKind::new(0).is_none());
        assert!(FieldId::new(0).is_none());
        assert_eq!(TypeKind::new(7).unwrap().get(), 7);
        assert_eq!(FieldId::new(65_535).unwrap().get(), 65_535);
    }

    #[test]
    fn ids_are_niche_optimized() {
        assert_eq!(size_of::<TypeKind>(), 2);
        assert_eq!(size_of::<Option<FieldId>>(), 2);
    }
}
