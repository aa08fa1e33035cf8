//! Type definitions and the registry that validates them.

use std::collections::HashSet;

use crate::error::{SchemaError, SchemaResult};
use crate::{FieldCodec, FieldDef, FieldId, FieldValue, FixedPoint, TypeKind};

/// The layout of one state, event or command type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeDef {
    pub kind: TypeKind,
    pub fields: Vec<FieldDef>,
}

impl TypeDef {
    /// Creates a new type with no fields.
    #[must_use]
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            fields: Vec::new(),
        }
    }

    /// Creates a type with the provided fields.
    #[must_use]
    pub fn with_fields(kind: TypeKind, fields: Vec<FieldDef>) -> Self {
        Self { kind, fields }
    }

    /// Adds a field to the type.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Position of `id` in layout order.
    #[must_use]
    pub fn field_index(&self, id: FieldId) -> Option<usize> {
        self.fields.iter().position(|field| field.id == id)
    }

    /// Default values for every field, in layout order.
    #[must_use]
    pub fn default_values(&self) -> Vec<FieldValue> {
        self.fields
            .iter()
            .map(|field| field.codec.default_value())
            .collect()
    }

    /// Returns `true` if `values` matches this layout field by field.
    #[must_use]
    pub fn accepts(&self, values: &[FieldValue]) -> bool {
        values.len() == self.fields.len()
            && self
                .fields
                .iter()
                .zip(values)
                .all(|(field, value)| field.codec.accepts(value))
    }

    fn validate(&self) -> SchemaResult<()> {
        if self.fields.len() > Registry::MAX_FIELDS {
            return Err(SchemaError::TooManyFields {
                kind: self.kind,
                count: self.fields.len(),
                max: Registry::MAX_FIELDS,
            });
        }
        let mut field_ids = HashSet::new();
        for field in &self.fields {
            if !field_ids.insert(field.id) {
                return Err(SchemaError::DuplicateFieldId {
                    kind: self.kind,
                    field: field.id,
                });
            }
            validate_field(self.kind, field)?;
        }
        Ok(())
    }
}

/// Maps type kinds to layouts for every state, event and command the
/// application replicates.
///
/// Both ends of a connection must build identical registries; the
/// [`registry_hash`](crate::registry_hash) travels in every packet header.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Registry {
    pub states: Vec<TypeDef>,
    pub events: Vec<TypeDef>,
    pub command: Option<TypeDef>,
}

impl Registry {
    /// Most fields a single type may declare.
    pub const MAX_FIELDS: usize = 256;

    /// Creates a registry after validation.
    pub fn new(
        states: Vec<TypeDef>,
        events: Vec<TypeDef>,
        command: Option<TypeDef>,
    ) -> SchemaResult<Self> {
        let registry = Self {
            states,
            events,
            command,
        };
        registry.validate()?;
        Ok(registry)
    }

    /// Creates a registry builder.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Validates registry invariants.
    pub fn validate(&self) -> SchemaResult<()> {
        let mut kinds = HashSet::new();
        for def in &self.states {
            if !kinds.insert(def.kind) {
                return Err(SchemaError::DuplicateStateKind { kind: def.kind });
            }
            def.validate()?;
        }

        let mut kinds = HashSet::new();
        for def in &self.events {
            if !kinds.insert(def.kind) {
                return Err(SchemaError::DuplicateEventKind { kind: def.kind });
            }
            def.validate()?;
        }

        if let Some(command) = &self.command {
            command.validate()?;
        }
        Ok(())
    }

    /// Layout of a state kind.
    #[must_use]
    pub fn state(&self, kind: TypeKind) -> Option<&TypeDef> {
        self.states.iter().find(|def| def.kind == kind)
    }

    /// Position of a state kind in registration order.
    #[must_use]
    pub fn state_index(&self, kind: TypeKind) -> Option<usize> {
        self.states.iter().position(|def| def.kind == kind)
    }

    /// Layout of an event kind.
    #[must_use]
    pub fn event(&self, kind: TypeKind) -> Option<&TypeDef> {
        self.events.iter().find(|def| def.kind == kind)
    }

    /// Position of an event kind in registration order.
    #[must_use]
    pub fn event_index(&self, kind: TypeKind) -> Option<usize> {
        self.events.iter().position(|def| def.kind == kind)
    }

    /// Layout of per-tick commands, if the application sends any.
    #[must_use]
    pub fn command(&self) -> Option<&TypeDef> {
        self.command.as_ref()
    }
}

/// Builder for [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    states: Vec<TypeDef>,
    events: Vec<TypeDef>,
    command: Option<TypeDef>,
}

impl RegistryBuilder {
    /// Adds a state layout.
    #[must_use]
    pub fn state(mut self, def: TypeDef) -> Self {
        self.states.push(def);
        self
    }

    /// Adds an event layout.
    #[must_use]
    pub fn event(mut self, def: TypeDef) -> Self {
        self.events.push(def);
        self
    }

    /// Sets the command layout.
    #[must_use]
    pub fn command(mut self, def: TypeDef) -> Self {
        self.command = Some(def);
        self
    }

    /// Builds the registry after validation.
    pub fn build(self) -> SchemaResult<Registry> {
        Registry::new(self.states, self.events, self.command)
    }
}

fn validate_field(kind: TypeKind, field: &FieldDef) -> SchemaResult<()> {
    match field.codec {
        FieldCodec::UInt { bits } | FieldCodec::SInt { bits } => {
            if bits == 0 || bits > 64 {
                return Err(SchemaError::InvalidBitWidth {
                    kind,
                    field: field.id,
                    bits,
                });
            }
        }
        FieldCodec::Ranged { min, max } => {
            if min > max {
                return Err(SchemaError::InvalidRange { min, max });
            }
        }
        FieldCodec::FixedPoint(fp) => {
            validate_fixed_point(fp)?;
        }
        FieldCodec::Bool => {}
    }
    Ok(())
}

fn validate_fixed_point(fp: FixedPoint) -> SchemaResult<()> {
    if fp.scale == 0 {
        return Err(SchemaError::InvalidFixedPointScale { scale: fp.scale });
    }
    if fp.min_q > fp.max_q {
        return Err(SchemaError::InvalidFixedPointRange {
            min_q: fp.min_q,
            max_q: fp.max_q,
        });
    }
    Ok(())
}
