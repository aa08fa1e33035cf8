//! Entity states and per-tick world snapshots.

use std::collections::BTreeMap;

use schema::{FieldValue, TypeDef, TypeKind};

use crate::{EntityId, Tick};

/// Field data of one entity, in the layout order of its [`TypeDef`].
///
/// Copies stored in history are never mutated; only the live copy owned by
/// the room changes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct State {
    kind: TypeKind,
    fields: Vec<FieldValue>,
}

impl State {
    /// Creates a state holding the layout's default values.
    #[must_use]
    pub fn new(def: &TypeDef) -> Self {
        Self {
            kind: def.kind,
            fields: def.default_values(),
        }
    }

    /// Creates a state from explicit values.
    #[must_use]
    pub fn from_values(kind: TypeKind, fields: Vec<FieldValue>) -> Self {
        Self { kind, fields }
    }

    #[must_use]
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldValue] {
        &self.fields
    }

    /// Value at layout position `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.fields.get(index)
    }

    /// Replaces the value at layout position `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is outside the layout.
    pub fn set(&mut self, index: usize, value: FieldValue) {
        self.fields[index] = value;
    }

    pub(crate) fn fields_mut(&mut self) -> &mut Vec<FieldValue> {
        &mut self.fields
    }
}

/// Every live entity's state at one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    tick: Tick,
    entities: BTreeMap<EntityId, State>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new(tick: Tick) -> Self {
        Self {
            tick,
            entities: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Records an entity's state, replacing any earlier record.
    pub fn insert(&mut self, entity: EntityId, state: State) {
        self.entities.insert(entity, state);
    }

    #[must_use]
    pub fn get(&self, entity: EntityId) -> Option<&State> {
        self.entities.get(&entity)
    }

    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    /// Entities in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &State)> {
        self.entities.iter().map(|(id, state)| (*id, state))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
