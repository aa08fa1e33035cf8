//! Per-entity state deltas.

use bitstream::{BitReader, BitWriter, IntEncoder};
use schema::{FieldValue, Registry, TypeDef, TypeKind};

use crate::error::{CodecError, CodecResult};
use crate::field::{index_encoder, read_value, read_values, value_bits, write_value, write_values};
use crate::state::State;
use crate::{EntityId, Tick};

/// Bits spent on the entity id.
const ENTITY_BITS: u8 = 32;
/// Bits spent on a baseline tick reference.
const TICK_BITS: u8 = 32;

/// The difference between an entity's state at a baseline tick and its
/// current state.
///
/// A delta without a baseline is a full state and carries every field in
/// layout order. Otherwise `changes` lists `(layout index, value)` pairs in
/// strictly ascending index order; an empty list means "unchanged".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDelta {
    pub entity: EntityId,
    pub kind: TypeKind,
    pub baseline: Option<Tick>,
    pub changes: Vec<(usize, FieldValue)>,
    /// Set when the receiving peer controls this entity.
    pub controlled: bool,
}

impl StateDelta {
    /// Diffs `target` against an optional baseline state.
    ///
    /// A missing baseline, or one of a different kind or layout length,
    /// yields a full state.
    #[must_use]
    pub fn diff(entity: EntityId, baseline: Option<(Tick, &State)>, target: &State) -> Self {
        let Some((tick, base)) = baseline.filter(|(_, base)| {
            base.kind() == target.kind() && base.fields().len() == target.fields().len()
        }) else {
            return Self::full(entity, target);
        };

        let changes = target
            .fields()
            .iter()
            .zip(base.fields())
            .enumerate()
            .filter(|(_, (new, old))| new != old)
            .map(|(index, (new, _))| (index, *new))
            .collect();

        Self {
            entity,
            kind: target.kind(),
            baseline: Some(tick),
            changes,
            controlled: false,
        }
    }

    /// A delta carrying the whole state.
    #[must_use]
    pub fn full(entity: EntityId, state: &State) -> Self {
        Self {
            entity,
            kind: state.kind(),
            baseline: None,
            changes: state.fields().iter().copied().enumerate().collect(),
            controlled: false,
        }
    }

    /// Returns `true` if this delta carries the whole state.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.baseline.is_none()
    }

    /// Returns `true` for a baseline delta without changed fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.is_full() && self.changes.is_empty()
    }

    /// Exact number of bits [`encode`](Self::encode) writes for this delta.
    pub fn cost_bits(&self, registry: &Registry) -> CodecResult<usize> {
        let def = state_def(registry, self.kind)?;
        let header = ENTITY_BITS as usize
            + kind_encoder(registry).bits() as usize
            + 1
            + 1
            + if self.is_full() { 0 } else { TICK_BITS as usize };

        let body = if self.is_full() {
            self.full_values(def)?;
            def.fields.iter().map(|field| value_bits(field.codec)).sum()
        } else {
            let index_bits = index_encoder(def.fields.len()).bits() as usize;
            let mut bits = count_encoder(def).bits() as usize;
            for &(index, _) in &self.changes {
                let field = def.fields.get(index).ok_or(CodecError::InvalidFieldOrder {
                    entity: self.entity,
                    index,
                })?;
                bits += index_bits + value_bits(field.codec);
            }
            bits
        };
        Ok(header + body)
    }

    /// Reconstructs the target state from the exact baseline state.
    ///
    /// Full deltas ignore `baseline`.
    pub fn apply(&self, baseline: Option<&State>) -> CodecResult<State> {
        let Some(tick) = self.baseline else {
            let fields = self.changes.iter().map(|(_, value)| *value).collect();
            return Ok(State::from_values(self.kind, fields));
        };

        let base = baseline.ok_or(CodecError::BaselineNotFound {
            entity: self.entity,
            tick,
        })?;
        if base.kind() != self.kind {
            return Err(CodecError::KindMismatch {
                entity: self.entity,
            });
        }

        let mut state = base.clone();
        let fields = state.fields_mut();
        for &(index, value) in &self.changes {
            let slot = fields.get_mut(index).ok_or(CodecError::InvalidFieldOrder {
                entity: self.entity,
                index,
            })?;
            *slot = value;
        }
        Ok(state)
    }

    /// Writes this delta to `writer`.
    pub fn encode(&self, writer: &mut BitWriter, registry: &Registry) -> CodecResult<()> {
        let def = state_def(registry, self.kind)?;
        let kind_index = registry
            .state_index(self.kind)
            .ok_or(CodecError::UnknownKind { kind: self.kind })?;

        writer.write_bits(u64::from(self.entity.raw()), ENTITY_BITS)?;
        kind_encoder(registry).write(writer, kind_index as i64)?;
        writer.write_bool(self.controlled);
        writer.write_bool(self.baseline.is_some());

        match self.baseline {
            None => {
                let values = self.full_values(def)?;
                write_values(writer, def, &values)?;
            }
            Some(tick) => {
                writer.write_bits(u64::from(tick.raw()), TICK_BITS)?;
                self.check_order(def)?;
                count_encoder(def).write(writer, self.changes.len() as i64)?;
                let index_encoder = index_encoder(def.fields.len());
                for &(index, ref value) in &self.changes {
                    index_encoder.write(writer, index as i64)?;
                    write_value(writer, def.kind, &def.fields[index], value)?;
                }
            }
        }
        Ok(())
    }

    /// Reads a delta from `reader`.
    pub fn decode(reader: &mut BitReader<'_>, registry: &Registry) -> CodecResult<Self> {
        let entity = EntityId::new(reader.read_bits(ENTITY_BITS)? as u32);
        let kind_index = kind_encoder(registry).read(reader)? as usize;
        let def = registry
            .states
            .get(kind_index)
            .ok_or(bitstream::BitError::OutsideRange {
                value: kind_index as i128,
                min: 0,
                max: 0,
            })?;
        let controlled = reader.read_bool()?;
        let has_baseline = reader.read_bool()?;

        if !has_baseline {
            let changes = read_values(reader, def)?.into_iter().enumerate().collect();
            return Ok(Self {
                entity,
                kind: def.kind,
                baseline: None,
                changes,
                controlled,
            });
        }

        let tick = Tick::new(reader.read_bits(TICK_BITS)? as u32);
        let count = count_encoder(def).read(reader)? as usize;
        let index_encoder = index_encoder(def.fields.len());
        let mut changes = Vec::with_capacity(count);
        let mut previous: Option<usize> = None;
        for _ in 0..count {
            let index = index_encoder.read(reader)? as usize;
            if previous.is_some_and(|prev| index <= prev) || index >= def.fields.len() {
                return Err(CodecError::InvalidFieldOrder { entity, index });
            }
            previous = Some(index);
            changes.push((index, read_value(reader, def.kind, &def.fields[index])?));
        }

        Ok(Self {
            entity,
            kind: def.kind,
            baseline: Some(tick),
            changes,
            controlled,
        })
    }

    fn full_values(&self, def: &TypeDef) -> CodecResult<Vec<FieldValue>> {
        if self.changes.len() != def.fields.len() {
            return Err(CodecError::FieldCountMismatch {
                kind: def.kind,
                expected: def.fields.len(),
                actual: self.changes.len(),
            });
        }
        self.changes
            .iter()
            .enumerate()
            .map(|(position, &(index, value))| {
                if index == position {
                    Ok(value)
                } else {
                    Err(CodecError::InvalidFieldOrder {
                        entity: self.entity,
                        index,
                    })
                }
            })
            .collect()
    }

    fn check_order(&self, def: &TypeDef) -> CodecResult<()> {
        let mut previous: Option<usize> = None;
        for &(index, _) in &self.changes {
            if previous.is_some_and(|prev| index <= prev) || index >= def.fields.len() {
                return Err(CodecError::InvalidFieldOrder {
                    entity: self.entity,
                    index,
                });
            }
            previous = Some(index);
        }
        Ok(())
    }
}

fn state_def(registry: &Registry, kind: TypeKind) -> CodecResult<&TypeDef> {
    registry.state(kind).ok_or(CodecError::UnknownKind { kind })
}

fn kind_encoder(registry: &Registry) -> IntEncoder {
    index_encoder(registry.states.len())
}

fn count_encoder(def: &TypeDef) -> IntEncoder {
    IntEncoder::new(0, def.fields.len() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::{FieldCodec, FieldDef, FieldId};

    fn kind(v: u16) -> TypeKind {
        TypeKind::new(v).unwrap()
    }

    fn fid(v: u16) -> FieldId {
        FieldId::new(v).unwrap()
    }

    fn registry() -> Registry {
        Registry::builder()
            .state(
                TypeDef::new(kind(1))
                    .field(FieldDef::new(fid(1), FieldCodec::uint(8)))
                    .field(FieldDef::new(fid(2), FieldCodec::bool()))
                    .field(FieldDef::new(fid(3), FieldCodec::fixed_point(-1000, 1000, 10))),
            )
            .state(TypeDef::new(kind(2)).field(FieldDef::new(fid(1), FieldCodec::sint(16))))
            .build()
            .unwrap()
    }

    fn state(a: u64, b: bool, c: i64) -> State {
        State::from_values(
            kind(1),
            vec![
                FieldValue::UInt(a),
                FieldValue::Bool(b),
                FieldValue::FixedPoint(c),
            ],
        )
    }

    fn roundtrip(delta: &StateDelta, registry: &Registry) -> StateDelta {
        let mut writer = BitWriter::new();
        delta.encode(&mut writer, registry).unwrap();
        assert_eq!(writer.bits_written(), delta.cost_bits(registry).unwrap());
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        let decoded = StateDelta::decode(&mut reader, registry).unwrap();
        assert!(reader.only_padding_left());
        decoded
    }

    #[test]
    fn no_op_delta_is_empty() {
        let base = state(1, true, 5);
        let delta = StateDelta::diff(EntityId::new(1), Some((Tick::new(3), &base)), &base);
        assert!(delta.is_empty());
        assert!(!delta.is_full());
        assert_eq!(delta.apply(Some(&base)).unwrap(), base);
    }

    #[test]
    fn diff_lists_only_changed_fields() {
        let base = state(1, true, 5);
        let target = state(1, false, 5);
        let delta = StateDelta::diff(EntityId::new(4), Some((Tick::new(0), &base)), &target);
        assert_eq!(delta.changes, vec![(1, FieldValue::Bool(false))]);
        assert_eq!(delta.apply(Some(&base)).unwrap(), target);
    }

    #[test]
    fn diff_against_other_kind_is_full() {
        let base = State::from_values(kind(2), vec![FieldValue::SInt(3)]);
        let target = state(1, true, 5);
        let delta = StateDelta::diff(EntityId::new(4), Some((Tick::new(0), &base)), &target);
        assert!(delta.is_full());
    }

    #[test]
    fn delta_roundtrip_single_update() {
        let registry = registry();
        let base = state(10, false, -200);
        let target = state(11, false, -200);
        let mut delta = StateDelta::diff(EntityId::new(7), Some((Tick::new(2), &base)), &target);
        delta.controlled = true;

        let decoded = roundtrip(&delta, &registry);
        assert_eq!(decoded, delta);
        assert_eq!(decoded.apply(Some(&base)).unwrap(), target);
    }

    #[test]
    fn full_roundtrip() {
        let registry = registry();
        let target = State::from_values(kind(2), vec![FieldValue::SInt(-300)]);
        let delta = StateDelta::full(EntityId::new(9), &target);
        let decoded = roundtrip(&delta, &registry);
        assert!(decoded.is_full());
        assert_eq!(decoded.apply(None).unwrap(), target);
    }

    #[test]
    fn cost_grows_with_changed_fields_only() {
        let registry = registry();
        let base = state(1, true, 5);
        let empty = StateDelta::diff(EntityId::new(1), Some((Tick::new(0), &base)), &base);
        let one = StateDelta::diff(
            EntityId::new(1),
            Some((Tick::new(0), &base)),
            &state(2, true, 5),
        );
        let empty_bits = empty.cost_bits(&registry).unwrap();
        let one_bits = one.cost_bits(&registry).unwrap();
        // index (2 bits) + uint8 value
        assert_eq!(one_bits - empty_bits, 2 + 8);
        // entity + kind + flags + tick + count
        assert_eq!(empty_bits, 32 + 1 + 2 + 32 + 2);
    }

    #[test]
    fn apply_without_baseline_fails() {
        let base = state(1, true, 5);
        let delta = StateDelta::diff(
            EntityId::new(3),
            Some((Tick::new(8), &base)),
            &state(2, true, 5),
        );
        let err = delta.apply(None).unwrap_err();
        assert_eq!(
            err,
            CodecError::BaselineNotFound {
                entity: EntityId::new(3),
                tick: Tick::new(8)
            }
        );
    }

    #[test]
    fn apply_rejects_kind_mismatch() {
        let base = State::from_values(kind(2), vec![FieldValue::SInt(3)]);
        let delta = StateDelta {
            entity: EntityId::new(1),
            kind: kind(1),
            baseline: Some(Tick::new(0)),
            changes: vec![],
            controlled: false,
        };
        assert!(matches!(
            delta.apply(Some(&base)),
            Err(CodecError::KindMismatch { .. })
        ));
    }

    #[test]
    fn encode_rejects_unordered_changes() {
        let registry = registry();
        let delta = StateDelta {
            entity: EntityId::new(1),
            kind: kind(1),
            baseline: Some(Tick::new(0)),
            changes: vec![(1, FieldValue::Bool(true)), (0, FieldValue::UInt(1))],
            controlled: false,
        };
        let mut writer = BitWriter::new();
        assert!(matches!(
            delta.encode(&mut writer, &registry),
            Err(CodecError::InvalidFieldOrder { index: 0, .. })
        ));
    }

    #[test]
    fn decode_rejects_unordered_changes() {
        let registry = registry();
        let def = registry.state(kind(1)).unwrap();
        let mut writer = BitWriter::new();
        writer.write_bits(1, 32).unwrap();
        kind_encoder(&registry).write(&mut writer, 0).unwrap();
        writer.write_bool(false);
        writer.write_bool(true);
        writer.write_bits(0, 32).unwrap();
        count_encoder(def).write(&mut writer, 2).unwrap();
        let index = index_encoder(def.fields.len());
        index.write(&mut writer, 1).unwrap();
        writer.write_bool(true);
        index.write(&mut writer, 1).unwrap();
        writer.write_bool(true);
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        assert!(matches!(
            StateDelta::decode(&mut reader, &registry),
            Err(CodecError::InvalidFieldOrder { index: 1, .. })
        ));
    }

    #[test]
    fn encode_rejects_unknown_kind() {
        let registry = registry();
        let delta = StateDelta {
            entity: EntityId::new(1),
            kind: kind(9),
            baseline: None,
            changes: vec![],
            controlled: false,
        };
        let mut writer = BitWriter::new();
        assert!(matches!(
            delta.encode(&mut writer, &registry),
            Err(CodecError::UnknownKind { .. })
        ));
    }
}
