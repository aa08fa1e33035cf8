//! Bit-level encoding of field values.

use bitstream::{BitReader, BitWriter, IntEncoder};
use schema::{FieldCodec, FieldDef, FieldValue, TypeDef, TypeKind};

use crate::error::{CodecError, CodecResult};

/// Encoded width of every value of `codec`, in bits.
#[must_use]
pub fn value_bits(codec: FieldCodec) -> usize {
    match codec {
        FieldCodec::Bool => 1,
        FieldCodec::UInt { bits } => bits as usize,
        _ => ranged_encoder(codec).map_or(0, |encoder| encoder.bits() as usize),
    }
}

/// Encoded width of a whole value vector laid out by `def`.
#[must_use]
pub fn values_bits(def: &TypeDef) -> usize {
    def.fields.iter().map(|field| value_bits(field.codec)).sum()
}

pub(crate) fn write_value(
    writer: &mut BitWriter,
    kind: TypeKind,
    field: &FieldDef,
    value: &FieldValue,
) -> CodecResult<()> {
    if !field.codec.accepts(value) {
        return Err(CodecError::InvalidValue {
            kind,
            field: field.id,
        });
    }
    match (field.codec, *value) {
        (FieldCodec::Bool, FieldValue::Bool(v)) => writer.write_bool(v),
        (FieldCodec::UInt { bits }, FieldValue::UInt(v)) => writer.write_bits(v, bits)?,
        (codec, FieldValue::SInt(v) | FieldValue::FixedPoint(v)) => {
            let encoder = ranged_encoder(codec).ok_or(CodecError::InvalidValue {
                kind,
                field: field.id,
            })?;
            encoder.write(writer, v)?;
        }
        _ => {
            return Err(CodecError::InvalidValue {
                kind,
                field: field.id,
            })
        }
    }
    Ok(())
}

pub(crate) fn read_value(
    reader: &mut BitReader<'_>,
    kind: TypeKind,
    field: &FieldDef,
) -> CodecResult<FieldValue> {
    let value = match field.codec {
        FieldCodec::Bool => FieldValue::Bool(reader.read_bool()?),
        FieldCodec::UInt { bits } => FieldValue::UInt(reader.read_bits(bits)?),
        codec => {
            let encoder = ranged_encoder(codec).ok_or(CodecError::InvalidValue {
                kind,
                field: field.id,
            })?;
            let raw = encoder.read(reader)?;
            if matches!(codec, FieldCodec::FixedPoint(_)) {
                FieldValue::FixedPoint(raw)
            } else {
                FieldValue::SInt(raw)
            }
        }
    };
    Ok(value)
}

/// Writes every value of `values` in layout order.
pub(crate) fn write_values(
    writer: &mut BitWriter,
    def: &TypeDef,
    values: &[FieldValue],
) -> CodecResult<()> {
    if values.len() != def.fields.len() {
        return Err(CodecError::FieldCountMismatch {
            kind: def.kind,
            expected: def.fields.len(),
            actual: values.len(),
        });
    }
    for (field, value) in def.fields.iter().zip(values) {
        write_value(writer, def.kind, field, value)?;
    }
    Ok(())
}

pub(crate) fn read_values(reader: &mut BitReader<'_>, def: &TypeDef) -> CodecResult<Vec<FieldValue>> {
    def.fields
        .iter()
        .map(|field| read_value(reader, def.kind, field))
        .collect()
}

/// Encoder for a position in `0..len`; zero bits when `len <= 1`.
pub(crate) fn index_encoder(len: usize) -> IntEncoder {
    IntEncoder::new(0, len.saturating_sub(1) as i64)
}

fn ranged_encoder(codec: FieldCodec) -> Option<IntEncoder> {
    match codec {
        FieldCodec::SInt { bits } if (1..=64).contains(&bits) => Some(IntEncoder::signed(bits)),
        FieldCodec::Ranged { min, max } if min <= max => Some(IntEncoder::new(min, max)),
        FieldCodec::FixedPoint(fp) if fp.min_q <= fp.max_q => {
            Some(IntEncoder::new(fp.min_q, fp.max_q))
        }
        _ => None,
    }
}
