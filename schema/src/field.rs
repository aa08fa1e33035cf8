//! Field codecs, values and definitions.

use crate::FieldId;

/// A real-valued field stored as an integer count of `1 / scale` steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FixedPoint {
    pub min_q: i64,
    pub max_q: i64,
    /// Steps per unit; 100 gives centimetres for a field in metres.
    pub scale: u32,
}

impl FixedPoint {
    #[must_use]
    pub const fn new(min_q: i64, max_q: i64, scale: u32) -> Self {
        Self {
            min_q,
            max_q,
            scale,
        }
    }

    /// Quantizes `value`, rounding to the nearest step and clamping into range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn quantize(&self, value: f64) -> i64 {
        let q = (value * f64::from(self.scale)).round();
        if q.is_nan() {
            return self.min_q.max(0).min(self.max_q);
        }
        (q as i64).clamp(self.min_q, self.max_q)
    }

    /// Converts a quantized value back to a real number.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn dequantize(&self, q: i64) -> f64 {
        q as f64 / f64::from(self.scale)
    }
}

/// How one field is laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldCodec {
    Bool,

    /// `bits` wide, up to 64.
    UInt { bits: u8 },

    /// Two's complement range of a `bits` wide integer.
    SInt { bits: u8 },

    /// Signed integer from an inclusive range, packed into the fewest bits.
    Ranged { min: i64, max: i64 },

    FixedPoint(FixedPoint),
}

impl FieldCodec {
    #[must_use]
    pub const fn bool() -> Self {
        Self::Bool
    }

    #[must_use]
    pub const fn uint(bits: u8) -> Self {
        Self::UInt { bits }
    }

    #[must_use]
    pub const fn sint(bits: u8) -> Self {
        Self::SInt { bits }
    }

    #[must_use]
    pub const fn ranged(min: i64, max: i64) -> Self {
        Self::Ranged { min, max }
    }

    #[must_use]
    pub const fn fixed_point(min_q: i64, max_q: i64, scale: u32) -> Self {
        Self::FixedPoint(FixedPoint::new(min_q, max_q, scale))
    }

    /// Value a freshly created state holds for this field.
    ///
    /// Zero (or `false`), clamped into the codec's range.
    #[must_use]
    pub fn default_value(&self) -> FieldValue {
        match *self {
            Self::Bool => FieldValue::Bool(false),
            Self::UInt { .. } => FieldValue::UInt(0),
            Self::SInt { .. } => FieldValue::SInt(0),
            Self::Ranged { min, max } => FieldValue::SInt(0i64.clamp(min, max)),
            Self::FixedPoint(fp) => FieldValue::FixedPoint(0i64.clamp(fp.min_q, fp.max_q)),
        }
    }

    /// Returns `true` if `value` has the right variant and lies in range.
    #[must_use]
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (*self, *value) {
            (Self::Bool, FieldValue::Bool(_)) => true,
            (Self::UInt { bits }, FieldValue::UInt(v)) => bits >= 64 || v < (1u64 << bits),
            (Self::SInt { bits }, FieldValue::SInt(v)) => match bits {
                0 => false,
                64.. => true,
                _ => (-(1i64 << (bits - 1))..(1i64 << (bits - 1))).contains(&v),
            },
            (Self::Ranged { min, max }, FieldValue::SInt(v)) => v >= min && v <= max,
            (Self::FixedPoint(fp), FieldValue::FixedPoint(q)) => q >= fp.min_q && q <= fp.max_q,
            _ => false,
        }
    }
}

/// A field value as held by a state, event or command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldValue {
    Bool(bool),
    UInt(u64),
    SInt(i64),
    /// Quantized fixed-point value.
    FixedPoint(i64),
}

impl FieldValue {
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::UInt(v) => Some(v),
            _ => None,
        }
    }

    /// Signed view of `SInt` and quantized `FixedPoint` values.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::SInt(v) | Self::FixedPoint(v) => Some(v),
            _ => None,
        }
    }
}

/// One field of a [`TypeDef`](crate::TypeDef), in layout order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldDef {
    pub id: FieldId,
    pub codec: FieldCodec,
}

impl FieldDef {
    #[must_use]
    pub const fn new(id: FieldId, codec: FieldCodec) -> Self {
        Self { id, codec }
    }
}
