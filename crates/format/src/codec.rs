//! Per-field record encoding for compressed vectors.
//!
//! Every prototype field is transported through a [`FieldCodec`]: a
//! deterministic encoder/decoder between a column of record values and a
//! byte substream. The provided implementation is fixed-width little-endian
//! packing; integer widths derive from the declared `[min, max]` range
//! (rounded up to whole bytes) and constant fields occupy no bytes at all.

use e57_core::{Error, ErrorKind, Result};
use std::ops::Range;

/// The wire-relevant shape of one prototype field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    /// Integer with inclusive bounds.
    Integer {
        /// Smallest representable value.
        min: i64,
        /// Largest representable value.
        max: i64,
    },
    /// Scaled integer; the raw integer is what travels on the wire.
    ScaledInteger {
        /// Smallest representable raw value.
        min: i64,
        /// Largest representable raw value.
        max: i64,
    },
    /// IEEE float, single or double precision.
    Float {
        /// True for double precision.
        double: bool,
    },
}

impl FieldKind {
    /// Whether a buffer of the given value type can feed or receive this
    /// field.
    pub fn accepts(&self, values: &RecordValues) -> bool {
        match self {
            FieldKind::Integer { .. } | FieldKind::ScaledInteger { .. } => {
                matches!(values, RecordValues::I64(_))
            }
            FieldKind::Float { double: true } => matches!(values, RecordValues::F64(_)),
            FieldKind::Float { double: false } => {
                matches!(values, RecordValues::F32(_) | RecordValues::F64(_))
            }
        }
    }
}

/// One field of a flattened compressed-vector prototype.
#[derive(Debug, Clone, PartialEq)]
pub struct PrototypeField {
    /// Slash-delimited path of the field below the prototype root.
    pub path: String,
    /// Wire shape of the field.
    pub kind: FieldKind,
}

/// A column of record values for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValues {
    /// 64-bit signed integers (Integer and ScaledInteger raw values).
    I64(Vec<i64>),
    /// Double-precision floats.
    F64(Vec<f64>),
    /// Single-precision floats.
    F32(Vec<f32>),
}

impl RecordValues {
    /// Number of values in the column.
    pub fn len(&self) -> usize {
        match self {
            RecordValues::I64(v) => v.len(),
            RecordValues::F64(v) => v.len(),
            RecordValues::F32(v) => v.len(),
        }
    }

    /// True when the column holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all values, keeping the column's type.
    pub fn clear(&mut self) {
        match self {
            RecordValues::I64(v) => v.clear(),
            RecordValues::F64(v) => v.clear(),
            RecordValues::F32(v) => v.clear(),
        }
    }
}

/// Deterministic per-field encoder/decoder.
pub trait FieldCodec {
    /// Bytes one record of this field occupies on the wire (0 for constant
    /// fields).
    fn byte_width(&self) -> usize;

    /// Encode `values[range]` onto the end of `out`.
    fn encode(&self, values: &RecordValues, range: Range<usize>, out: &mut Vec<u8>) -> Result<()>;

    /// Decode exactly `count` records from the front of `bytes`, appending
    /// them to `out`. `bytes` must hold at least `count * byte_width()`.
    fn decode(&self, bytes: &[u8], count: usize, out: &mut RecordValues) -> Result<()>;
}

/// Fixed-width little-endian codec.
#[derive(Debug, Clone, Copy)]
pub struct FixedWidthCodec {
    kind: FieldKind,
    width: usize,
}

impl FixedWidthCodec {
    /// Codec for the given field shape.
    pub fn for_field(kind: FieldKind) -> Self {
        let width = match kind {
            FieldKind::Integer { min, max } | FieldKind::ScaledInteger { min, max } => {
                int_width(min, max)
            }
            FieldKind::Float { double: true } => 8,
            FieldKind::Float { double: false } => 4,
        };
        FixedWidthCodec { kind, width }
    }

    fn int_bounds(&self) -> (i64, i64) {
        match self.kind {
            FieldKind::Integer { min, max } | FieldKind::ScaledInteger { min, max } => (min, max),
            FieldKind::Float { .. } => unreachable!("float codec has no integer bounds"),
        }
    }
}

/// Bytes needed to span `[min, max]` as an unsigned offset from `min`.
fn int_width(min: i64, max: i64) -> usize {
    let range = max.wrapping_sub(min) as u64;
    if range == 0 {
        0
    } else {
        let bits = 64 - range.leading_zeros() as usize;
        bits.div_ceil(8)
    }
}

impl FieldCodec for FixedWidthCodec {
    fn byte_width(&self) -> usize {
        self.width
    }

    fn encode(&self, values: &RecordValues, range: Range<usize>, out: &mut Vec<u8>) -> Result<()> {
        if range.end > values.len() {
            return Err(Error::internal(format!(
                "encode range {range:?} past column of {}",
                values.len()
            )));
        }
        match (self.kind, values) {
            (FieldKind::Integer { min, max }, RecordValues::I64(vals))
            | (FieldKind::ScaledInteger { min, max }, RecordValues::I64(vals)) => {
                for &v in &vals[range] {
                    if v < min || v > max {
                        return Err(Error::new(
                            ErrorKind::ValueOutOfBounds,
                            format!("value {v} outside [{min}, {max}]"),
                        ));
                    }
                    let raw = v.wrapping_sub(min) as u64;
                    out.extend_from_slice(&raw.to_le_bytes()[..self.width]);
                }
                Ok(())
            }
            (FieldKind::Float { double: true }, RecordValues::F64(vals)) => {
                for &v in &vals[range] {
                    out.extend_from_slice(&v.to_le_bytes());
                }
                Ok(())
            }
            (FieldKind::Float { double: false }, RecordValues::F32(vals)) => {
                for &v in &vals[range] {
                    out.extend_from_slice(&v.to_le_bytes());
                }
                Ok(())
            }
            (FieldKind::Float { double: false }, RecordValues::F64(vals)) => {
                for &v in &vals[range] {
                    out.extend_from_slice(&(v as f32).to_le_bytes());
                }
                Ok(())
            }
            _ => Err(Error::internal("buffer type does not match field kind")),
        }
    }

    fn decode(&self, bytes: &[u8], count: usize, out: &mut RecordValues) -> Result<()> {
        if bytes.len() < count * self.width {
            return Err(Error::internal(format!(
                "decode of {count} records needs {} bytes, have {}",
                count * self.width,
                bytes.len()
            )));
        }
        match (self.kind, out) {
            (FieldKind::Integer { .. }, RecordValues::I64(vals))
            | (FieldKind::ScaledInteger { .. }, RecordValues::I64(vals)) => {
                let (min, _) = self.int_bounds();
                if self.width == 0 {
                    vals.extend(std::iter::repeat(min).take(count));
                    return Ok(());
                }
                for chunk in bytes[..count * self.width].chunks_exact(self.width) {
                    let mut raw = [0u8; 8];
                    raw[..self.width].copy_from_slice(chunk);
                    vals.push(min.wrapping_add(u64::from_le_bytes(raw) as i64));
                }
                Ok(())
            }
            (FieldKind::Float { double: true }, RecordValues::F64(vals)) => {
                for chunk in bytes[..count * 8].chunks_exact(8) {
                    vals.push(f64::from_le_bytes(chunk.try_into().unwrap()));
                }
                Ok(())
            }
            (FieldKind::Float { double: false }, RecordValues::F32(vals)) => {
                for chunk in bytes[..count * 4].chunks_exact(4) {
                    vals.push(f32::from_le_bytes(chunk.try_into().unwrap()));
                }
                Ok(())
            }
            (FieldKind::Float { double: false }, RecordValues::F64(vals)) => {
                for chunk in bytes[..count * 4].chunks_exact(4) {
                    vals.push(f32::from_le_bytes(chunk.try_into().unwrap()) as f64);
                }
                Ok(())
            }
            _ => Err(Error::internal("buffer type does not match field kind")),
        }
    }
}
