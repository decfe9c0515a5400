//! Scalar values stored in record fields and tail elements.

use crate::layout::{CScalar, ScalarKind};

/// A single field or tail element value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Bool(bool),
    Float(f32),
    Double(f64),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U8(x) => Some(*x as u64),
            Value::U16(x) => Some(*x as u64),
            Value::U32(x) => Some(*x as u64),
            Value::U64(x) => Some(*x),
            Value::I8(_) | Value::I16(_) | Value::I32(_) | Value::I64(_) => {
                self.as_i64().and_then(|v| u64::try_from(v).ok())
            }
            Value::Bool(b) => Some(*b as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I8(x) => Some(*x as i64),
            Value::I16(x) => Some(*x as i64),
            Value::I32(x) => Some(*x as i64),
            Value::I64(x) => Some(*x),
            Value::U8(x) => Some(*x as i64),
            Value::U16(x) => Some(*x as i64),
            Value::U32(x) => Some(*x as i64),
            Value::U64(x) => i64::try_from(*x).ok(),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x as f64),
            Value::Double(x) => Some(*x),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    /// Raw bits for a C scalar of the given layout, or `None` if the value does not fit.
    pub fn to_bits(&self, scalar: CScalar) -> Option<u64> {
        let bits = scalar.size * 8;
        match scalar.kind {
            ScalarKind::Signed => {
                let v = self.as_i64()?;
                let min = i64::MIN >> (64 - bits);
                let max = i64::MAX >> (64 - bits);
                (min..=max).contains(&v).then(|| (v as u64) & mask(bits))
            }
            ScalarKind::Unsigned | ScalarKind::Pointer => {
                let v = self.as_u64()?;
                (v & !mask(bits) == 0).then_some(v)
            }
            ScalarKind::Bool => match self.as_u64()? {
                v @ (0 | 1) => Some(v),
                _ => None,
            },
            ScalarKind::Float => match scalar.size {
                4 => Some((self.as_f64()? as f32).to_bits() as u64),
                8 => Some(self.as_f64()?.to_bits()),
                _ => None,
            },
        }
    }

    /// Inverse of [`Value::to_bits`].
    pub fn from_bits(bits: u64, scalar: CScalar) -> Value {
        match (scalar.kind, scalar.size) {
            (ScalarKind::Signed, 1) => Value::I8(bits as u8 as i8),
            (ScalarKind::Signed, 2) => Value::I16(bits as u16 as i16),
            (ScalarKind::Signed, 4) => Value::I32(bits as u32 as i32),
            (ScalarKind::Signed, _) => Value::I64(bits as i64),
            (ScalarKind::Bool, _) => Value::Bool(bits != 0),
            (ScalarKind::Float, 4) => Value::Float(f32::from_bits(bits as u32)),
            (ScalarKind::Float, _) => Value::Double(f64::from_bits(bits)),
            (_, 1) => Value::U8(bits as u8),
            (_, 2) => Value::U16(bits as u16),
            (_, 4) => Value::U32(bits as u32),
            _ => Value::U64(bits),
        }
    }
}

fn mask(bits: usize) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const I8: CScalar = CScalar { kind: ScalarKind::Signed, size: 1, align: 1 };
    const U16: CScalar = CScalar { kind: ScalarKind::Unsigned, size: 2, align: 2 };

    #[test]
    fn range_checks() {
        assert_eq!(Value::I32(-1).to_bits(I8), Some(0xff));
        assert_eq!(Value::I32(-129).to_bits(I8), None);
        assert_eq!(Value::U32(65535).to_bits(U16), Some(65535));
        assert_eq!(Value::U32(65536).to_bits(U16), None);
        assert_eq!(Value::I8(-1).to_bits(U16), None);
    }

    #[test]
    fn bits_back_to_value() {
        assert_eq!(Value::from_bits(0xff, I8), Value::I8(-1));
        let f = CScalar { kind: ScalarKind::Float, size: 4, align: 4 };
        let bits = Value::Double(1.5).to_bits(f).unwrap();
        assert_eq!(Value::from_bits(bits, f), Value::Float(1.5));
    }
}
