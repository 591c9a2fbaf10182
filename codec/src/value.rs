//! Typed column values and rows.

use bitstream::Value32;
use schema::ValueType;

/// A decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    String(String),
    /// Elements of an array column, all of the column's type.
    Array(Vec<Value>),
}

impl Value {
    /// Builds a scalar of `value_type` from a zero-extended bit pattern.
    ///
    /// Bits above the type's width are dropped. Strings come back empty.
    #[must_use]
    pub fn from_raw(value_type: ValueType, raw: u64) -> Self {
        match value_type {
            ValueType::I8 => Self::I8(raw as u8 as i8),
            ValueType::U8 => Self::U8(raw as u8),
            ValueType::I16 => Self::I16(raw as u16 as i16),
            ValueType::U16 => Self::U16(raw as u16),
            ValueType::I32 => Self::I32(raw as u32 as i32),
            ValueType::U32 => Self::U32(raw as u32),
            ValueType::I64 => Self::I64(raw as i64),
            ValueType::U64 => Self::U64(raw),
            ValueType::F32 => Self::F32(f32::from_bits(raw as u32)),
            ValueType::String => Self::String(String::new()),
        }
    }

    /// Reinterprets a 4-byte box as `value_type`.
    #[must_use]
    pub fn from_fixed(value_type: ValueType, value: Value32) -> Self {
        match value_type {
            ValueType::F32 => Self::F32(value.as_f32()),
            other => Self::from_raw(other, u64::from(value.as_u32())),
        }
    }

    /// The zero value of `value_type`.
    #[must_use]
    pub fn zero(value_type: ValueType) -> Self {
        Self::from_raw(value_type, 0)
    }

    /// Bit pattern of a scalar, zero-extended from the variant's width.
    #[must_use]
    pub fn raw_bits(&self) -> Option<u64> {
        Some(match self {
            Self::I8(v) => u64::from(*v as u8),
            Self::U8(v) => u64::from(*v),
            Self::I16(v) => u64::from(*v as u16),
            Self::U16(v) => u64::from(*v),
            Self::I32(v) => u64::from(*v as u32),
            Self::U32(v) => u64::from(*v),
            Self::I64(v) => *v as u64,
            Self::U64(v) => *v,
            Self::F32(v) => u64::from(v.to_bits()),
            Self::String(_) | Self::Array(_) => return None,
        })
    }

    /// Numeric value of an integer scalar, sign-extended for signed types.
    #[must_use]
    pub fn signed_bits(&self) -> Option<i64> {
        Some(match self {
            Self::I8(v) => i64::from(*v),
            Self::I16(v) => i64::from(*v),
            Self::I32(v) => i64::from(*v),
            Self::I64(v) => *v,
            other => other.raw_bits()? as i64,
        })
    }

    /// The scalar's bit pattern in a 4-byte box, if it fits one.
    #[must_use]
    pub fn to_fixed(&self) -> Option<Value32> {
        Some(match self {
            Self::I8(v) => Value32::from_i8(*v),
            Self::U8(v) => Value32::from_u8(*v),
            Self::I16(v) => Value32::from_i16(*v),
            Self::U16(v) => Value32::from_u16(*v),
            Self::I32(v) => Value32::from_i32(*v),
            Self::U32(v) => Value32::from_u32(*v),
            Self::F32(v) => Value32::from_f32(*v),
            _ => return None,
        })
    }

    /// Reads an id or relation value.
    #[must_use]
    pub fn as_key(&self) -> Option<u32> {
        match self {
            Self::U32(v) => Some(*v),
            Self::I32(v) => Some(*v as u32),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// `true` if the scalar variant matches `value_type`.
    #[must_use]
    pub const fn is_type(&self, value_type: ValueType) -> bool {
        matches!(
            (self, value_type),
            (Self::I8(_), ValueType::I8)
                | (Self::U8(_), ValueType::U8)
                | (Self::I16(_), ValueType::I16)
                | (Self::U16(_), ValueType::U16)
                | (Self::I32(_), ValueType::I32)
                | (Self::U32(_), ValueType::U32)
                | (Self::I64(_), ValueType::I64)
                | (Self::U64(_), ValueType::U64)
                | (Self::F32(_), ValueType::F32)
                | (Self::String(_), ValueType::String)
        )
    }

    /// Short variant name for error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::I8(_) => "i8",
            Self::U8(_) => "u8",
            Self::I16(_) => "i16",
            Self::U16(_) => "u16",
            Self::I32(_) => "i32",
            Self::U32(_) => "u32",
            Self::I64(_) => "i64",
            Self::U64(_) => "u64",
            Self::F32(_) => "f32",
            Self::String(_) => "string",
            Self::Array(_) => "array",
        }
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::U32(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::I32(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::F32(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// One materialized record: its id and one value per schema column.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: u32,
    pub values: Vec<Value>,
}

impl Row {
    #[must_use]
    pub const fn new(id: u32, values: Vec<Value>) -> Self {
        Self { id, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_roundtrip_by_type() {
        assert_eq!(Value::from_raw(ValueType::I8, 0xFF), Value::I8(-1));
        assert_eq!(Value::from_raw(ValueType::U16, 0x1_2345), Value::U16(0x2345));
        assert_eq!(Value::I16(-2).raw_bits(), Some(0xFFFE));
        assert_eq!(Value::I32(-1).raw_bits(), Some(0xFFFF_FFFF));
        assert_eq!(Value::I64(-1).raw_bits(), Some(u64::MAX));
        assert_eq!(Value::from("x").raw_bits(), None);
    }

    #[test]
    fn signed_bits_extend() {
        assert_eq!(Value::I8(-3).signed_bits(), Some(-3));
        assert_eq!(Value::U8(200).signed_bits(), Some(200));
    }

    #[test]
    fn fixed_reinterprets() {
        let fixed = Value::F32(1.5).to_fixed().unwrap();
        assert_eq!(Value::from_fixed(ValueType::F32, fixed), Value::F32(1.5));
        assert_eq!(Value::U64(1).to_fixed(), None);
        let small = Value::I16(-1).to_fixed().unwrap();
        assert_eq!(small.as_u32(), 0xFFFF);
        assert_eq!(Value::from_fixed(ValueType::I16, small), Value::I16(-1));
    }

    #[test]
    fn keys_and_types() {
        assert_eq!(Value::I32(-1).as_key(), Some(u32::MAX));
        assert_eq!(Value::U16(3).as_key(), None);
        assert!(Value::U32(3).is_type(ValueType::U32));
        assert!(!Value::U32(3).is_type(ValueType::I32));
        assert_eq!(Value::Array(vec![]).type_name(), "array");
    }
}
