//! Dynamic field values
//!
//! `Value` is what the accessor layer hands out and accepts. Primitive
//! variants are strictly typed: an `Int32` is never accepted for a `UInt32`
//! field. Pointer variants (`List`, `Object`) are live views into their
//! message.

use crate::error::{CodecError, CodecResult};
use crate::list::List;
use crate::object::Object;
use crate::pointer::WirePointer;
use schema::{FieldId, Type};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    /// Enum ordinal
    Enum(u16),
    Text(String),
    Data(Vec<u8>),
    List(List),
    /// Struct, group, or capability view
    Object(Object),
    /// Untyped pointer, exposed raw
    AnyPointer(WirePointer),
}

impl Value {
    /// Name of the variant, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Bool(_) => "bool",
            Value::Int8(_) => "int8",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::UInt8(_) => "uint8",
            Value::UInt16(_) => "uint16",
            Value::UInt32(_) => "uint32",
            Value::UInt64(_) => "uint64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::Enum(_) => "enum",
            Value::Text(_) => "text",
            Value::Data(_) => "data",
            Value::List(_) => "list",
            Value::Object(o) if o.is_capability() => "interface",
            Value::Object(_) => "struct",
            Value::AnyPointer(_) => "any_pointer",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Any signed or unsigned integer that fits in an `i64`
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int8(v) => Some(v as i64),
            Value::Int16(v) => Some(v as i64),
            Value::Int32(v) => Some(v as i64),
            Value::Int64(v) => Some(v),
            Value::UInt8(v) => Some(v as i64),
            Value::UInt16(v) => Some(v as i64),
            Value::UInt32(v) => Some(v as i64),
            Value::UInt64(v) => i64::try_from(v).ok(),
            Value::Enum(v) => Some(v as i64),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::UInt64(v) => Some(v),
            _ => self.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float32(v) => Some(v as f64),
            Value::Float64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            Value::Data(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<List> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

impl_from!(
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    String => Text,
    Vec<u8> => Data,
    List => List,
    Object => Object,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Data(v.to_vec())
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Void
    }
}

/// Active variant of a union
#[derive(Debug, Clone, PartialEq)]
pub struct UnionValue {
    pub tag: FieldId,
    pub name: String,
    /// `None` when the active variant is void
    pub value: Option<Value>,
}

/// Decode raw data-section bits (already XORed with the default)
pub(crate) fn decode_primitive(ty: &Type, raw: u64) -> Option<Value> {
    Some(match ty {
        Type::Void => Value::Void,
        Type::Bool => Value::Bool(raw & 1 == 1),
        Type::Int8 => Value::Int8(raw as u8 as i8),
        Type::Int16 => Value::Int16(raw as u16 as i16),
        Type::Int32 => Value::Int32(raw as u32 as i32),
        Type::Int64 => Value::Int64(raw as i64),
        Type::UInt8 => Value::UInt8(raw as u8),
        Type::UInt16 => Value::UInt16(raw as u16),
        Type::UInt32 => Value::UInt32(raw as u32),
        Type::UInt64 => Value::UInt64(raw),
        Type::Float32 => Value::Float32(f32::from_bits(raw as u32)),
        Type::Float64 => Value::Float64(f64::from_bits(raw)),
        Type::Enum(_) => Value::Enum(raw as u16),
        _ => return None,
    })
}

/// Raw bits for a primitive value, rejecting any variant that does not
/// exactly match the declared type
pub(crate) fn encode_primitive(field: &str, ty: &Type, value: &Value) -> CodecResult<u64> {
    Ok(match (ty, value) {
        (Type::Void, Value::Void) => 0,
        (Type::Bool, Value::Bool(v)) => *v as u64,
        (Type::Int8, Value::Int8(v)) => *v as u8 as u64,
        (Type::Int16, Value::Int16(v)) => *v as u16 as u64,
        (Type::Int32, Value::Int32(v)) => *v as u32 as u64,
        (Type::Int64, Value::Int64(v)) => *v as u64,
        (Type::UInt8, Value::UInt8(v)) => *v as u64,
        (Type::UInt16, Value::UInt16(v)) => *v as u64,
        (Type::UInt32, Value::UInt32(v)) => *v as u64,
        (Type::UInt64, Value::UInt64(v)) => *v,
        (Type::Float32, Value::Float32(v)) => v.to_bits() as u64,
        (Type::Float64, Value::Float64(v)) => v.to_bits(),
        (Type::Enum(_), Value::Enum(v)) => *v as u64,
        _ => return Err(CodecError::type_mismatch(field, ty, value.kind())),
    })
}
