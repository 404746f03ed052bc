//! Field types and declared default values

use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a struct slot, list element, or method parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Void,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    #[serde(rename = "uint8")]
    UInt8,
    #[serde(rename = "uint16")]
    UInt16,
    #[serde(rename = "uint32")]
    UInt32,
    #[serde(rename = "uint64")]
    UInt64,
    Float32,
    Float64,
    Text,
    Data,
    List(Box<Type>),
    Enum(NodeId),
    Struct(NodeId),
    Interface(NodeId),
    AnyPointer,
}

impl Type {
    /// Width in bits of the value inside a data section, `None` for pointer types
    pub fn data_bits(&self) -> Option<u32> {
        match self {
            Type::Void => Some(0),
            Type::Bool => Some(1),
            Type::Int8 | Type::UInt8 => Some(8),
            Type::Int16 | Type::UInt16 | Type::Enum(_) => Some(16),
            Type::Int32 | Type::UInt32 | Type::Float32 => Some(32),
            Type::Int64 | Type::UInt64 | Type::Float64 => Some(64),
            Type::Text
            | Type::Data
            | Type::List(_)
            | Type::Struct(_)
            | Type::Interface(_)
            | Type::AnyPointer => None,
        }
    }

    /// Whether values of this type live in the pointer section
    pub fn is_pointer(&self) -> bool {
        self.data_bits().is_none()
    }

    pub fn list_of(element: Type) -> Self {
        Type::List(Box::new(element))
    }

    /// Short name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Type::Void => "void",
            Type::Bool => "bool",
            Type::Int8 => "int8",
            Type::Int16 => "int16",
            Type::Int32 => "int32",
            Type::Int64 => "int64",
            Type::UInt8 => "uint8",
            Type::UInt16 => "uint16",
            Type::UInt32 => "uint32",
            Type::UInt64 => "uint64",
            Type::Float32 => "float32",
            Type::Float64 => "float64",
            Type::Text => "text",
            Type::Data => "data",
            Type::List(_) => "list",
            Type::Enum(_) => "enum",
            Type::Struct(_) => "struct",
            Type::Interface(_) => "interface",
            Type::AnyPointer => "any_pointer",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::List(inner) => write!(f, "list({})", inner),
            Type::Enum(id) | Type::Struct(id) | Type::Interface(id) => {
                write!(f, "{}({:#x})", self.name(), id)
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// Default value declared for a field
///
/// Primitive defaults are stored as the raw bit pattern that gets XORed into
/// the data section, so a field whose stored bits are all zero reads back as
/// its declared default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstValue {
    Void,
    Bool(bool),
    Int(i64),
    #[serde(rename = "uint")]
    UInt(u64),
    Float32(f32),
    Float64(f64),
    Enum(u16),
    Text(String),
    Data(Vec<u8>),
}

impl ConstValue {
    /// Raw bits of the default, truncated to `bits`, for XOR composition
    pub fn xor_mask(&self, bits: u32) -> u64 {
        let raw = match self {
            ConstValue::Void | ConstValue::Text(_) | ConstValue::Data(_) => 0,
            ConstValue::Bool(b) => *b as u64,
            ConstValue::Int(v) => *v as u64,
            ConstValue::UInt(v) => *v,
            ConstValue::Float32(v) => v.to_bits() as u64,
            ConstValue::Float64(v) => v.to_bits(),
            ConstValue::Enum(v) => *v as u64,
        };
        if bits >= 64 {
            raw
        } else {
            raw & ((1u64 << bits) - 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_types_have_no_data_width() {
        assert_eq!(Type::Text.data_bits(), None);
        assert!(Type::list_of(Type::UInt8).is_pointer());
        assert!(!Type::Enum(7).is_pointer());
        assert_eq!(Type::Float32.data_bits(), Some(32));
    }

    #[test]
    fn xor_mask_truncates_to_width() {
        assert_eq!(ConstValue::Int(-1).xor_mask(16), 0xFFFF);
        assert_eq!(ConstValue::Bool(true).xor_mask(1), 1);
        assert_eq!(ConstValue::Float64(1.5).xor_mask(64), 1.5f64.to_bits());
        assert_eq!(ConstValue::Text("x".into()).xor_mask(64), 0);
    }

    #[test]
    fn type_serde_uses_snake_case() {
        let ty = Type::list_of(Type::UInt64);
        let json = serde_json::to_string(&ty).unwrap();
        assert_eq!(json, r#"{"list":"uint64"}"#);
        let back: Type = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ty);
    }
}
