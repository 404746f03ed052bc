//! Compiled schema nodes
//!
//! A node is the unit of the compiled schema tree. Struct nodes carry their
//! wire layout (data words, pointer count, union discriminant location) and
//! field list; interface nodes carry an ordered method list; enum nodes carry
//! their enumerant names in ordinal order.

use crate::types::{ConstValue, Type};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique 64-bit identifier of a schema node
pub type NodeId = u64;

/// Position of a field inside its struct's field list
///
/// Resolved once from a name and then used for every access so hot paths
/// never repeat the string lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId(pub u16);

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A node of the compiled schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub display_name: String,
    pub kind: NodeKind,
}

impl Node {
    pub fn as_struct(&self) -> Option<&StructNode> {
        match &self.kind {
            NodeKind::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_interface(&self) -> Option<&InterfaceNode> {
        match &self.kind {
            NodeKind::Interface(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumNode> {
        match &self.kind {
            NodeKind::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Struct(StructNode),
    Interface(InterfaceNode),
    Enum(EnumNode),
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Struct(_) => "struct",
            NodeKind::Interface(_) => "interface",
            NodeKind::Enum(_) => "enum",
        }
    }
}

/// Layout and fields of a struct (or group) node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructNode {
    /// Size of the data section in 64-bit words
    pub data_words: u16,
    /// Number of pointers in the pointer section
    pub pointer_count: u16,
    /// Number of fields that are members of this node's unnamed union
    pub discriminant_count: u16,
    /// Offset of the 16-bit discriminant, in multiples of 16 bits
    pub discriminant_offset: u32,
    /// Groups share their parent's storage and are never allocated on their own
    pub is_group: bool,
    pub fields: Vec<Field>,
}

impl StructNode {
    /// Look a field up by name
    pub fn field(&self, name: &str) -> Option<(FieldId, &Field)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name)
            .map(|(i, f)| (FieldId(i as u16), f))
    }

    pub fn field_by_id(&self, id: FieldId) -> Option<&Field> {
        self.fields.get(id.0 as usize)
    }

    pub fn has_union(&self) -> bool {
        self.discriminant_count > 0
    }

    /// Union member whose discriminant value is `discriminant`
    pub fn variant(&self, discriminant: u16) -> Option<(FieldId, &Field)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.discriminant == Some(discriminant))
            .map(|(i, f)| (FieldId(i as u16), f))
    }

    /// Fields that are members of this node's union, in declaration order
    pub fn union_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.discriminant.is_some())
    }

    /// Total size of one instance in words
    pub fn size_words(&self) -> u32 {
        self.data_words as u32 + self.pointer_count as u32
    }
}

/// A named member of a struct
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    /// Set when the field belongs to the enclosing node's union
    #[serde(default)]
    pub discriminant: Option<u16>,
    pub kind: FieldKind,
}

impl Field {
    /// Declared type of a slot field, `None` for groups
    pub fn slot_type(&self) -> Option<&Type> {
        match &self.kind {
            FieldKind::Slot { ty, .. } => Some(ty),
            FieldKind::Group { .. } => None,
        }
    }

    pub fn is_union_member(&self) -> bool {
        self.discriminant.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Storage-backed field
    ///
    /// `offset` is measured in units of the field's own width: bits for
    /// bool, bytes for 8-bit values, and so on. Pointer fields use the index
    /// into the pointer section.
    Slot {
        offset: u32,
        ty: Type,
        #[serde(default)]
        default: Option<ConstValue>,
    },
    /// Named group sharing the parent's storage
    Group { type_id: NodeId },
}

/// Ordered method list of an interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceNode {
    pub methods: Vec<Method>,
    #[serde(default)]
    pub superclasses: Vec<NodeId>,
}

impl InterfaceNode {
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// One callable method of an interface
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    /// Position in the declaring interface's method list
    pub code_order: u16,
    /// Interface that declares the method (differs from the call target
    /// when the method is inherited)
    pub interface_id: NodeId,
    pub param_struct: NodeId,
    pub result_struct: NodeId,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.code_order)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumNode {
    pub enumerants: Vec<String>,
}

impl EnumNode {
    pub fn ordinal(&self, name: &str) -> Option<u16> {
        self.enumerants
            .iter()
            .position(|e| e == name)
            .map(|i| i as u16)
    }

    pub fn name_of(&self, ordinal: u16) -> Option<&str> {
        self.enumerants.get(ordinal as usize).map(String::as_str)
    }
}
