//! Programmatic construction of compiled nodes
//!
//! The schema compiler is an external collaborator; these builders exist for
//! embedders that describe types in code and for tests. They do not validate
//! layouts beyond computing the union discriminant count.

use crate::error::SchemaResult;
use crate::node::{
    EnumNode, Field, FieldKind, InterfaceNode, Method, Node, NodeId, NodeKind, StructNode,
};
use crate::schema::Schema;
use crate::types::{ConstValue, Type};

/// Builder for a struct or group node
#[derive(Debug, Clone)]
pub struct StructBuilder {
    id: NodeId,
    name: String,
    node: StructNode,
}

impl StructBuilder {
    pub fn new(id: NodeId, name: impl Into<String>, data_words: u16, pointer_count: u16) -> Self {
        Self {
            id,
            name: name.into(),
            node: StructNode {
                data_words,
                pointer_count,
                discriminant_count: 0,
                discriminant_offset: 0,
                is_group: false,
                fields: Vec::new(),
            },
        }
    }

    /// Plain slot field; `offset` is in units of the type's width
    pub fn field(self, name: impl Into<String>, ty: Type, offset: u32) -> Self {
        self.push(name.into(), None, ty, offset, None)
    }

    pub fn field_with_default(
        self,
        name: impl Into<String>,
        ty: Type,
        offset: u32,
        default: ConstValue,
    ) -> Self {
        self.push(name.into(), None, ty, offset, Some(default))
    }

    /// Slot field that is a member of this node's unnamed union
    pub fn union_field(
        self,
        name: impl Into<String>,
        ty: Type,
        offset: u32,
        discriminant: u16,
    ) -> Self {
        self.push(name.into(), Some(discriminant), ty, offset, None)
    }

    /// Named group sharing this node's storage
    pub fn group(mut self, name: impl Into<String>, type_id: NodeId) -> Self {
        self.node.fields.push(Field {
            name: name.into(),
            discriminant: None,
            kind: FieldKind::Group { type_id },
        });
        self
    }

    /// Named group that is itself a member of this node's union
    pub fn union_group(mut self, name: impl Into<String>, type_id: NodeId, discriminant: u16) -> Self {
        self.node.fields.push(Field {
            name: name.into(),
            discriminant: Some(discriminant),
            kind: FieldKind::Group { type_id },
        });
        self.node.discriminant_count += 1;
        self
    }

    /// Location of the union discriminant, in multiples of 16 bits
    pub fn discriminant_at(mut self, offset: u32) -> Self {
        self.node.discriminant_offset = offset;
        self
    }

    pub fn as_group(mut self) -> Self {
        self.node.is_group = true;
        self
    }

    fn push(
        mut self,
        name: String,
        discriminant: Option<u16>,
        ty: Type,
        offset: u32,
        default: Option<ConstValue>,
    ) -> Self {
        if discriminant.is_some() {
            self.node.discriminant_count += 1;
        }
        self.node.fields.push(Field {
            name,
            discriminant,
            kind: FieldKind::Slot { offset, ty, default },
        });
        self
    }

    pub fn build(self) -> Node {
        Node {
            id: self.id,
            display_name: self.name,
            kind: NodeKind::Struct(self.node),
        }
    }
}

/// Builder for an interface node
#[derive(Debug, Clone)]
pub struct InterfaceBuilder {
    id: NodeId,
    name: String,
    node: InterfaceNode,
}

impl InterfaceBuilder {
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            node: InterfaceNode {
                methods: Vec::new(),
                superclasses: Vec::new(),
            },
        }
    }

    pub fn method(mut self, name: impl Into<String>, param_struct: NodeId, result_struct: NodeId) -> Self {
        let code_order = self.node.methods.len() as u16;
        self.node.methods.push(Method {
            name: name.into(),
            code_order,
            interface_id: self.id,
            param_struct,
            result_struct,
        });
        self
    }

    pub fn extends(mut self, superclass: NodeId) -> Self {
        self.node.superclasses.push(superclass);
        self
    }

    pub fn build(self) -> Node {
        Node {
            id: self.id,
            display_name: self.name,
            kind: NodeKind::Interface(self.node),
        }
    }
}

pub fn enum_node<S: Into<String>>(
    id: NodeId,
    name: impl Into<String>,
    enumerants: impl IntoIterator<Item = S>,
) -> Node {
    Node {
        id,
        display_name: name.into(),
        kind: NodeKind::Enum(EnumNode {
            enumerants: enumerants.into_iter().map(Into::into).collect(),
        }),
    }
}

/// Collects nodes into a [`Schema`]
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    nodes: Vec<Node>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn build(self) -> SchemaResult<Schema> {
        Schema::from_nodes(self.nodes)
    }
}
