//! # Compiled Schema Descriptors
//!
//! Immutable type descriptors consumed by the codec and capability layers.
//! The schema compiler that produces them is an external collaborator: this
//! crate only models its output, loads it (JSON document form), and answers
//! lookups.
//!
//! ## What This Crate Contains
//! - [`Schema`]: id-keyed node map, shared read-only behind an `Arc`
//! - [`StructNode`]: data/pointer section sizes, fields, union discriminant
//! - [`InterfaceNode`]: ordered methods with parameter/result struct ids
//! - [`Type`] and [`ConstValue`]: field types and XOR-composed defaults
//! - Builders for describing nodes in code
//!
//! ## What This Crate Does NOT Contain
//! - Schema compilation or validation
//! - Any wire encoding (belongs in `codec`)

pub mod builder;
pub mod error;
pub mod node;
pub mod schema;
pub mod types;

pub use builder::{enum_node, InterfaceBuilder, SchemaBuilder, StructBuilder};
pub use error::{SchemaError, SchemaResult};
pub use node::{
    EnumNode, Field, FieldId, FieldKind, InterfaceNode, Method, Node, NodeId, NodeKind,
    StructNode,
};
pub use schema::Schema;
pub use types::{ConstValue, Type};
