//! Schema lookup errors
//!
//! A reference to a node, field, or method that the compiled schema does not
//! contain is fatal at the point of lookup: there is no partial recovery.

use crate::node::NodeId;
use thiserror::Error;

/// Failures raised while resolving descriptors from a compiled [`Schema`](crate::Schema)
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
    /// Node id is absent from the compiled schema
    #[error("Unknown schema node {id:#018x}")]
    UnknownNode { id: NodeId },

    /// Struct node has no field with this name
    #[error("Struct {node} has no field named '{field}'")]
    UnknownField { node: String, field: String },

    /// Interface (including its superclasses) has no method with this name
    #[error("Interface {node} has no method named '{method}'")]
    UnknownMethod { node: String, method: String },

    /// Enum node has no enumerant with this name
    #[error("Enum {node} has no enumerant named '{enumerant}'")]
    UnknownEnumerant { node: String, enumerant: String },

    /// Node exists but is of a different kind than the caller needs
    #[error("Node {id:#018x} is a {actual}, expected a {expected}")]
    WrongNodeKind {
        id: NodeId,
        expected: &'static str,
        actual: &'static str,
    },

    /// Two nodes were registered under the same id
    #[error("Duplicate schema node {id:#018x} ({name})")]
    DuplicateNode { id: NodeId, name: String },

    /// Serialized schema could not be loaded
    #[error("Failed to load schema: {0}")]
    Load(String),
}

impl SchemaError {
    pub fn unknown_field(node: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            node: node.into(),
            field: field.into(),
        }
    }

    pub fn unknown_method(node: impl Into<String>, method: impl Into<String>) -> Self {
        Self::UnknownMethod {
            node: node.into(),
            method: method.into(),
        }
    }

    pub fn wrong_kind(id: NodeId, expected: &'static str, actual: &'static str) -> Self {
        Self::WrongNodeKind {
            id,
            expected,
            actual,
        }
    }
}

/// Result type for schema lookups
pub type SchemaResult<T> = std::result::Result<T, SchemaError>;
