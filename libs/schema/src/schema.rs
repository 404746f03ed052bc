//! The compiled schema: an id-keyed, read-only node map
//!
//! Loaded once and shared behind an `Arc` by every message that references
//! it. Nothing here mutates after construction.

use crate::error::{SchemaError, SchemaResult};
use crate::node::{EnumNode, InterfaceNode, Method, Node, NodeId, StructNode};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Immutable compiled type-descriptor tree keyed by node id
#[derive(Debug, Clone, Default)]
pub struct Schema {
    nodes: HashMap<NodeId, Arc<Node>>,
}

/// Serialized form produced by the external schema compiler
#[derive(Debug, Serialize, Deserialize)]
struct SchemaDocument {
    nodes: Vec<Node>,
}

impl Schema {
    /// Build a schema from already-compiled nodes
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> SchemaResult<Self> {
        let mut map = HashMap::new();
        for node in nodes {
            if map.contains_key(&node.id) {
                return Err(SchemaError::DuplicateNode {
                    id: node.id,
                    name: node.display_name,
                });
            }
            map.insert(node.id, Arc::new(node));
        }
        debug!(node_count = map.len(), "Loaded compiled schema");
        Ok(Self { nodes: map })
    }

    /// Load a schema from its JSON document form (`{"nodes": [...]}`)
    pub fn from_json(json: &str) -> SchemaResult<Self> {
        let doc: SchemaDocument =
            serde_json::from_str(json).map_err(|e| SchemaError::Load(e.to_string()))?;
        Self::from_nodes(doc.nodes)
    }

    /// Serialize back into the JSON document form
    pub fn to_json(&self) -> SchemaResult<String> {
        let mut nodes: Vec<Node> = self.nodes.values().map(|n| (**n).clone()).collect();
        nodes.sort_by_key(|n| n.id);
        serde_json::to_string_pretty(&SchemaDocument { nodes })
            .map_err(|e| SchemaError::Load(e.to_string()))
    }

    pub fn node(&self, id: NodeId) -> SchemaResult<&Arc<Node>> {
        self.nodes.get(&id).ok_or(SchemaError::UnknownNode { id })
    }

    pub fn struct_node(&self, id: NodeId) -> SchemaResult<&StructNode> {
        let node = self.node(id)?;
        node.as_struct()
            .ok_or_else(|| SchemaError::wrong_kind(id, "struct", node.kind_name()))
    }

    pub fn interface_node(&self, id: NodeId) -> SchemaResult<&InterfaceNode> {
        let node = self.node(id)?;
        node.as_interface()
            .ok_or_else(|| SchemaError::wrong_kind(id, "interface", node.kind_name()))
    }

    pub fn enum_node(&self, id: NodeId) -> SchemaResult<&EnumNode> {
        let node = self.node(id)?;
        node.as_enum()
            .ok_or_else(|| SchemaError::wrong_kind(id, "enum", node.kind_name()))
    }

    /// Find a node by its display name
    pub fn find(&self, display_name: &str) -> Option<&Arc<Node>> {
        self.nodes.values().find(|n| n.display_name == display_name)
    }

    /// Resolve a method by name on an interface, then its superclasses depth-first
    pub fn method(&self, interface_id: NodeId, name: &str) -> SchemaResult<&Method> {
        let mut visited = HashSet::new();
        self.find_method(interface_id, name, &mut visited)?
            .ok_or_else(|| {
                let display = self
                    .nodes
                    .get(&interface_id)
                    .map(|n| n.display_name.clone())
                    .unwrap_or_default();
                SchemaError::unknown_method(display, name)
            })
    }

    fn find_method(
        &self,
        interface_id: NodeId,
        name: &str,
        visited: &mut HashSet<NodeId>,
    ) -> SchemaResult<Option<&Method>> {
        if !visited.insert(interface_id) {
            return Ok(None);
        }
        let iface = self.interface_node(interface_id)?;
        if let Some(method) = iface.method(name) {
            return Ok(Some(method));
        }
        for parent in &iface.superclasses {
            if let Some(method) = self.find_method(*parent, name, visited)? {
                return Ok(Some(method));
            }
        }
        Ok(None)
    }

    /// Whether interface `id` is `ancestor` or inherits from it
    pub fn extends(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut stack = vec![id];
        let mut visited = HashSet::new();
        while let Some(next) = stack.pop() {
            if next == ancestor {
                return true;
            }
            if !visited.insert(next) {
                continue;
            }
            if let Ok(iface) = self.interface_node(next) {
                stack.extend(iface.superclasses.iter().copied());
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.nodes.values()
    }
}
