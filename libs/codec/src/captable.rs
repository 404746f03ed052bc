//! Per-message capability side table
//!
//! Capability pointers on the wire hold a small integer; the live handle it
//! names lives here. Runtime handles are never serialized into segment bytes.

use schema::NodeId;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A live, callable handle stored in a message's capability table
///
/// The codec treats handles as opaque; the capability layer downcasts them
/// through [`CapHandle::as_any`].
pub trait CapHandle: Send + Sync + fmt::Debug + 'static {
    fn as_any(&self) -> &dyn Any;

    /// Interface the handle was created for, when known
    fn interface_id(&self) -> Option<NodeId> {
        None
    }
}

#[derive(Debug, Default)]
pub struct CapTable {
    entries: Vec<Arc<dyn CapHandle>>,
}

impl CapTable {
    /// Add a handle, reusing the existing index if the same handle is present
    pub fn insert(&mut self, handle: Arc<dyn CapHandle>) -> u32 {
        if let Some(i) = self.entries.iter().position(|h| Arc::ptr_eq(h, &handle)) {
            return i as u32;
        }
        self.entries.push(handle);
        (self.entries.len() - 1) as u32
    }

    pub fn get(&self, index: u32) -> Option<Arc<dyn CapHandle>> {
        self.entries.get(index as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
