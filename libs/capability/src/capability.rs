//! Capability handles stored in message capability tables
//!
//! A table entry is one of three things: a running local actor, a promise
//! that will name one later, or a permanent failure. Dispatching a call
//! never blocks: local calls go straight into the actor's mailbox and
//! promised calls are queued on the promise.

use crate::call::QueuedCall;
use crate::error::{RpcError, RpcResult};
use crate::metrics::RpcMetrics;
use crate::promise::PromiseCell;
use crate::registry::ActorId;
use codec::{CapHandle, NodeId, Object};
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub enum Capability {
    /// Served by an actor in this process
    Local(LocalCapability),
    /// Named by a field of a result that has not arrived yet
    Promised(Arc<PromiseCell>),
    /// Every call fails with the stored error
    Broken(RpcError),
}

impl Capability {
    /// Live capability behind an interface-typed object
    pub fn of(object: &Object) -> RpcResult<Capability> {
        if !object.is_capability() {
            return Err(RpcError::not_a_capability(format!(
                "{} is a struct",
                object.node().display_name
            )));
        }
        let handle = object
            .capability_handle()
            .ok_or_else(|| RpcError::NullCapability {
                interface: object.node().display_name.clone(),
            })?;
        handle
            .as_any()
            .downcast_ref::<Capability>()
            .cloned()
            .ok_or_else(|| RpcError::not_a_capability(format!("foreign handle {:?}", handle)))
    }

    /// Short description used in logs and stop errors
    pub fn label(&self) -> String {
        match self {
            Capability::Local(local) => local.id.to_string(),
            Capability::Promised(cell) => format!("promise({})", cell.status()),
            Capability::Broken(_) => "broken".to_string(),
        }
    }

    pub(crate) fn dispatch(&self, call: QueuedCall) {
        match self {
            Capability::Local(local) => local.enqueue(call),
            Capability::Promised(cell) => cell.enqueue(call),
            Capability::Broken(error) => call.fail(error.clone()),
        }
    }
}

impl CapHandle for Capability {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn interface_id(&self) -> Option<NodeId> {
        match self {
            Capability::Local(local) => Some(local.interface_id),
            Capability::Promised(cell) => Some(cell.interface_id()),
            Capability::Broken(_) => None,
        }
    }
}

/// Sending half of a local actor's mailbox
#[derive(Debug, Clone)]
pub struct LocalCapability {
    id: ActorId,
    interface_id: NodeId,
    mailbox: mpsc::UnboundedSender<QueuedCall>,
    /// Calls sent but not yet taken by the actor
    depth: Arc<AtomicUsize>,
    warning_depth: usize,
    metrics: Arc<RpcMetrics>,
}

impl LocalCapability {
    pub(crate) fn new(
        id: ActorId,
        interface_id: NodeId,
        mailbox: mpsc::UnboundedSender<QueuedCall>,
        depth: Arc<AtomicUsize>,
        warning_depth: usize,
        metrics: Arc<RpcMetrics>,
    ) -> Self {
        Self {
            id,
            interface_id,
            mailbox,
            depth,
            warning_depth,
            metrics,
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn interface_id(&self) -> NodeId {
        self.interface_id
    }

    /// Whether the actor is still accepting calls
    pub fn is_alive(&self) -> bool {
        !self.mailbox.is_closed()
    }

    fn enqueue(&self, call: QueuedCall) {
        self.metrics.record_dispatch();
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        if depth == self.warning_depth + 1 {
            warn!(
                actor_id = %self.id,
                depth,
                threshold = self.warning_depth,
                "Capability mailbox is backing up"
            );
            self.metrics.record_mailbox_warning();
        }
        debug!(actor_id = %self.id, method = %call.method.name, hops = call.hops, "Dispatching call");
        if let Err(mpsc::error::SendError(call)) = self.mailbox.send(call) {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            call.fail(RpcError::stopped(self.id));
        }
    }
}
