//! Promises and pipelining
//!
//! A [`Promise`] is the caller's view of one sent call. A [`PromiseCell`] is
//! the capability-table side of pipelining: an interface field of a promised
//! result, usable as a call target before the result exists.
//!
//! ```text
//! Unresolved ──► Resolving ──► Resolved(capability)
//!      │              │
//!      └──────────────┴──────► Failed(reason)
//! ```
//!
//! Calls against an unresolved or resolving cell queue in issue order.
//! Resolution replays the queue in batches under `Resolving` and only
//! enters `Resolved` once a batch comes back empty, so a call issued
//! mid-replay still lands behind the calls issued before it.

use crate::call::{CallState, QueuedCall};
use crate::capability::Capability;
use crate::error::{RpcError, RpcResult};
use crate::metrics::RpcMetrics;
use codec::{CodecError, Message, NodeId, Object, Schema};
use parking_lot::Mutex;
use schema::{Method, SchemaError, Type};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Where a promise cell is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseStatus {
    Unresolved,
    Resolving,
    Resolved,
    Failed,
}

impl fmt::Display for PromiseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PromiseStatus::Unresolved => "unresolved",
            PromiseStatus::Resolving => "resolving",
            PromiseStatus::Resolved => "resolved",
            PromiseStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

enum CellState {
    Unresolved(VecDeque<QueuedCall>),
    Resolving(VecDeque<QueuedCall>),
    Resolved(Capability),
    Failed(RpcError),
}

impl CellState {
    fn status(&self) -> PromiseStatus {
        match self {
            CellState::Unresolved(_) => PromiseStatus::Unresolved,
            CellState::Resolving(_) => PromiseStatus::Resolving,
            CellState::Resolved(_) => PromiseStatus::Resolved,
            CellState::Failed(_) => PromiseStatus::Failed,
        }
    }
}

/// Capability-table entry for a not-yet-known capability
pub struct PromiseCell {
    interface_id: NodeId,
    max_depth: u32,
    metrics: Arc<RpcMetrics>,
    state: Mutex<CellState>,
}

impl PromiseCell {
    pub(crate) fn new(interface_id: NodeId, max_depth: u32, metrics: Arc<RpcMetrics>) -> Self {
        Self {
            interface_id,
            max_depth,
            metrics,
            state: Mutex::new(CellState::Unresolved(VecDeque::new())),
        }
    }

    pub fn interface_id(&self) -> NodeId {
        self.interface_id
    }

    pub fn status(&self) -> PromiseStatus {
        self.state.lock().status()
    }

    /// Calls waiting for resolution
    pub fn queued(&self) -> usize {
        match &*self.state.lock() {
            CellState::Unresolved(queue) | CellState::Resolving(queue) => queue.len(),
            CellState::Resolved(_) | CellState::Failed(_) => 0,
        }
    }

    pub(crate) fn enqueue(&self, mut call: QueuedCall) {
        if call.hops >= self.max_depth {
            call.fail(RpcError::PipelineDepthExceeded {
                limit: self.max_depth,
            });
            return;
        }
        call.hops += 1;

        let forward = {
            let mut state = self.state.lock();
            match &mut *state {
                CellState::Unresolved(queue) | CellState::Resolving(queue) => {
                    debug!(
                        method = %call.method.name,
                        position = queue.len(),
                        "Queued call on unresolved promise"
                    );
                    queue.push_back(call);
                    self.metrics.record_pipelined();
                    return;
                }
                CellState::Resolved(target) => Ok(target.clone()),
                CellState::Failed(reason) => Err(reason.unfulfilled()),
            }
        };
        match forward {
            Ok(target) => target.dispatch(call),
            Err(error) => call.fail(error),
        }
    }

    /// Settle the cell. Only the first settlement takes effect.
    pub(crate) fn resolve(&self, outcome: RpcResult<Capability>) {
        match outcome {
            Ok(target) => self.fulfil(target),
            Err(reason) => self.reject(reason),
        }
    }

    fn fulfil(&self, target: Capability) {
        let mut replayed = 0usize;
        loop {
            let batch = {
                let mut state = self.state.lock();
                let queue = match &mut *state {
                    CellState::Unresolved(queue) | CellState::Resolving(queue) => {
                        std::mem::take(queue)
                    }
                    settled => {
                        warn!("Promise already {}; ignoring second settlement", settled.status());
                        return;
                    }
                };
                if queue.is_empty() {
                    *state = CellState::Resolved(target.clone());
                    break;
                }
                *state = CellState::Resolving(VecDeque::new());
                queue
            };
            replayed += batch.len();
            for call in batch {
                target.dispatch(call);
            }
        }
        debug!(target = %target.label(), replayed, "Promise resolved");
    }

    fn reject(&self, reason: RpcError) {
        let queue = {
            let mut state = self.state.lock();
            let queue = match &mut *state {
                CellState::Unresolved(queue) | CellState::Resolving(queue) => std::mem::take(queue),
                settled => {
                    warn!("Promise already {}; ignoring second settlement", settled.status());
                    return;
                }
            };
            *state = CellState::Failed(reason.clone());
            queue
        };
        warn!(reason = %reason, failed_calls = queue.len(), "Promise failed");
        let error = reason.unfulfilled();
        for call in queue {
            call.fail(error.clone());
        }
    }
}

impl fmt::Debug for PromiseCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseCell")
            .field("interface_id", &format_args!("{:#018x}", self.interface_id))
            .field("status", &self.status())
            .finish()
    }
}

/// Result of waiting on a promise
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    /// Call finished; holds the filled result struct
    Ok(Object),
    Error(RpcError),
    /// Gave up observing. The call itself keeps running and can be waited on again.
    Timeout,
}

impl WaitOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, WaitOutcome::Ok(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitOutcome::Timeout)
    }

    pub fn error(&self) -> Option<&RpcError> {
        match self {
            WaitOutcome::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_results(self) -> Option<Object> {
        match self {
            WaitOutcome::Ok(results) => Some(results),
            _ => None,
        }
    }
}

struct PromiseInner {
    method: Method,
    schema: Arc<Schema>,
    /// Target description for errors when the call is dropped unanswered
    target: String,
    state: watch::Receiver<CallState>,
    metrics: Arc<RpcMetrics>,
    max_depth: u32,
    pipelines: Mutex<HashMap<String, Arc<PromiseCell>>>,
}

/// Handle on the outcome of a sent call; clones observe the same call
#[derive(Clone)]
pub struct Promise {
    inner: Arc<PromiseInner>,
}

impl Promise {
    pub(crate) fn new(
        method: Method,
        schema: Arc<Schema>,
        target: String,
        state: watch::Receiver<CallState>,
        metrics: Arc<RpcMetrics>,
        max_depth: u32,
    ) -> Self {
        Self {
            inner: Arc::new(PromiseInner {
                method,
                schema,
                target,
                state,
                metrics,
                max_depth,
                pipelines: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    pub fn state(&self) -> CallState {
        self.inner.state.borrow().clone()
    }

    pub fn is_done(&self) -> bool {
        self.inner.state.borrow().is_done()
    }

    fn abandoned(&self) -> RpcError {
        RpcError::stopped(&self.inner.target)
    }

    /// Wait at most `timeout` for the call to finish
    ///
    /// If the serving actor goes away without completing the call, the
    /// outcome is `WaitOutcome::Error(RpcError::CapabilityStopped)`, never
    /// `Ok`: the result struct was never filled in.
    pub async fn wait_timeout(&self, timeout: Duration) -> WaitOutcome {
        let mut state = self.inner.state.clone();
        let waited = tokio::time::timeout(timeout, async {
            state
                .wait_for(CallState::is_done)
                .await
                .map(|done| done.outcome())
        })
        .await;

        match waited {
            Ok(Ok(Some(Ok(results)))) => WaitOutcome::Ok(results),
            Ok(Ok(Some(Err(error)))) => WaitOutcome::Error(error),
            // sender dropped without publishing: the call was lost with its actor
            Ok(Ok(None)) | Ok(Err(_)) => WaitOutcome::Error(self.abandoned()),
            Err(_elapsed) => WaitOutcome::Timeout,
        }
    }

    /// Wait with no bound, for resolvers that must see the outcome
    async fn settled(&self) -> RpcResult<Object> {
        let mut state = self.inner.state.clone();
        state
            .wait_for(CallState::is_done)
            .await
            .ok()
            .and_then(|done| done.outcome())
            .unwrap_or_else(|| Err(self.abandoned()))
    }

    /// Interface object standing for the capability that result field
    /// `field` will hold once this call finishes
    ///
    /// Calls sent to it are queued and replayed in issue order on
    /// resolution. Repeated calls for the same field share one queue.
    /// Must be called from within a tokio runtime.
    pub fn pipeline(&self, field: &str) -> RpcResult<Object> {
        let interface_id = self.pipeline_interface(field)?;

        let cell = {
            let mut pipelines = self.inner.pipelines.lock();
            match pipelines.get(field) {
                Some(cell) => Arc::clone(cell),
                None => {
                    let cell = Arc::new(PromiseCell::new(
                        interface_id,
                        self.inner.max_depth,
                        Arc::clone(&self.inner.metrics),
                    ));
                    pipelines.insert(field.to_string(), Arc::clone(&cell));
                    self.spawn_resolver(field.to_string(), Arc::clone(&cell));
                    cell
                }
            }
        };

        let message = Message::new_builder(Arc::clone(&self.inner.schema));
        let index = message.add_capability(Arc::new(Capability::Promised(cell)));
        Ok(Object::capability(message, interface_id, Some(index))?)
    }

    fn pipeline_interface(&self, field: &str) -> RpcResult<NodeId> {
        let node = self.inner.schema.node(self.inner.method.result_struct)?;
        let Some(results) = node.as_struct() else {
            return Err(SchemaError::wrong_kind(node.id, "struct", node.kind_name()).into());
        };
        let (_, f) = results
            .field(field)
            .ok_or_else(|| SchemaError::unknown_field(node.display_name.clone(), field))?;
        match f.slot_type() {
            Some(Type::Interface(id)) => Ok(*id),
            other => {
                let actual = other.map_or_else(|| "group".to_string(), |ty| ty.to_string());
                Err(CodecError::type_mismatch(
                    format!("{}.{}", node.display_name, field),
                    "interface",
                    actual,
                )
                .into())
            }
        }
    }

    fn spawn_resolver(&self, field: String, cell: Arc<PromiseCell>) {
        let promise = self.clone();
        tokio::spawn(async move {
            let outcome = promise.capability_in_field(&field).await;
            cell.resolve(outcome);
        });
    }

    async fn capability_in_field(&self, field: &str) -> RpcResult<Capability> {
        let results = self.settled().await?;
        let value = results.get(field)?;
        let object = value.into_object().ok_or_else(|| {
            RpcError::not_a_capability(format!("result field {} holds no object", field))
        })?;
        Capability::of(&object)
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("method", &self.inner.method.name)
            .field("target", &self.inner.target)
            .field("done", &self.is_done())
            .finish()
    }
}
