//! A call in flight and the channel its outcome is published on

use crate::error::{RpcError, RpcResult};
use crate::metrics::RpcMetrics;
use codec::Object;
use schema::Method;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::warn;

/// Observable state of one call
#[derive(Debug, Clone)]
pub enum CallState {
    Pending,
    Done(RpcResult<Object>),
}

impl CallState {
    pub fn is_done(&self) -> bool {
        matches!(self, CallState::Done(_))
    }

    /// Final outcome, once there is one
    pub fn outcome(&self) -> Option<RpcResult<Object>> {
        match self {
            CallState::Pending => None,
            CallState::Done(outcome) => Some(outcome.clone()),
        }
    }
}

/// A call waiting in a mailbox or a promise queue
///
/// Completing it publishes the outcome to every clone of its promise.
/// Dropping it uncompleted closes the channel, which waiters observe as
/// a stopped capability.
pub(crate) struct QueuedCall {
    pub method: Method,
    pub params: Object,
    pub results: Object,
    /// Promises this call has been forwarded through
    pub hops: u32,
    issued_at: Instant,
    completion: watch::Sender<CallState>,
    metrics: Arc<RpcMetrics>,
}

impl QueuedCall {
    pub fn new(
        method: Method,
        params: Object,
        results: Object,
        completion: watch::Sender<CallState>,
        metrics: Arc<RpcMetrics>,
    ) -> Self {
        Self {
            method,
            params,
            results,
            hops: 0,
            issued_at: Instant::now(),
            completion,
            metrics,
        }
    }

    pub fn complete(self, outcome: RpcResult<Object>) {
        if let Err(e) = &outcome {
            warn!(method = %self.method.name, hops = self.hops, error = %e, "Call failed");
        }
        self.metrics
            .record_call(self.issued_at.elapsed(), outcome.is_ok());
        self.completion.send_replace(CallState::Done(outcome));
    }

    pub fn fail(self, error: RpcError) {
        self.complete(Err(error));
    }
}

impl fmt::Debug for QueuedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedCall")
            .field("method", &self.method.name)
            .field("hops", &self.hops)
            .finish()
    }
}
