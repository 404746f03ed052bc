//! The task that owns one capability
//!
//! Calls are taken from the mailbox one at a time. Each runs in its own
//! worker task so a panic inside the implementation fails that call alone;
//! the actor awaits the worker before taking the next call, which keeps
//! calls on one capability strictly sequential.

use crate::call::QueuedCall;
use crate::error::RpcError;
use crate::metrics::RpcMetrics;
use crate::registry::ActorId;
use crate::server::{CallContext, Server};
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

pub(crate) struct CapabilityActor {
    id: ActorId,
    interface: String,
    server: Arc<dyn Server>,
    mailbox: mpsc::UnboundedReceiver<QueuedCall>,
    depth: Arc<AtomicUsize>,
    stop: oneshot::Receiver<()>,
    metrics: Arc<RpcMetrics>,
}

impl CapabilityActor {
    pub fn new(
        id: ActorId,
        interface: String,
        server: Arc<dyn Server>,
        mailbox: mpsc::UnboundedReceiver<QueuedCall>,
        depth: Arc<AtomicUsize>,
        stop: oneshot::Receiver<()>,
        metrics: Arc<RpcMetrics>,
    ) -> Self {
        Self {
            id,
            interface,
            server,
            mailbox,
            depth,
            stop,
            metrics,
        }
    }

    pub async fn run(mut self) {
        let started = Instant::now();
        info!(actor_id = %self.id, interface = %self.interface, "Capability actor started");

        if let Err(e) = self.server.on_start().await {
            warn!("Capability {} on_start failed: {}", self.id, e);
        }

        let mut handled = 0u64;
        loop {
            tokio::select! {
                biased;
                // a dropped stop sender means nobody can reach this actor's owner
                _ = &mut self.stop => break,
                next = self.mailbox.recv() => match next {
                    Some(call) => {
                        self.depth.fetch_sub(1, Ordering::Relaxed);
                        self.handle(call).await;
                        handled += 1;
                    }
                    None => break,
                },
            }
        }

        self.mailbox.close();
        let mut abandoned = 0u64;
        while let Ok(call) = self.mailbox.try_recv() {
            call.fail(RpcError::stopped(self.id));
            abandoned += 1;
        }

        if let Err(e) = self.server.on_stop().await {
            warn!("Capability {} on_stop failed: {}", self.id, e);
        }

        info!(
            actor_id = %self.id,
            interface = %self.interface,
            handled,
            abandoned,
            total_runtime_ms = started.elapsed().as_millis(),
            "Capability actor stopped"
        );
    }

    async fn handle(&self, call: QueuedCall) {
        let ctx = CallContext::new(call.method.clone(), call.params.clone(), call.results.clone());
        let server = Arc::clone(&self.server);
        debug!(actor_id = %self.id, method = %call.method.name, "Starting call worker");

        let worker = tokio::spawn(async move { server.call(ctx).await });
        let outcome = match worker.await {
            Ok(Ok(())) => Ok(call.results.clone()),
            Ok(Err(e)) => Err(RpcError::call_failed(&call.method.name, format!("{:#}", e))),
            Err(join) if join.is_panic() => {
                let reason = panic_reason(join.into_panic());
                error!(
                    actor_id = %self.id,
                    method = %call.method.name,
                    reason = %reason,
                    "Call worker panicked"
                );
                self.metrics.record_worker_panic();
                Err(RpcError::WorkerPanicked {
                    method: call.method.name.clone(),
                    reason,
                })
            }
            Err(join) => Err(RpcError::call_failed(&call.method.name, join.to_string())),
        };
        call.complete(outcome);
    }
}

fn panic_reason(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
