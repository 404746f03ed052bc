//! RPC system: capability lifecycle and the call protocol
//!
//! `request` → fill `param` → `send` → `wait`. Every started capability is
//! tracked in the system registry until it is stopped or the system shuts
//! down.

use crate::actor::CapabilityActor;
use crate::call::{CallState, QueuedCall};
use crate::capability::{Capability, LocalCapability};
use crate::config::RpcConfig;
use crate::error::{RpcError, RpcResult};
use crate::metrics::{RpcMetrics, RpcStats};
use crate::promise::{Promise, WaitOutcome};
use crate::registry::{ActorEntry, ActorId, ActorInfo, CapabilityRegistry};
use crate::request::Request;
use crate::server::Server;
use codec::{Message, NodeId, Object, Schema};
use schema::SchemaError;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

#[derive(Debug)]
struct SystemInner {
    system_id: String,
    config: RpcConfig,
    registry: CapabilityRegistry,
    metrics: Arc<RpcMetrics>,
}

/// Owner of capability actors; cheap to clone
#[derive(Debug, Clone)]
pub struct RpcSystem {
    inner: Arc<SystemInner>,
}

impl RpcSystem {
    pub fn new(system_id: impl Into<String>) -> Self {
        Self::with_config(system_id, RpcConfig::default())
    }

    pub fn with_config(system_id: impl Into<String>, config: RpcConfig) -> Self {
        let system_id = system_id.into();
        info!("Creating RPC system: {} ({:?})", system_id, config);
        Self {
            inner: Arc::new(SystemInner {
                system_id,
                config,
                registry: CapabilityRegistry::default(),
                metrics: Arc::new(RpcMetrics::default()),
            }),
        }
    }

    pub fn system_id(&self) -> &str {
        &self.inner.system_id
    }

    pub fn config(&self) -> &RpcConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &Arc<RpcMetrics> {
        &self.inner.metrics
    }

    pub fn stats(&self) -> RpcStats {
        self.inner.metrics.snapshot()
    }

    /// Running capability actors
    pub fn capabilities(&self) -> Vec<ActorInfo> {
        self.inner.registry.list()
    }

    /// Spawn an actor serving `server` as interface `interface_id` and
    /// return an interface object bound to it
    ///
    /// Must be called from within a tokio runtime. The actor runs until
    /// [`stop`](Self::stop) or [`shutdown`](Self::shutdown).
    pub fn start<S: Server>(
        &self,
        interface_id: NodeId,
        server: S,
        schema: Arc<Schema>,
    ) -> RpcResult<Object> {
        self.spawn(interface_id, Arc::new(server), schema)
            .map(|(object, _)| object)
    }

    /// Like [`start`](Self::start), but the actor stops when the returned
    /// [`Link`] is dropped
    pub fn start_link<S: Server>(
        &self,
        interface_id: NodeId,
        server: S,
        schema: Arc<Schema>,
    ) -> RpcResult<(Object, Link)> {
        let (object, id) = self.spawn(interface_id, Arc::new(server), schema)?;
        let link = Link {
            id,
            system: Arc::clone(&self.inner),
            armed: true,
        };
        Ok((object, link))
    }

    fn spawn(
        &self,
        interface_id: NodeId,
        server: Arc<dyn Server>,
        schema: Arc<Schema>,
    ) -> RpcResult<(Object, ActorId)> {
        let spawn_start = Instant::now();
        let node = schema.node(interface_id)?;
        if node.as_interface().is_none() {
            return Err(SchemaError::wrong_kind(interface_id, "interface", node.kind_name()).into());
        }
        let interface = node.display_name.clone();

        let id = ActorId::new();
        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let depth = Arc::new(AtomicUsize::new(0));

        let local = LocalCapability::new(
            id,
            interface_id,
            mailbox_tx,
            Arc::clone(&depth),
            self.inner.config.call_channel_warning_depth,
            Arc::clone(&self.inner.metrics),
        );
        let message = Message::new_builder(schema);
        let index = message.add_capability(Arc::new(Capability::Local(local)));
        let object = Object::capability(message, interface_id, Some(index))?;

        let actor = CapabilityActor::new(
            id,
            interface.clone(),
            server,
            mailbox_rx,
            depth,
            stop_rx,
            Arc::clone(&self.inner.metrics),
        );
        let task = tokio::spawn(actor.run());
        self.inner
            .registry
            .register(id, ActorEntry::new(interface.clone(), stop_tx, task));
        self.inner.metrics.record_started();

        info!(
            actor_id = %id,
            system_id = %self.inner.system_id,
            interface = %interface,
            spawn_duration_ms = spawn_start.elapsed().as_millis(),
            "Capability started"
        );
        Ok((object, id))
    }

    /// Stop the actor behind `capability`
    ///
    /// The call in flight finishes; calls still queued fail with
    /// [`RpcError::CapabilityStopped`].
    pub async fn stop(&self, capability: &Object) -> RpcResult<()> {
        match Capability::of(capability)? {
            Capability::Local(local) => self.stop_actor(local.id()).await,
            other => Err(RpcError::not_a_capability(format!(
                "{} is not a local actor",
                other.label()
            ))),
        }
    }

    pub async fn stop_actor(&self, id: ActorId) -> RpcResult<()> {
        let stop_start = Instant::now();
        let mut entry = self
            .inner
            .registry
            .unregister(&id)
            .ok_or_else(|| RpcError::stopped(id))?;
        entry.signal_stop();
        let uptime = entry.started_at.elapsed();
        if let Err(e) = entry.into_task().await {
            warn!(actor_id = %id, error = %e, "Capability actor task ended abnormally");
        }
        self.inner.metrics.record_stopped();
        info!(
            actor_id = %id,
            system_id = %self.inner.system_id,
            uptime_ms = uptime.as_millis(),
            stop_duration_ms = stop_start.elapsed().as_millis(),
            "Capability stopped"
        );
        Ok(())
    }

    /// Resolve `method` on the target's interface and allocate its
    /// parameter struct
    pub fn request(&self, method: &str, target: &Object) -> RpcResult<Request> {
        Request::new(method, target)
    }

    /// Parameter struct of a request
    pub fn param(&self, request: &Request) -> Object {
        request.params().clone()
    }

    /// Dispatch a request. Never blocks; failures surface through the promise.
    pub fn send(&self, request: Request) -> Promise {
        let (method, target, params) = request.into_parts();
        let schema = Arc::clone(target.schema());
        let capability = Capability::of(&target);
        let label = match &capability {
            Ok(capability) => capability.label(),
            Err(_) => target.node().display_name.clone(),
        };

        let (completion, state) = watch::channel(CallState::Pending);
        let promise = Promise::new(
            method.clone(),
            Arc::clone(&schema),
            label,
            state,
            Arc::clone(&self.inner.metrics),
            self.inner.config.max_pipeline_depth,
        );

        let results = match codec::set_root(method.result_struct, schema) {
            Ok(results) => results,
            Err(e) => {
                warn!(method = %method.name, error = %e, "Could not allocate call results");
                self.inner.metrics.record_call(Duration::ZERO, false);
                completion.send_replace(CallState::Done(Err(e.into())));
                return promise;
            }
        };

        let call = QueuedCall::new(
            method,
            params,
            results,
            completion,
            Arc::clone(&self.inner.metrics),
        );
        match capability {
            Ok(capability) => capability.dispatch(call),
            Err(e) => call.fail(e),
        }
        promise
    }

    /// Wait for a promise using the configured timeout
    ///
    /// A call whose actor stopped before completing it reports
    /// `CapabilityStopped` rather than success.
    pub async fn wait(&self, promise: &Promise) -> WaitOutcome {
        promise.wait_timeout(self.inner.config.wait_timeout()).await
    }

    pub async fn wait_timeout(&self, promise: &Promise, timeout: Duration) -> WaitOutcome {
        promise.wait_timeout(timeout).await
    }

    /// Stop every actor. Calls in flight finish first.
    pub async fn shutdown(&self) {
        let entries = self.inner.registry.drain();
        info!(
            system_id = %self.inner.system_id,
            actor_count = entries.len(),
            "Shutting down RPC system"
        );
        let tasks = entries.into_iter().map(|(id, mut entry)| {
            entry.signal_stop();
            let metrics = Arc::clone(&self.inner.metrics);
            async move {
                if let Err(e) = entry.into_task().await {
                    warn!(actor_id = %id, error = %e, "Capability actor task ended abnormally");
                }
                metrics.record_stopped();
            }
        });
        futures::future::join_all(tasks).await;
        info!("RPC system {} shutdown complete", self.inner.system_id);
    }
}

impl Default for RpcSystem {
    fn default() -> Self {
        Self::new("rpc")
    }
}

/// Ties an actor's lifetime to a scope; dropping it stops the actor
#[derive(Debug)]
pub struct Link {
    id: ActorId,
    system: Arc<SystemInner>,
    armed: bool,
}

impl Link {
    pub fn actor_id(&self) -> ActorId {
        self.id
    }

    /// Release the actor from the link; it then lives until stopped explicitly
    pub fn detach(mut self) {
        self.armed = false;
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        if !self.armed || !self.system.registry.contains(&self.id) {
            return;
        }
        if let Some(mut entry) = self.system.registry.unregister(&self.id) {
            entry.signal_stop();
            self.system.metrics.record_stopped();
            debug!("Linked capability {} released", self.id);
        }
    }
}
