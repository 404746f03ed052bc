//! Actor identity and the table of running capability actors

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique actor identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActorId {
    id: Uuid,
}

impl ActorId {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self { id }
    }

    pub fn uuid(&self) -> Uuid {
        self.id
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}", self.id.simple())
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

/// Control half of a running actor
#[derive(Debug)]
pub(crate) struct ActorEntry {
    pub interface: String,
    pub started_at: Instant,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ActorEntry {
    pub fn new(interface: String, stop: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self {
            interface,
            started_at: Instant::now(),
            stop: Some(stop),
            task,
        }
    }

    /// Ask the actor to stop after its current call
    pub fn signal_stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            // receiver already gone means the actor exited on its own
            let _ = stop.send(());
        }
    }

    pub fn into_task(self) -> JoinHandle<()> {
        self.task
    }
}

/// Summary of a running actor for introspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorInfo {
    pub id: ActorId,
    pub interface: String,
}

#[derive(Debug, Default)]
pub(crate) struct CapabilityRegistry {
    actors: RwLock<HashMap<ActorId, ActorEntry>>,
}

impl CapabilityRegistry {
    pub fn register(&self, id: ActorId, entry: ActorEntry) {
        debug!(actor_id = %id, interface = %entry.interface, "Registered capability actor");
        self.actors.write().insert(id, entry);
    }

    pub fn unregister(&self, id: &ActorId) -> Option<ActorEntry> {
        let entry = self.actors.write().remove(id);
        if entry.is_none() {
            warn!("Attempted to unregister unknown actor: {}", id);
        }
        entry
    }

    /// Remove every entry, for shutdown
    pub fn drain(&self) -> Vec<(ActorId, ActorEntry)> {
        self.actors.write().drain().collect()
    }

    pub fn contains(&self, id: &ActorId) -> bool {
        self.actors.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.actors.read().len()
    }

    pub fn list(&self) -> Vec<ActorInfo> {
        self.actors
            .read()
            .iter()
            .map(|(id, entry)| ActorInfo {
                id: *id,
                interface: entry.interface.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_id_display() {
        let id = ActorId::from_uuid(Uuid::nil());
        assert_eq!(id.to_string(), "actor-00000000000000000000000000000000");
        assert_ne!(ActorId::new(), ActorId::new());
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let registry = CapabilityRegistry::default();
        let id = ActorId::new();
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let _ = stop_rx.await;
        });
        registry.register(id, ActorEntry::new("test.Echo".into(), stop_tx, task));
        assert!(registry.contains(&id));
        assert_eq!(registry.list()[0].interface, "test.Echo");

        let mut entry = registry.unregister(&id).unwrap();
        entry.signal_stop();
        entry.into_task().await.unwrap();
        assert_eq!(registry.len(), 0);
        assert!(registry.unregister(&id).is_none());
    }
}
