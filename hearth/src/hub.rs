//! The broadcast Hub: a single actor owning the registry of live viewer
//! sessions. Register, unregister, and broadcast are each delivered as
//! events on their own channel and applied by the actor task serially, so
//! the registry itself never needs more than a reader/writer lock shared
//! with read-only observers (the health endpoint's session count).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

pub type SessionId = u64;

/// Bounded per-session outbound queue. A slow viewer can only ever hold up
/// this many frames behind before the Hub evicts it.
const SESSION_QUEUE_CAPACITY: usize = 256;

const REGISTER_CHANNEL_CAPACITY: usize = 256;
const UNREGISTER_CHANNEL_CAPACITY: usize = 256;
const BROADCAST_CHANNEL_CAPACITY: usize = 1024;

struct RegisterMsg {
    id: SessionId,
    tx: mpsc::Sender<Vec<u8>>,
}

type Registry = Arc<RwLock<HashMap<SessionId, mpsc::Sender<Vec<u8>>>>>;

/// A cheaply-cloneable handle to the Hub. Every HTTP connection that
/// upgrades to a websocket gets one; none of them touch the registry
/// directly.
#[derive(Clone)]
pub struct Hub {
    register_tx: mpsc::Sender<RegisterMsg>,
    unregister_tx: mpsc::Sender<SessionId>,
    broadcast_tx: mpsc::Sender<Vec<u8>>,
    registry: Registry,
    next_id: Arc<AtomicU64>,
}

/// A session's one-shot capability to ask the Hub to drop it. Deliberately
/// holds no reference back into the registry -- only a sender into the
/// unregister channel -- so session and Hub never form a reference cycle.
pub struct SessionHandle {
    id: SessionId,
    unregister_tx: mpsc::Sender<SessionId>,
}

impl SessionHandle {
    pub async fn unregister(&self) {
        let _ = self.unregister_tx.send(self.id).await;
    }
}

impl Hub {
    /// Builds the Hub handle and its actor. The caller must spawn the actor
    /// with [`HubActor::run`] exactly once.
    pub fn new() -> (Self, HubActor) {
        let (register_tx, register_rx) = mpsc::channel(REGISTER_CHANNEL_CAPACITY);
        let (unregister_tx, unregister_rx) = mpsc::channel(UNREGISTER_CHANNEL_CAPACITY);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_CHANNEL_CAPACITY);
        let registry: Registry = Arc::new(RwLock::new(HashMap::new()));

        let hub = Hub {
            register_tx,
            unregister_tx,
            broadcast_tx,
            registry: registry.clone(),
            next_id: Arc::new(AtomicU64::new(1)),
        };
        let actor = HubActor {
            register_rx,
            unregister_rx,
            broadcast_rx,
            registry,
        };
        (hub, actor)
    }

    /// Registers a new viewer session and returns its id, the receive side
    /// of its outbound queue, and the handle it uses to unregister itself.
    pub async fn register(&self) -> (SessionId, mpsc::Receiver<Vec<u8>>, SessionHandle) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SESSION_QUEUE_CAPACITY);
        let _ = self.register_tx.send(RegisterMsg { id, tx }).await;
        let handle = SessionHandle {
            id,
            unregister_tx: self.unregister_tx.clone(),
        };
        (id, rx, handle)
    }

    /// Enqueues `payload` for fan-out to every registered session. Never
    /// blocks on a slow consumer -- dispatch happens inside the actor,
    /// which evicts rather than waits.
    pub async fn broadcast(&self, payload: Vec<u8>) {
        let _ = self.broadcast_tx.send(payload).await;
    }

    /// Current number of registered sessions, for the health endpoint.
    pub async fn session_count(&self) -> usize {
        self.registry.read().await.len()
    }
}

/// Owns the registry outright; all mutation happens inside [`HubActor::run`].
pub struct HubActor {
    register_rx: mpsc::Receiver<RegisterMsg>,
    unregister_rx: mpsc::Receiver<SessionId>,
    broadcast_rx: mpsc::Receiver<Vec<u8>>,
    registry: Registry,
}

impl HubActor {
    pub fn run(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = self.register_rx.recv() => {
                        match msg {
                            Some(msg) => self.handle_register(msg).await,
                            None => break,
                        }
                    }
                    id = self.unregister_rx.recv() => {
                        match id {
                            Some(id) => self.handle_unregister(id).await,
                            None => break,
                        }
                    }
                    payload = self.broadcast_rx.recv() => {
                        match payload {
                            Some(payload) => self.handle_broadcast(payload).await,
                            None => break,
                        }
                    }
                }
            }
            info!("hub actor stopped");
        })
    }

    async fn handle_register(&self, msg: RegisterMsg) {
        let mut registry = self.registry.write().await;
        registry.insert(msg.id, msg.tx);
        info!(sessions = registry.len(), "session registered");
    }

    /// Idempotent: removing an id that is already gone (evicted during a
    /// prior broadcast, or unregistered twice) is a harmless no-op.
    async fn handle_unregister(&self, id: SessionId) {
        let mut registry = self.registry.write().await;
        if registry.remove(&id).is_some() {
            info!(sessions = registry.len(), "session unregistered");
        }
    }

    async fn handle_broadcast(&self, payload: Vec<u8>) {
        let mut evicted = Vec::new();
        {
            let registry = self.registry.read().await;
            for (id, tx) in registry.iter() {
                if tx.try_send(payload.clone()).is_err() {
                    evicted.push(*id);
                }
            }
        }
        if evicted.is_empty() {
            return;
        }
        let mut registry = self.registry.write().await;
        for id in evicted {
            registry.remove(&id);
        }
        info!(sessions = registry.len(), "evicted slow sessions");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn broadcast_fans_out_to_every_registered_session() {
        let (hub, actor) = Hub::new();
        actor.run();

        let (_id_a, mut rx_a, _handle_a) = hub.register().await;
        let (_id_b, mut rx_b, _handle_b) = hub.register().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        hub.broadcast(b"hello".to_vec()).await;

        assert_eq!(rx_a.recv().await, Some(b"hello".to_vec()));
        assert_eq!(rx_b.recv().await, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn unregister_closes_the_session_queue() {
        let (hub, actor) = Hub::new();
        actor.run();

        let (_id, mut rx, handle) = hub.register().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.unregister().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn slow_session_is_evicted_without_blocking_broadcast() {
        let (hub, actor) = Hub::new();
        actor.run();

        let (_id_slow, rx_slow, _handle_slow) = hub.register().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hub.session_count().await, 1);

        // Fill the slow session's queue without ever draining it.
        for i in 0..SESSION_QUEUE_CAPACITY + 10 {
            hub.broadcast(format!("msg-{i}").into_bytes()).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(hub.session_count().await, 0);
        drop(rx_slow);
    }

    #[tokio::test]
    async fn double_unregister_is_idempotent() {
        let (hub, actor) = Hub::new();
        actor.run();

        let (_id, _rx, handle) = hub.register().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        handle.unregister().await;
        handle.unregister().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(hub.session_count().await, 0);
    }
}
