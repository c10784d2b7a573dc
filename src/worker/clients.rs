//! Connected page contexts.
//!
//! A page subscribes by connecting and receives worker messages on its own
//! channel. Pages that drop their receiver are pruned on the next registry
//! access.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::worker::WorkerMessage;

/// Identifier of a connected page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ClientId(u64);

impl ClientId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

#[derive(Debug)]
struct ClientHandle {
    url: Option<String>,
    controlled: bool,
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

/// Public view of a connected page.
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub id: ClientId,
    pub url: Option<String>,
    pub controlled: bool,
}

/// The receiving half handed to a page when it connects.
#[derive(Debug)]
pub struct ConnectedClient {
    pub id: ClientId,
    rx: mpsc::UnboundedReceiver<WorkerMessage>,
}

impl ConnectedClient {
    /// Waits for the next message. Returns None once the worker forgets this page.
    pub async fn recv(&mut self) -> Option<WorkerMessage> {
        self.rx.recv().await
    }

    /// Returns a message if one is already queued.
    pub fn try_recv(&mut self) -> Option<WorkerMessage> {
        self.rx.try_recv().ok()
    }
}

// == Client Registry ==
/// Every page context connected to the worker.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<RwLock<BTreeMap<ClientId, ClientHandle>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a page. It starts uncontrolled until the active worker claims it.
    pub async fn connect(&self, url: Option<String>) -> ConnectedClient {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ClientId::next();
        let mut clients = self.clients.write().await;
        prune_closed(&mut clients);
        clients.insert(
            id,
            ClientHandle {
                url,
                controlled: false,
                tx,
            },
        );
        debug!("Page {} connected", id);
        ConnectedClient { id, rx }
    }

    /// Registers a page that an active worker controls from the start.
    pub async fn connect_controlled(&self, url: Option<String>) -> ConnectedClient {
        let client = self.connect(url).await;
        if let Some(handle) = self.clients.write().await.get_mut(&client.id) {
            handle.controlled = true;
        }
        client
    }

    /// Forgets a page. Returns whether it was connected.
    pub async fn disconnect(&self, id: ClientId) -> bool {
        let removed = self.clients.write().await.remove(&id).is_some();
        if removed {
            debug!("Page {} disconnected", id);
        }
        removed
    }

    /// Takes control of every connected page. Returns how many were newly claimed.
    pub async fn claim(&self) -> usize {
        let mut clients = self.clients.write().await;
        prune_closed(&mut clients);
        let mut claimed = 0;
        for handle in clients.values_mut() {
            if !handle.controlled {
                handle.controlled = true;
                claimed += 1;
            }
        }
        claimed
    }

    /// Sends `message` to every connected page, controlled or not.
    ///
    /// Pages whose receiver is gone are removed. Returns the number reached.
    pub async fn broadcast(&self, message: WorkerMessage) -> usize {
        let mut clients = self.clients.write().await;
        let mut closed = Vec::new();
        let mut delivered = 0;

        for (id, handle) in clients.iter() {
            if handle.tx.send(message).is_ok() {
                delivered += 1;
            } else {
                closed.push(*id);
            }
        }
        for id in closed {
            clients.remove(&id);
            debug!("Pruned closed page {}", id);
        }

        delivered
    }

    /// Number of pages still listening.
    pub async fn len(&self) -> usize {
        self.clients
            .read()
            .await
            .values()
            .filter(|h| !h.tx.is_closed())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn list(&self) -> Vec<ClientInfo> {
        let mut clients = self.clients.write().await;
        prune_closed(&mut clients);
        clients
            .iter()
            .map(|(id, handle)| ClientInfo {
                id: *id,
                url: handle.url.clone(),
                controlled: handle.controlled,
            })
            .collect()
    }
}

fn prune_closed(clients: &mut BTreeMap<ClientId, ClientHandle>) {
    clients.retain(|id, handle| {
        let open = !handle.tx.is_closed();
        if !open {
            debug!("Pruned closed page {}", id);
        }
        open
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_every_page() {
        let registry = ClientRegistry::new();
        let mut a = registry.connect(None).await;
        let mut b = registry.connect(Some("https://app.example/#/history".into())).await;

        let delivered = registry.broadcast(WorkerMessage::RefreshAppDone).await;

        assert_eq!(delivered, 2);
        assert_eq!(a.try_recv(), Some(WorkerMessage::RefreshAppDone));
        assert_eq!(b.try_recv(), Some(WorkerMessage::RefreshAppDone));
        assert_eq!(a.try_recv(), None);
    }

    #[tokio::test]
    async fn test_broadcast_prunes_dropped_pages() {
        let registry = ClientRegistry::new();
        let _kept = registry.connect(None).await;
        let dropped = registry.connect(None).await;
        drop(dropped);

        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.broadcast(WorkerMessage::RefreshAppDone).await, 1);
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_pages_are_forgotten_without_broadcast() {
        let registry = ClientRegistry::new();
        for _ in 0..100 {
            drop(registry.connect(None).await);
        }

        assert!(registry.list().await.is_empty());

        let _live = registry.connect(None).await;
        assert_eq!(registry.clients.read().await.len(), 1);
        assert_eq!(registry.claim().await, 1);
    }

    #[tokio::test]
    async fn test_claim_marks_pages_controlled() {
        let registry = ClientRegistry::new();
        let _a = registry.connect(None).await;
        let _b = registry.connect_controlled(None).await;

        assert_eq!(registry.claim().await, 1);
        assert_eq!(registry.claim().await, 0);
        assert!(registry.list().await.iter().all(|c| c.controlled));
    }

    #[tokio::test]
    async fn test_disconnect() {
        let registry = ClientRegistry::new();
        let client = registry.connect(None).await;

        assert!(registry.disconnect(client.id).await);
        assert!(!registry.disconnect(client.id).await);
        assert!(registry.is_empty().await);
    }
}
