//! Broadcast Gateway
//!
//! Registry of connected clients. Each connection gets an unbounded
//! channel; the gateway fans events out to every registered sender.
//! Delivery is best-effort: a client whose channel is gone is dropped
//! from the registry and simply misses events until it reconnects.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::model::VoterIdentity;
use super::protocol::ServerEvent;

/// Connection identifier
pub type ConnectionId = Uuid;

/// A registered connection
struct Subscriber {
    voter: VoterIdentity,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

/// Fan-out hub for server events
#[derive(Default)]
pub struct Gateway {
    subscribers: RwLock<HashMap<ConnectionId, Subscriber>>,
}

impl Gateway {
    /// Create an empty gateway
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. The receiver yields every event addressed to it.
    pub async fn register(
        &self,
        voter: VoterIdentity,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        let mut subscribers = self.subscribers.write().await;
        subscribers.insert(id, Subscriber { voter: voter.clone(), tx });
        tracing::debug!("Connection {} registered for {} ({} connected)", id, voter, subscribers.len());

        (id, rx)
    }

    /// Remove a connection. Returns false if it was not registered.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let mut subscribers = self.subscribers.write().await;
        match subscribers.remove(&id) {
            Some(subscriber) => {
                tracing::debug!(
                    "Connection {} for {} unregistered ({} connected)",
                    id,
                    subscriber.voter,
                    subscribers.len()
                );
                true
            }
            None => false,
        }
    }

    /// Deliver an event to every connection. Returns how many received it.
    pub async fn broadcast(&self, event: ServerEvent) -> usize {
        let mut dead = Vec::new();
        let mut delivered = 0;
        {
            let subscribers = self.subscribers.read().await;
            for (id, subscriber) in subscribers.iter() {
                if subscriber.tx.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(*id);
                }
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in &dead {
                subscribers.remove(id);
            }
            tracing::debug!("Dropped {} closed connections", dead.len());
        }

        tracing::trace!("Broadcast {} to {} connections", event.type_name(), delivered);
        delivered
    }

    /// Deliver an event to one connection
    pub async fn send_to(&self, id: ConnectionId, event: ServerEvent) -> bool {
        let subscribers = self.subscribers.read().await;
        match subscribers.get(&id) {
            Some(subscriber) => subscriber.tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Number of registered connections
    pub async fn connection_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_everyone() {
        let gateway = Gateway::new();
        let (_a, mut rx_a) = gateway.register(VoterIdentity::new("a")).await;
        let (_b, mut rx_b) = gateway.register(VoterIdentity::new("b")).await;

        assert_eq!(gateway.broadcast(ServerEvent::Pong).await, 2);
        assert_eq!(rx_a.recv().await, Some(ServerEvent::Pong));
        assert_eq!(rx_b.recv().await, Some(ServerEvent::Pong));
    }

    #[tokio::test]
    async fn test_send_to_one() {
        let gateway = Gateway::new();
        let (a, mut rx_a) = gateway.register(VoterIdentity::new("a")).await;
        let (_b, mut rx_b) = gateway.register(VoterIdentity::new("b")).await;

        assert!(gateway.send_to(a, ServerEvent::Pong).await);
        assert_eq!(rx_a.recv().await, Some(ServerEvent::Pong));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_connections_are_pruned() {
        let gateway = Gateway::new();
        let (_a, rx_a) = gateway.register(VoterIdentity::new("a")).await;
        let (b, _rx_b) = gateway.register(VoterIdentity::new("b")).await;
        drop(rx_a);

        assert_eq!(gateway.broadcast(ServerEvent::Pong).await, 1);
        assert_eq!(gateway.connection_count().await, 1);

        assert!(gateway.unregister(b).await);
        assert!(!gateway.unregister(b).await);
        assert_eq!(gateway.connection_count().await, 0);
    }
}
