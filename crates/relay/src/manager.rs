//! Connection registry and per-user message routing.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use prism_core::types::{Timestamp, UserId};
use prism_events::JobEvent;

/// Identifies one live connection.
pub type ConnectionId = Uuid;

/// What the relay pushes down a connection's channel.
#[derive(Debug, Clone)]
pub enum RelayMessage {
    /// A job event for the connected user.
    Event(JobEvent),
    /// Liveness probe; the transport answers by calling
    /// [`RelayManager::mark_alive`].
    Ping,
    /// The relay is done with this connection; the transport should
    /// close it.
    Close,
}

/// Channel half plus liveness state for one connection.
struct Connection {
    user_id: UserId,
    sender: mpsc::UnboundedSender<RelayMessage>,
    /// Cleared by each heartbeat sweep, set again by `mark_alive`. A
    /// connection that stays cleared across a full sweep is dead.
    alive: bool,
    connected_at: Timestamp,
}

/// Manages all live connections.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc`
/// and shared across the application.
pub struct RelayManager {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl RelayManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection for `user_id`.
    ///
    /// Returns the connection id and the receiver half the transport
    /// drains into its socket.
    pub async fn subscribe(
        &self,
        user_id: UserId,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<RelayMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn_id = Uuid::new_v4();
        let conn = Connection {
            user_id,
            sender: tx,
            alive: true,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        (conn_id, rx)
    }

    /// Drop one connection.
    pub async fn unsubscribe(&self, conn_id: ConnectionId) {
        self.connections.write().await.remove(&conn_id);
    }

    /// Drop every connection of a user (logout, account closure).
    pub async fn unsubscribe_all(&self, user_id: UserId) {
        self.connections
            .write()
            .await
            .retain(|_, conn| conn.user_id != user_id);
    }

    /// Deliver an event to all of a user's connections.
    ///
    /// Connections whose receiving side is gone are pruned on the spot.
    /// Returns the number of connections reached.
    pub async fn publish(&self, user_id: UserId, event: JobEvent) -> usize {
        let mut conns = self.connections.write().await;
        let mut reached = 0;
        conns.retain(|_, conn| {
            if conn.user_id != user_id {
                return true;
            }
            match conn.sender.send(RelayMessage::Event(event.clone())) {
                Ok(()) => {
                    reached += 1;
                    true
                }
                Err(_) => false,
            }
        });
        reached
    }

    /// Record a liveness response from the transport.
    pub async fn mark_alive(&self, conn_id: ConnectionId) {
        if let Some(conn) = self.connections.write().await.get_mut(&conn_id) {
            conn.alive = true;
        }
    }

    /// One heartbeat sweep: close connections that never answered the
    /// previous ping, then ping the remainder and clear their flags.
    ///
    /// Returns the number of connections force-closed.
    pub async fn sweep_and_ping(&self) -> usize {
        let mut conns = self.connections.write().await;
        let before = conns.len();
        conns.retain(|conn_id, conn| {
            if conn.alive {
                return true;
            }
            tracing::info!(%conn_id, user_id = %conn.user_id, "Closing unresponsive connection");
            let _ = conn.sender.send(RelayMessage::Close);
            false
        });
        let closed = before - conns.len();
        for conn in conns.values_mut() {
            conn.alive = false;
            let _ = conn.sender.send(RelayMessage::Ping);
        }
        closed
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// How long a connection has been up. Exposed for diagnostics.
    pub async fn connected_at(&self, conn_id: ConnectionId) -> Option<Timestamp> {
        self.connections
            .read()
            .await
            .get(&conn_id)
            .map(|c| c.connected_at)
    }

    /// Send a Close to every connection, then clear the map.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// process stops.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(RelayMessage::Close);
        }
        conns.clear();
        tracing::info!(count, "Closed all relay connections");
    }
}

impl Default for RelayManager {
    fn default() -> Self {
        Self::new()
    }
}
