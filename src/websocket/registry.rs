use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::connection::{Connection, ConnectionId};

/// The set of live, handshaken connections.
///
/// Shared by `Arc` between the accept path, every session and the
/// dispatcher. Readers only ever see a cloned snapshot, so removal never
/// races an in-flight broadcast.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<Vec<Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection and returns its id. Registering the same id twice
    /// keeps a single entry.
    pub async fn register(&self, connection: Connection) -> ConnectionId {
        let id = connection.id();
        let peer_addr = connection.peer_addr().to_string();
        let mut connections = self.connections.write().await;
        if !connections.iter().any(|c| c.id() == id) {
            connections.push(Arc::new(connection));
        }
        info!(
            "Registered connection {} from {}. Total connections: {}",
            id,
            peer_addr,
            connections.len()
        );
        id
    }

    /// Removes a connection. Returns whether it was present; a second
    /// call for the same id is a no-op.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;
        match connections.iter().position(|c| c.id() == id) {
            Some(index) => {
                let connection = connections.remove(index);
                info!(
                    "Unregistered connection {} from {} (connected since {}). Remaining: {}",
                    id,
                    connection.peer_addr(),
                    connection.connected_at().to_rfc3339(),
                    connections.len()
                );
                true
            }
            None => {
                debug!("Connection {} already unregistered", id);
                false
            }
        }
    }

    /// Point-in-time copy in registration order.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().await.clone()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().await.iter().any(|c| c.id() == id)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn get_all_connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.read().await.iter().map(|c| c.id()).collect()
    }
}
