//! Global WebSocket state management
//!
//! Maintains every live connection plus the presence registry, and delivers
//! outbound events to one connection, to all staff, or to everyone.
//! Delivery to a connection that has gone away is a silent drop.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connection::Connection;
use super::events::ServerEvent;
use crate::presence::PresenceRegistry;

/// Global WebSocket state shared across all connections
#[derive(Clone)]
pub struct WebSocketState {
    /// All active connections indexed by connection_id
    pub connections: Arc<RwLock<HashMap<Uuid, Arc<Connection>>>>,

    /// Role and identity of each connection
    pub presence: Arc<PresenceRegistry>,
}

impl WebSocketState {
    /// Create new WebSocket state
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            presence: Arc::new(PresenceRegistry::new()),
        }
    }

    /// Add a connection
    pub async fn add_connection(&self, conn: Connection) -> Arc<Connection> {
        let conn = Arc::new(conn);
        let total = {
            let mut connections = self.connections.write().await;
            connections.insert(conn.connection_id, Arc::clone(&conn));
            connections.len()
        };
        self.presence.track(conn.connection_id).await;

        tracing::info!(
            connection_id = %conn.connection_id,
            total_connections = total,
            "WebSocket connection added"
        );

        conn
    }

    /// Remove a connection and forget its presence.
    ///
    /// Calls and chats it was part of are left untouched.
    pub async fn remove_connection(&self, connection_id: &Uuid) {
        let removed = {
            let mut connections = self.connections.write().await;
            connections.remove(connection_id).map(|_| connections.len())
        };
        let presence = self.presence.forget(connection_id).await;

        if let Some(remaining) = removed {
            tracing::info!(
                connection_id = %connection_id,
                role = ?presence.as_ref().map(|p| p.role),
                identity = ?presence.as_ref().and_then(|p| p.identity.clone()),
                remaining_connections = remaining,
                "WebSocket connection removed"
            );
        }
    }

    /// Get a connection by id
    pub async fn get_connection(&self, connection_id: &Uuid) -> Option<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections.get(connection_id).cloned()
    }

    /// Get total number of active connections
    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    /// Deliver to one connection. Returns whether it was live.
    pub async fn send_to(&self, connection_id: &Uuid, event: ServerEvent) -> bool {
        match self.get_connection(connection_id).await {
            Some(conn) => conn.send(event).is_ok(),
            None => {
                tracing::debug!(
                    connection_id = %connection_id,
                    "Recipient not connected, event dropped"
                );
                false
            }
        }
    }

    /// Deliver to every staff connection, optionally skipping one
    pub async fn send_to_staff(&self, event: ServerEvent, except: Option<Uuid>) -> usize {
        let targets: Vec<Uuid> = self
            .presence
            .staff_connections()
            .await
            .into_iter()
            .filter(|id| Some(*id) != except)
            .collect();
        self.send_to_many(&targets, event).await
    }

    /// Deliver to every connection registered under a staff identity
    pub async fn send_to_identity(&self, identity: &str, event: ServerEvent) -> usize {
        let targets = self.presence.connections_for_identity(identity).await;
        self.send_to_many(&targets, event).await
    }

    /// Deliver to every live connection
    pub async fn broadcast(&self, event: ServerEvent) -> usize {
        let connections = self.connections.read().await;
        let mut delivered = 0;
        for conn in connections.values() {
            if conn.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    async fn send_to_many(&self, targets: &[Uuid], event: ServerEvent) -> usize {
        let connections = self.connections.read().await;
        let mut success_count = 0;
        let mut failed_count = 0;

        for id in targets {
            let Some(conn) = connections.get(id) else {
                continue;
            };
            match conn.send(event.clone()) {
                Ok(()) => success_count += 1,
                Err(_) => {
                    failed_count += 1;
                    tracing::warn!(
                        connection_id = %conn.connection_id,
                        "Failed to send event to connection (likely closed)"
                    );
                }
            }
        }

        tracing::debug!(
            recipients = success_count,
            failed = failed_count,
            "Fanned out event"
        );

        success_count
    }
}

impl Default for WebSocketState {
    fn default() -> Self {
        Self::new()
    }
}
