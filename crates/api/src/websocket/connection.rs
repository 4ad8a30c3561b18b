//! WebSocket connection management
//!
//! Represents one live client connection and its outbound event channel.

use tokio::sync::mpsc;
use uuid::Uuid;

use super::events::ServerEvent;

/// Represents an active WebSocket connection
#[derive(Debug)]
pub struct Connection {
    /// Ephemeral id for this connection; a reconnect always gets a new one
    pub connection_id: Uuid,

    /// Channel to send events to this connection
    pub sender: mpsc::UnboundedSender<ServerEvent>,
}

impl Connection {
    /// Create a new connection
    pub fn new(sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            sender,
        }
    }

    /// Send an event to this connection
    ///
    /// Returns Ok(()) if sent successfully, Err if connection is closed
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }

    /// Send an event, dropping it silently if the client has gone away
    pub fn notify(&self, event: ServerEvent) {
        if self.send(event).is_err() {
            tracing::debug!(
                connection_id = %self.connection_id,
                "Dropped event for closed connection"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_reaches_receiver() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = Connection::new(tx);

        conn.send(ServerEvent::Pong).unwrap();
        assert!(matches!(rx.recv().await, Some(ServerEvent::Pong)));
    }

    #[tokio::test]
    async fn test_notify_after_close_is_silent() {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Connection::new(tx);
        drop(rx);

        assert!(conn.sender.is_closed());
        conn.notify(ServerEvent::Pong);
        assert!(conn.send(ServerEvent::Pong).is_err());
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let a = Connection::new(tx.clone());
        let b = Connection::new(tx);
        assert_ne!(a.connection_id, b.connection_id);
    }
}
