//! Presence registry
//!
//! Maps each live connection to the role and identity it registered with, so
//! events can be routed to "all staff" or "every connection of staff X".
//! Nothing here is durable: a restart or reconnect requires a fresh
//! registration.

use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use helpline_shared::ParticipantRole;

/// Presence data for one live connection
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceEntry {
    pub connection_id: Uuid,
    pub role: ParticipantRole,
    /// Staff identity, or `None` for anonymous users
    pub identity: Option<String>,
    pub display_name: Option<String>,
    pub connected_at: OffsetDateTime,
    pub registered_at: Option<OffsetDateTime>,
}

impl PresenceEntry {
    pub fn is_registered(&self) -> bool {
        self.registered_at.is_some()
    }

    pub fn is_staff(&self) -> bool {
        self.is_registered() && self.role.is_staff()
    }

    /// Best name to attribute messages to
    pub fn label(&self) -> Option<&str> {
        self.display_name.as_deref().or(self.identity.as_deref())
    }
}

/// Registry of live connections and who they belong to
#[derive(Default)]
pub struct PresenceRegistry {
    entries: Arc<RwLock<HashMap<Uuid, PresenceEntry>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly accepted connection before it registers
    pub async fn track(&self, connection_id: Uuid) {
        let mut entries = self.entries.write().await;
        entries.entry(connection_id).or_insert_with(|| PresenceEntry {
            connection_id,
            role: ParticipantRole::User,
            identity: None,
            display_name: None,
            connected_at: OffsetDateTime::now_utc(),
            registered_at: None,
        });
    }

    /// Register (or re-register) a connection. Last write wins.
    pub async fn register(
        &self,
        connection_id: Uuid,
        role: ParticipantRole,
        identity: Option<String>,
        display_name: Option<String>,
    ) -> PresenceEntry {
        let now = OffsetDateTime::now_utc();
        let mut entries = self.entries.write().await;
        let entry = entries.entry(connection_id).or_insert_with(|| PresenceEntry {
            connection_id,
            role,
            identity: None,
            display_name: None,
            connected_at: now,
            registered_at: None,
        });

        entry.role = role;
        entry.identity = identity;
        if display_name.is_some() {
            entry.display_name = display_name;
        }
        entry.registered_at = Some(now);

        tracing::debug!(
            connection_id = %connection_id,
            role = %entry.role,
            "Presence updated"
        );

        entry.clone()
    }

    pub async fn lookup_by_connection(&self, connection_id: &Uuid) -> Option<PresenceEntry> {
        let entries = self.entries.read().await;
        entries.get(connection_id).cloned()
    }

    /// Drop a connection. Absent entries are fine (disconnect before register).
    pub async fn forget(&self, connection_id: &Uuid) -> Option<PresenceEntry> {
        let mut entries = self.entries.write().await;
        let removed = entries.remove(connection_id);
        if let Some(entry) = &removed {
            tracing::debug!(
                connection_id = %connection_id,
                role = %entry.role,
                "Presence forgotten"
            );
        }
        removed
    }

    /// Connections registered as staff or admin
    pub async fn staff_connections(&self) -> Vec<Uuid> {
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|e| e.is_staff())
            .map(|e| e.connection_id)
            .collect()
    }

    /// Connections registered under a given staff identity
    pub async fn connections_for_identity(&self, identity: &str) -> Vec<Uuid> {
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|e| e.is_staff() && e.identity.as_deref() == Some(identity))
            .map(|e| e.connection_id)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
