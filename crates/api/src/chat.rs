//! Chat router
//!
//! Relays free text between an anonymous user connection and the staff pool.
//! A thread is keyed by the user's connection id. User messages go to every
//! staff connection; staff replies go only to the target connection. Every
//! message is persisted before delivery, so a dropped delivery is still in
//! history.

use std::sync::Arc;
use uuid::Uuid;

use helpline_shared::{
    ChatMessage, CoreError, CoreResult, FieldError, NewChatMessage, ParticipantRole,
    MAX_NAME_CHARS,
};

use crate::clock::Clock;
use crate::presence::PresenceEntry;
use crate::store::MessageStore;
use crate::websocket::{events::ServerEvent, state::WebSocketState};

const GUEST_NAME: &str = "Guest";
const STAFF_NAME: &str = "Staff";

pub struct ChatRouter {
    store: Arc<dyn MessageStore>,
    hub: WebSocketState,
    max_chars: usize,
    clock: Arc<dyn Clock>,
}

impl ChatRouter {
    pub fn new(
        store: Arc<dyn MessageStore>,
        hub: WebSocketState,
        clock: Arc<dyn Clock>,
        max_chars: usize,
    ) -> Self {
        Self {
            store,
            hub,
            max_chars,
            clock,
        }
    }

    /// Attach a display name to a user connection. Idempotent.
    pub async fn register_user(
        &self,
        connection_id: Uuid,
        display_name: &str,
    ) -> CoreResult<PresenceEntry> {
        let name = display_name_of(Some(display_name))?;
        Ok(self
            .hub
            .presence
            .register(connection_id, ParticipantRole::User, None, name)
            .await)
    }

    /// Persist a user's message and hand it to every staff connection
    pub async fn send_from_user(
        &self,
        connection_id: Uuid,
        text: &str,
        display_name: Option<&str>,
    ) -> CoreResult<ChatMessage> {
        let text = self.validate_text(text)?;

        let sender_name = match display_name_of(display_name)? {
            Some(name) => name,
            None => self
                .hub
                .presence
                .lookup_by_connection(&connection_id)
                .await
                .and_then(|p| p.display_name)
                .unwrap_or_else(|| GUEST_NAME.to_string()),
        };

        let message = self
            .store
            .insert_message(
                NewChatMessage {
                    connection_id,
                    sender_role: ParticipantRole::User,
                    sender_name,
                    text,
                },
                self.clock.now(),
            )
            .await?;

        let delivered = self
            .hub
            .send_to_staff(ServerEvent::NewMessage { message: message.clone() }, None)
            .await;

        tracing::debug!(
            connection_id = %connection_id,
            message_id = %message.id,
            staff_recipients = delivered,
            "User message relayed"
        );

        Ok(message)
    }

    /// Persist a staff reply and deliver it to `target` if still connected.
    ///
    /// Returns the stored message and whether live delivery happened.
    pub async fn send_from_staff(
        &self,
        target: Uuid,
        text: &str,
        staff_name: Option<&str>,
    ) -> CoreResult<(ChatMessage, bool)> {
        let text = self.validate_text(text)?;
        let sender_name = staff_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(STAFF_NAME)
            .to_string();

        let message = self
            .store
            .insert_message(
                NewChatMessage {
                    connection_id: target,
                    sender_role: ParticipantRole::Staff,
                    sender_name,
                    text,
                },
                self.clock.now(),
            )
            .await?;

        let delivered = self
            .hub
            .send_to(&target, ServerEvent::NewMessage { message: message.clone() })
            .await;

        if !delivered {
            tracing::debug!(
                connection_id = %target,
                message_id = %message.id,
                "Staff reply stored for offline connection"
            );
        }

        Ok((message, delivered))
    }

    /// Every message in a thread, oldest first
    pub async fn history(&self, connection_id: Uuid) -> CoreResult<Vec<ChatMessage>> {
        self.store.history(connection_id).await
    }

    fn validate_text(&self, text: &str) -> CoreResult<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CoreError::Validation(vec![FieldError::new(
                "text",
                "Message cannot be empty",
            )]));
        }
        if text.chars().count() > self.max_chars {
            return Err(CoreError::Validation(vec![FieldError::new(
                "text",
                format!("Message must be at most {} characters", self.max_chars),
            )]));
        }
        Ok(text.to_string())
    }
}

/// Trimmed name, `None` when blank. Capped like call-request names.
fn display_name_of(raw: Option<&str>) -> CoreResult<Option<String>> {
    let Some(name) = raw.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(CoreError::Validation(vec![FieldError::new(
            "display_name",
            format!("Name must be at most {} characters", MAX_NAME_CHARS),
        )]));
    }
    Ok(Some(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::store::MemoryStore;
    use crate::websocket::connection::Connection;
    use tokio::sync::mpsc;

    fn router(hub: &WebSocketState) -> ChatRouter {
        ChatRouter::new(
            Arc::new(MemoryStore::new()),
            hub.clone(),
            Arc::new(SystemClock),
            20,
        )
    }

    async fn connect(
        hub: &WebSocketState,
    ) -> (Arc<Connection>, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (hub.add_connection(Connection::new(tx)).await, rx)
    }

    #[tokio::test]
    async fn test_user_message_reaches_all_staff() {
        let hub = WebSocketState::new();
        let chat = router(&hub);
        let (user, mut user_rx) = connect(&hub).await;
        let (a, mut a_rx) = connect(&hub).await;
        let (b, mut b_rx) = connect(&hub).await;
        for (conn, id) in [(&a, "a"), (&b, "b")] {
            hub.presence
                .register(conn.connection_id, ParticipantRole::Staff, Some(id.into()), None)
                .await;
        }
        chat.register_user(user.connection_id, "Ravi").await.unwrap();

        let message = chat
            .send_from_user(user.connection_id, " hello ", None)
            .await
            .unwrap();

        assert_eq!(message.text, "hello");
        assert_eq!(message.sender_name, "Ravi");
        assert_eq!(message.sender_role, ParticipantRole::User);
        assert!(matches!(a_rx.try_recv(), Ok(ServerEvent::NewMessage { .. })));
        assert!(matches!(b_rx.try_recv(), Ok(ServerEvent::NewMessage { .. })));
        assert!(user_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_anonymous_user_is_guest() {
        let hub = WebSocketState::new();
        let chat = router(&hub);
        let (user, _rx) = connect(&hub).await;

        let message = chat.send_from_user(user.connection_id, "hi", None).await.unwrap();
        assert_eq!(message.sender_name, "Guest");
    }

    #[tokio::test]
    async fn test_staff_reply_to_gone_connection_is_kept() {
        let hub = WebSocketState::new();
        let chat = router(&hub);
        let (user, _rx) = connect(&hub).await;
        chat.send_from_user(user.connection_id, "help", None).await.unwrap();
        hub.remove_connection(&user.connection_id).await;

        let (message, delivered) = chat
            .send_from_staff(user.connection_id, "calling you now", Some("Meera"))
            .await
            .unwrap();

        assert!(!delivered);
        assert_eq!(message.sender_role, ParticipantRole::Staff);
        let history = chat.history(user.connection_id).await.unwrap();
        let texts: Vec<_> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["help", "calling you now"]);
    }

    #[tokio::test]
    async fn test_staff_reply_goes_only_to_target() {
        let hub = WebSocketState::new();
        let chat = router(&hub);
        let (target, mut target_rx) = connect(&hub).await;
        let (other, mut other_rx) = connect(&hub).await;
        chat.register_user(other.connection_id, "Other").await.unwrap();

        let (_, delivered) = chat
            .send_from_staff(target.connection_id, "hello", None)
            .await
            .unwrap();

        assert!(delivered);
        assert!(matches!(
            target_rx.try_recv(),
            Ok(ServerEvent::NewMessage { message }) if message.sender_name == "Staff"
        ));
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rejects_empty_and_oversized_text() {
        let hub = WebSocketState::new();
        let chat = router(&hub);
        let id = Uuid::new_v4();

        for text in ["   ", "this message is far too long"] {
            let err = chat.send_from_user(id, text, None).await.unwrap_err();
            assert!(matches!(err, CoreError::Validation(_)));
        }
        assert!(chat.history(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overlong_display_name_is_refused() {
        let hub = WebSocketState::new();
        let chat = router(&hub);
        let (user, _rx) = connect(&hub).await;
        let long_name = "n".repeat(MAX_NAME_CHARS + 1);

        let err = chat
            .send_from_user(user.connection_id, "hi", Some(&long_name))
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            CoreError::Validation(fields) if fields[0].field == "display_name"
        ));
        assert!(chat.history(user.connection_id).await.unwrap().is_empty());

        assert!(chat.register_user(user.connection_id, &long_name).await.is_err());
        let at_cap = "n".repeat(MAX_NAME_CHARS);
        let message = chat
            .send_from_user(user.connection_id, "hi", Some(&at_cap))
            .await
            .unwrap();
        assert_eq!(message.sender_name, at_cap);
    }
}
