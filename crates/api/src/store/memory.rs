//! In-memory store
//!
//! Backs tests and the database-less dev mode. Each conditional transition
//! holds the write lock across its check and its update.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use helpline_shared::{
    call_duration_seconds, CallRequest, CallStatus, ChatMessage, CoreResult, FeedbackRating,
    NewCallRequest, NewChatMessage,
};

use super::{CallStore, MessageStore};

#[derive(Clone, Default)]
pub struct MemoryStore {
    calls: Arc<RwLock<HashMap<Uuid, CallRequest>>>,
    messages: Arc<RwLock<Vec<ChatMessage>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `update` only if `guard` holds, as one step under the write lock
    async fn transition<G, U>(&self, id: Uuid, guard: G, update: U) -> Option<CallRequest>
    where
        G: FnOnce(&CallRequest) -> bool,
        U: FnOnce(&mut CallRequest),
    {
        let mut calls = self.calls.write().await;
        let call = calls.get_mut(&id)?;
        if !guard(call) {
            return None;
        }
        update(call);
        Some(call.clone())
    }
}

#[async_trait]
impl CallStore for MemoryStore {
    async fn insert_call(&self, new: NewCallRequest, at: OffsetDateTime) -> CoreResult<CallRequest> {
        let call = CallRequest {
            id: Uuid::new_v4(),
            name: new.name,
            phone: new.phone,
            language: new.language,
            preferred_time: new.preferred_time,
            notes: new.notes,
            submitted_by: new.submitted_by,
            origin_connection_id: new.origin_connection_id,
            status: CallStatus::Pending,
            assigned_to: None,
            assigned_to_name: None,
            assigned_at: None,
            call_started_at: None,
            call_ended_at: None,
            duration_seconds: None,
            rating: None,
            suggestion: None,
            feedback_done: false,
            completed_at: None,
            created_at: at,
            updated_at: at,
        };

        let mut calls = self.calls.write().await;
        calls.insert(call.id, call.clone());
        Ok(call)
    }

    async fn get_call(&self, id: Uuid) -> CoreResult<Option<CallRequest>> {
        let calls = self.calls.read().await;
        Ok(calls.get(&id).cloned())
    }

    async fn list_for_staff(&self, staff_id: &str) -> CoreResult<Vec<CallRequest>> {
        let calls = self.calls.read().await;
        let mut visible: Vec<CallRequest> = calls
            .values()
            .filter(|c| c.visible_to(staff_id))
            .cloned()
            .collect();
        visible.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(visible)
    }

    async fn list_calls(&self) -> CoreResult<Vec<CallRequest>> {
        let calls = self.calls.read().await;
        let mut all: Vec<CallRequest> = calls.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn claim_call(
        &self,
        id: Uuid,
        staff_id: &str,
        staff_name: &str,
        at: OffsetDateTime,
    ) -> CoreResult<Option<CallRequest>> {
        Ok(self
            .transition(id, CallRequest::is_unclaimed, |c| {
                c.status = CallStatus::Assigned;
                c.assigned_to = Some(staff_id.to_string());
                c.assigned_to_name = Some(staff_name.to_string());
                c.assigned_at = Some(at);
                c.updated_at = at;
            })
            .await)
    }

    async fn mark_started(
        &self,
        id: Uuid,
        staff_id: &str,
        at: OffsetDateTime,
    ) -> CoreResult<Option<CallRequest>> {
        Ok(self
            .transition(
                id,
                |c| c.status == CallStatus::Assigned && c.assigned_to.as_deref() == Some(staff_id),
                |c| {
                    c.status = CallStatus::InProgress;
                    c.call_started_at = Some(at);
                    c.updated_at = at;
                },
            )
            .await)
    }

    async fn mark_ended(
        &self,
        id: Uuid,
        staff_id: &str,
        at: OffsetDateTime,
    ) -> CoreResult<Option<CallRequest>> {
        Ok(self
            .transition(
                id,
                |c| {
                    matches!(c.status, CallStatus::Assigned | CallStatus::InProgress)
                        && c.assigned_to.as_deref() == Some(staff_id)
                },
                |c| {
                    let from = c.call_started_at.or(c.assigned_at).unwrap_or(at);
                    c.status = CallStatus::AwaitingFeedback;
                    c.call_ended_at = Some(at);
                    c.duration_seconds = Some(call_duration_seconds(from, at));
                    c.updated_at = at;
                },
            )
            .await)
    }

    async fn release_call(
        &self,
        id: Uuid,
        staff_id: &str,
        at: OffsetDateTime,
    ) -> CoreResult<Option<CallRequest>> {
        Ok(self
            .transition(
                id,
                |c| c.is_held_by(staff_id),
                |c| {
                    c.status = CallStatus::Pending;
                    c.assigned_to = None;
                    c.assigned_to_name = None;
                    c.assigned_at = None;
                    c.call_started_at = None;
                    c.call_ended_at = None;
                    c.duration_seconds = None;
                    c.updated_at = at;
                },
            )
            .await)
    }

    async fn complete_call(
        &self,
        id: Uuid,
        rating: FeedbackRating,
        suggestion: Option<String>,
        at: OffsetDateTime,
    ) -> CoreResult<Option<CallRequest>> {
        Ok(self
            .transition(
                id,
                |c| c.status.is_held() && !c.feedback_done,
                |c| {
                    if c.call_ended_at.is_none() {
                        let from = c.call_started_at.or(c.assigned_at).unwrap_or(at);
                        c.call_ended_at = Some(at);
                        c.duration_seconds = Some(call_duration_seconds(from, at));
                    }
                    c.status = CallStatus::Completed;
                    c.rating = Some(rating);
                    c.suggestion = suggestion;
                    c.feedback_done = true;
                    c.completed_at = Some(at);
                    c.updated_at = at;
                },
            )
            .await)
    }

    async fn delete_call(&self, id: Uuid) -> CoreResult<Option<CallRequest>> {
        let mut calls = self.calls.write().await;
        Ok(calls.remove(&id))
    }

    async fn ping(&self) -> CoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert_message(&self, new: NewChatMessage, at: OffsetDateTime) -> CoreResult<ChatMessage> {
        let message = ChatMessage {
            id: Uuid::new_v4(),
            connection_id: new.connection_id,
            sender_role: new.sender_role,
            sender_name: new.sender_name,
            text: new.text,
            created_at: at,
        };

        let mut messages = self.messages.write().await;
        messages.push(message.clone());
        Ok(message)
    }

    async fn history(&self, connection_id: Uuid) -> CoreResult<Vec<ChatMessage>> {
        let messages = self.messages.read().await;
        // Insertion order already matches creation order
        Ok(messages
            .iter()
            .filter(|m| m.connection_id == connection_id)
            .cloned()
            .collect())
    }
}
