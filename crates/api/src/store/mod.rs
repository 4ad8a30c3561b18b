//! Durable storage for call requests and chat messages
//!
//! Every state-changing call operation is a single conditional update: the
//! guard on the current status (and assignee, where relevant) is evaluated in
//! the same step as the write. A `None` result means the guard did not hold,
//! which is how concurrent accepts are resolved: first write wins.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use helpline_shared::{
    CallRequest, ChatMessage, CoreResult, FeedbackRating, NewCallRequest, NewChatMessage,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait CallStore: Send + Sync {
    /// Store a new request in `pending`
    async fn insert_call(&self, new: NewCallRequest, at: OffsetDateTime) -> CoreResult<CallRequest>;

    async fn get_call(&self, id: Uuid) -> CoreResult<Option<CallRequest>>;

    /// Unclaimed pool plus everything currently held by `staff_id`, oldest first
    async fn list_for_staff(&self, staff_id: &str) -> CoreResult<Vec<CallRequest>>;

    /// Every request, newest first
    async fn list_calls(&self) -> CoreResult<Vec<CallRequest>>;

    /// pending + unassigned -> assigned to `staff_id`
    async fn claim_call(
        &self,
        id: Uuid,
        staff_id: &str,
        staff_name: &str,
        at: OffsetDateTime,
    ) -> CoreResult<Option<CallRequest>>;

    /// assigned (held by `staff_id`) -> in-progress
    async fn mark_started(
        &self,
        id: Uuid,
        staff_id: &str,
        at: OffsetDateTime,
    ) -> CoreResult<Option<CallRequest>>;

    /// assigned | in-progress (held by `staff_id`) -> awaiting-feedback, with duration
    async fn mark_ended(
        &self,
        id: Uuid,
        staff_id: &str,
        at: OffsetDateTime,
    ) -> CoreResult<Option<CallRequest>>;

    /// held by `staff_id` -> pending, assignment and timing cleared
    async fn release_call(
        &self,
        id: Uuid,
        staff_id: &str,
        at: OffsetDateTime,
    ) -> CoreResult<Option<CallRequest>>;

    /// held and feedback not yet given -> completed
    async fn complete_call(
        &self,
        id: Uuid,
        rating: FeedbackRating,
        suggestion: Option<String>,
        at: OffsetDateTime,
    ) -> CoreResult<Option<CallRequest>>;

    /// Remove a request, returning what was removed
    async fn delete_call(&self, id: Uuid) -> CoreResult<Option<CallRequest>>;

    /// Cheap liveness check for health probes
    async fn ping(&self) -> CoreResult<()>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert_message(&self, new: NewChatMessage, at: OffsetDateTime) -> CoreResult<ChatMessage>;

    /// All messages of one thread in creation order
    async fn history(&self, connection_id: Uuid) -> CoreResult<Vec<ChatMessage>>;
}
