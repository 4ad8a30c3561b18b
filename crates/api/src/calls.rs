//! Call queue
//!
//! Owns the call-request lifecycle:
//!
//! ```text
//! pending --accept--> assigned --start--> in-progress --end--> awaiting-feedback --feedback--> completed
//! assigned | in-progress | awaiting-feedback --reject--> pending (assignment cleared)
//! any --admin delete--> removed
//! ```
//!
//! Each transition is one conditional store update. When the guard fails the
//! record is re-read only to pick the right error; the decision itself has
//! already been made atomically by the store.

use std::sync::Arc;
use uuid::Uuid;

use helpline_shared::{
    CallRequest, CallRequestForm, CoreError, CoreResult, FeedbackRating, ParticipantRole,
};

use crate::clock::Clock;
use crate::store::CallStore;
use crate::websocket::{events::ServerEvent, state::WebSocketState};

pub struct CallQueue {
    store: Arc<dyn CallStore>,
    hub: WebSocketState,
    clock: Arc<dyn Clock>,
}

impl CallQueue {
    pub fn new(store: Arc<dyn CallStore>, hub: WebSocketState, clock: Arc<dyn Clock>) -> Self {
        Self { store, hub, clock }
    }

    pub fn store(&self) -> &Arc<dyn CallStore> {
        &self.store
    }

    /// Validate and store a new request, then announce it to all staff
    pub async fn submit(
        &self,
        form: CallRequestForm,
        submitted_by: ParticipantRole,
        origin_connection_id: Option<Uuid>,
    ) -> CoreResult<CallRequest> {
        let new = form.validate(submitted_by, origin_connection_id)?;
        let call = self.store.insert_call(new, self.clock.now()).await?;

        tracing::info!(
            request_id = %call.id,
            submitted_by = %call.submitted_by,
            "Call request submitted"
        );

        self.hub
            .send_to_staff(ServerEvent::NewCallRequest { request: call.clone() }, None)
            .await;

        Ok(call)
    }

    /// Claim a pending request for `staff_id`.
    ///
    /// Exactly one of any number of concurrent accepts succeeds; the rest get
    /// `CoreError::Conflict`. `via` is the accepting connection, which gets the
    /// confirmation while every other staff connection drops the request from
    /// its pool.
    pub async fn accept(
        &self,
        request_id: Uuid,
        staff_id: &str,
        staff_name: &str,
        via: Option<Uuid>,
    ) -> CoreResult<CallRequest> {
        let claimed = self
            .store
            .claim_call(request_id, staff_id, staff_name, self.clock.now())
            .await?;

        let Some(call) = claimed else {
            return Err(match self.store.get_call(request_id).await? {
                None => CoreError::NotFound(format!("call request {}", request_id)),
                Some(current) => {
                    tracing::warn!(
                        request_id = %request_id,
                        staff_id = %staff_id,
                        holder = ?current.assigned_to,
                        status = %current.status,
                        "Accept lost the race"
                    );
                    CoreError::Conflict("This request was just taken".to_string())
                }
            });
        };

        tracing::info!(request_id = %request_id, staff_id = %staff_id, "Call request accepted");

        let assigned = ServerEvent::CallAssigned { request: call.clone() };
        match via {
            Some(connection_id) => {
                self.hub.send_to(&connection_id, assigned).await;
            }
            None => {
                self.hub.send_to_identity(staff_id, assigned).await;
            }
        }
        self.hub
            .send_to_staff(ServerEvent::CallRemovedFromPool { request_id }, via)
            .await;

        Ok(call)
    }

    /// assigned -> in-progress for the holder; starts the staff client's timer
    pub async fn start(&self, request_id: Uuid, staff_id: &str) -> CoreResult<CallRequest> {
        let started = self
            .store
            .mark_started(request_id, staff_id, self.clock.now())
            .await?;
        let Some(call) = started else {
            return Err(self.explain(request_id, "start", Some(staff_id)).await);
        };

        tracing::info!(request_id = %request_id, staff_id = %staff_id, "Call started");

        self.hub
            .send_to_identity(staff_id, ServerEvent::CallStarted { request: call.clone() })
            .await;

        Ok(call)
    }

    /// assigned | in-progress -> awaiting-feedback; asks the caller for a rating
    pub async fn end(&self, request_id: Uuid, staff_id: &str) -> CoreResult<CallRequest> {
        let ended = self
            .store
            .mark_ended(request_id, staff_id, self.clock.now())
            .await?;
        let Some(call) = ended else {
            return Err(self.explain(request_id, "end", Some(staff_id)).await);
        };

        tracing::info!(
            request_id = %request_id,
            staff_id = %staff_id,
            duration_seconds = ?call.duration_seconds,
            "Call ended"
        );

        self.hub
            .send_to_identity(staff_id, ServerEvent::CallEnded { request: call.clone() })
            .await;
        if let Some(origin) = call.origin_connection_id {
            self.hub
                .send_to(&origin, ServerEvent::FeedbackRequested { request_id })
                .await;
        }

        Ok(call)
    }

    /// Hand a held request back to the pool
    pub async fn reject(&self, request_id: Uuid, staff_id: &str) -> CoreResult<CallRequest> {
        let released = self
            .store
            .release_call(request_id, staff_id, self.clock.now())
            .await?;
        let Some(call) = released else {
            return Err(self.explain(request_id, "reject", Some(staff_id)).await);
        };

        tracing::info!(request_id = %request_id, staff_id = %staff_id, "Call re-queued");

        self.hub
            .send_to_staff(ServerEvent::CallRequeued { request: call.clone() }, None)
            .await;

        Ok(call)
    }

    /// Record the caller's rating and complete the request. Succeeds once.
    pub async fn submit_feedback(
        &self,
        request_id: Uuid,
        rating: FeedbackRating,
        suggestion: Option<String>,
    ) -> CoreResult<CallRequest> {
        let suggestion = suggestion
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let completed = self
            .store
            .complete_call(request_id, rating, suggestion, self.clock.now())
            .await?;
        let Some(call) = completed else {
            return Err(self.explain(request_id, "submit feedback for", None).await);
        };

        tracing::info!(request_id = %request_id, rating = %rating, "Call completed");

        let updated = ServerEvent::CallUpdated { request: call.clone() };
        if let Some(origin) = call.origin_connection_id {
            self.hub.send_to(&origin, updated.clone()).await;
        }
        self.hub.send_to_staff(updated, call.origin_connection_id).await;

        Ok(call)
    }

    /// The unclaimed pool plus every request `staff_id` currently holds
    pub async fn list_for_staff(&self, staff_id: &str) -> CoreResult<Vec<CallRequest>> {
        self.store.list_for_staff(staff_id).await
    }

    /// Every request, newest first
    pub async fn list_all(&self) -> CoreResult<Vec<CallRequest>> {
        self.store.list_calls().await
    }

    /// Remove a request and tell every client to drop its copy
    pub async fn delete(&self, request_id: Uuid) -> CoreResult<CallRequest> {
        let call = self
            .store
            .delete_call(request_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("call request {}", request_id)))?;

        tracing::info!(request_id = %request_id, status = %call.status, "Call request deleted");

        self.hub.broadcast(ServerEvent::CallDeleted { request_id }).await;

        Ok(call)
    }

    /// Turn a failed guard into the error the caller should see
    async fn explain(&self, request_id: Uuid, action: &'static str, staff_id: Option<&str>) -> CoreError {
        match self.store.get_call(request_id).await {
            Ok(None) => CoreError::NotFound(format!("call request {}", request_id)),
            Ok(Some(current)) => match staff_id {
                Some(staff) if current.status.is_held() && !current.is_held_by(staff) => {
                    CoreError::Conflict("This request is held by another staff member".to_string())
                }
                _ => CoreError::InvalidTransition {
                    action,
                    from: current.status.to_string(),
                },
            },
            Err(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use crate::websocket::connection::Connection;
    use helpline_shared::CallStatus;
    use time::macros::datetime;
    use time::Duration;
    use tokio::sync::mpsc;

    struct Harness {
        queue: CallQueue,
        hub: WebSocketState,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let hub = WebSocketState::new();
        let clock = Arc::new(ManualClock::new(datetime!(2025-04-01 10:00:00 UTC)));
        let queue = CallQueue::new(Arc::new(MemoryStore::new()), hub.clone(), clock.clone());
        Harness { queue, hub, clock }
    }

    async fn staff(
        hub: &WebSocketState,
        id: &str,
    ) -> (Arc<Connection>, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = hub.add_connection(Connection::new(tx)).await;
        hub.presence
            .register(conn.connection_id, ParticipantRole::Staff, Some(id.into()), None)
            .await;
        (conn, rx)
    }

    fn form() -> CallRequestForm {
        CallRequestForm {
            name: "Asha".into(),
            phone: "9876543210".into(),
            ..Default::default()
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    #[tokio::test]
    async fn test_submit_announces_to_staff() {
        let h = harness();
        let (_a, mut a_rx) = staff(&h.hub, "staff-a").await;

        let call = h.queue.submit(form(), ParticipantRole::User, None).await.unwrap();

        assert_eq!(call.status, CallStatus::Pending);
        assert!(matches!(
            drain(&mut a_rx).as_slice(),
            [ServerEvent::NewCallRequest { request }] if request.id == call.id
        ));
    }

    #[tokio::test]
    async fn test_submit_validation_stores_nothing() {
        let h = harness();
        let err = h
            .queue
            .submit(CallRequestForm::default(), ParticipantRole::User, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(h.queue.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_accept_conflicts() {
        let h = harness();
        let (a, mut a_rx) = staff(&h.hub, "staff-a").await;
        let (b, mut b_rx) = staff(&h.hub, "staff-b").await;
        let call = h.queue.submit(form(), ParticipantRole::User, None).await.unwrap();
        drain(&mut a_rx);
        drain(&mut b_rx);

        h.queue
            .accept(call.id, "staff-a", "A", Some(a.connection_id))
            .await
            .unwrap();
        let err = h
            .queue
            .accept(call.id, "staff-b", "B", Some(b.connection_id))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Conflict(_)));
        assert!(matches!(drain(&mut a_rx).as_slice(), [ServerEvent::CallAssigned { .. }]));
        assert!(matches!(
            drain(&mut b_rx).as_slice(),
            [ServerEvent::CallRemovedFromPool { request_id }] if *request_id == call.id
        ));
    }

    #[tokio::test]
    async fn test_accept_missing_request_is_not_found() {
        let h = harness();
        let err = h
            .queue
            .accept(Uuid::new_v4(), "staff-a", "A", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_start_requires_assigned() {
        let h = harness();
        let call = h.queue.submit(form(), ParticipantRole::User, None).await.unwrap();

        let err = h.queue.start(call.id, "staff-a").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { action: "start", .. }));

        h.queue.accept(call.id, "staff-a", "A", None).await.unwrap();
        h.queue.start(call.id, "staff-a").await.unwrap();
        let err = h.queue.start(call.id, "staff-a").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_start_by_non_holder_conflicts() {
        let h = harness();
        let call = h.queue.submit(form(), ParticipantRole::User, None).await.unwrap();
        h.queue.accept(call.id, "staff-a", "A", None).await.unwrap();

        let err = h.queue.start(call.id, "staff-b").await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let stored = h.queue.store().get_call(call.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CallStatus::Assigned);
        assert!(stored.call_started_at.is_none());
    }

    #[tokio::test]
    async fn test_duration_is_whole_seconds() {
        let h = harness();
        let call = h.queue.submit(form(), ParticipantRole::User, None).await.unwrap();
        h.queue.accept(call.id, "staff-a", "A", None).await.unwrap();
        h.clock.advance(Duration::seconds(30));
        h.queue.start(call.id, "staff-a").await.unwrap();
        h.clock.advance(Duration::seconds(125));

        let ended = h.queue.end(call.id, "staff-a").await.unwrap();
        assert_eq!(ended.duration_seconds, Some(125));
        assert_eq!(ended.status, CallStatus::AwaitingFeedback);
    }

    #[tokio::test]
    async fn test_end_by_non_holder_conflicts() {
        let h = harness();
        let call = h.queue.submit(form(), ParticipantRole::User, None).await.unwrap();
        h.queue.accept(call.id, "staff-a", "A", None).await.unwrap();

        let err = h.queue.end(call.id, "staff-b").await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_end_outside_a_live_call_is_refused() {
        let h = harness();
        let call = h.queue.submit(form(), ParticipantRole::User, None).await.unwrap();

        let err = h.queue.end(call.id, "staff-a").await.unwrap_err();
        assert!(matches!(
            &err,
            CoreError::InvalidTransition { action: "end", from } if from.as_str() == "pending"
        ));
        let stored = h.queue.store().get_call(call.id).await.unwrap().unwrap();
        assert!(stored.call_ended_at.is_none());
        assert!(stored.duration_seconds.is_none());

        h.queue.accept(call.id, "staff-a", "A", None).await.unwrap();
        h.clock.advance(Duration::seconds(40));
        let ended = h.queue.end(call.id, "staff-a").await.unwrap();

        h.clock.advance(Duration::seconds(60));
        let err = h.queue.end(call.id, "staff-a").await.unwrap_err();
        assert!(matches!(
            &err,
            CoreError::InvalidTransition { action: "end", from } if from.as_str() == "awaiting-feedback"
        ));
        let stored = h.queue.store().get_call(call.id).await.unwrap().unwrap();
        assert_eq!(stored.call_ended_at, ended.call_ended_at);
        assert_eq!(stored.duration_seconds, Some(40));

        h.queue
            .submit_feedback(call.id, FeedbackRating::Good, None)
            .await
            .unwrap();
        let err = h.queue.end(call.id, "staff-a").await.unwrap_err();
        assert!(matches!(
            &err,
            CoreError::InvalidTransition { action: "end", from } if from.as_str() == "completed"
        ));
        let stored = h.queue.store().get_call(call.id).await.unwrap().unwrap();
        assert_eq!(stored.call_ended_at, ended.call_ended_at);
        assert_eq!(stored.duration_seconds, Some(40));
    }

    #[tokio::test]
    async fn test_reject_requeues_for_everyone() {
        let h = harness();
        let (_b, mut b_rx) = staff(&h.hub, "staff-b").await;
        let call = h.queue.submit(form(), ParticipantRole::User, None).await.unwrap();
        h.queue.accept(call.id, "staff-a", "A", None).await.unwrap();
        drain(&mut b_rx);

        let requeued = h.queue.reject(call.id, "staff-a").await.unwrap();

        assert_eq!(requeued.status, CallStatus::Pending);
        assert!(requeued.assigned_to.is_none());
        for staff_id in ["staff-a", "staff-b"] {
            let ids: Vec<_> = h
                .queue
                .list_for_staff(staff_id)
                .await
                .unwrap()
                .into_iter()
                .map(|c| c.id)
                .collect();
            assert_eq!(ids, vec![call.id]);
        }
        assert!(matches!(drain(&mut b_rx).as_slice(), [ServerEvent::CallRequeued { .. }]));
    }

    #[tokio::test]
    async fn test_reject_after_end_resets_timing_and_blocks_feedback() {
        let h = harness();
        let call = h.queue.submit(form(), ParticipantRole::User, None).await.unwrap();
        h.queue.accept(call.id, "staff-a", "A", None).await.unwrap();
        h.queue.start(call.id, "staff-a").await.unwrap();
        h.clock.advance(Duration::seconds(90));
        let ended = h.queue.end(call.id, "staff-a").await.unwrap();
        assert_eq!(ended.status, CallStatus::AwaitingFeedback);

        let requeued = h.queue.reject(call.id, "staff-a").await.unwrap();

        assert_eq!(requeued.status, CallStatus::Pending);
        assert!(requeued.assigned_to.is_none());
        assert!(requeued.call_started_at.is_none());
        assert!(requeued.call_ended_at.is_none());
        assert!(requeued.duration_seconds.is_none());

        let err = h
            .queue
            .submit_feedback(call.id, FeedbackRating::Good, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        let stored = h.queue.store().get_call(call.id).await.unwrap().unwrap();
        assert!(!stored.feedback_done);
        assert!(stored.rating.is_none());
    }

    #[tokio::test]
    async fn test_feedback_completes_once() {
        let h = harness();
        let call = h.queue.submit(form(), ParticipantRole::User, None).await.unwrap();
        h.queue.accept(call.id, "staff-a", "A", None).await.unwrap();
        h.queue.end(call.id, "staff-a").await.unwrap();

        let done = h
            .queue
            .submit_feedback(call.id, FeedbackRating::Excellent, Some("  thanks ".into()))
            .await
            .unwrap();
        assert_eq!(done.status, CallStatus::Completed);
        assert!(done.feedback_done);
        assert_eq!(done.suggestion.as_deref(), Some("thanks"));

        let err = h
            .queue
            .submit_feedback(call.id, FeedbackRating::Poor, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        let stored = h.queue.store().get_call(call.id).await.unwrap().unwrap();
        assert_eq!(stored.rating, Some(FeedbackRating::Excellent));
    }

    #[tokio::test]
    async fn test_feedback_on_pending_is_refused() {
        let h = harness();
        let call = h.queue.submit(form(), ParticipantRole::User, None).await.unwrap();
        let err = h
            .queue
            .submit_feedback(call.id, FeedbackRating::Good, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_delete_broadcasts_and_forgets() {
        let h = harness();
        let (_a, mut a_rx) = staff(&h.hub, "staff-a").await;
        let call = h.queue.submit(form(), ParticipantRole::User, None).await.unwrap();
        drain(&mut a_rx);

        h.queue.delete(call.id).await.unwrap();

        assert!(matches!(
            drain(&mut a_rx).as_slice(),
            [ServerEvent::CallDeleted { request_id }] if *request_id == call.id
        ));
        assert!(matches!(
            h.queue.delete(call.id).await.unwrap_err(),
            CoreError::NotFound(_)
        ));
        assert!(matches!(
            h.queue.start(call.id, "staff-a").await.unwrap_err(),
            CoreError::NotFound(_)
        ));
    }
}
