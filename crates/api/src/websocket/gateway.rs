//! Realtime gateway dispatch
//!
//! One inbound event in, zero or more outbound events out. Each event is
//! handled in isolation: whatever goes wrong is reported to the originating
//! connection only and never ends the session.

use std::sync::Arc;
use uuid::Uuid;

use helpline_shared::{CoreError, CoreResult, ParticipantRole};

use super::{
    connection::Connection,
    events::{ClientEvent, ServerEvent},
};
use crate::{presence::PresenceEntry, state::AppState};

const STORE_FAILURE_MESSAGE: &str = "Something went wrong, please try again";

/// Handle one inbound event from `conn`
pub async fn dispatch(state: &AppState, conn: &Arc<Connection>, event: ClientEvent) {
    let kind = event.kind();
    tracing::debug!(connection_id = %conn.connection_id, event = kind, "Client event");

    // Accept failures carry the request id back to the losing connection
    if let ClientEvent::AcceptCall { request_id } = event {
        match accept(state, conn, request_id).await {
            Ok(()) => {}
            Err(CoreError::Conflict(message)) => {
                conn.notify(ServerEvent::AcceptError { request_id, message });
            }
            Err(e) => report(conn, kind, e),
        }
        return;
    }

    if let Err(e) = handle(state, conn, event).await {
        report(conn, kind, e);
    }
}

async fn handle(state: &AppState, conn: &Arc<Connection>, event: ClientEvent) -> CoreResult<()> {
    use ClientEvent::*;

    match event {
        RegisterRole {
            role,
            identity,
            display_name,
        } => register(state, conn, role, identity, display_name).await,

        RegisterUser { display_name } => {
            let entry = state
                .chat
                .register_user(conn.connection_id, &display_name)
                .await?;
            conn.notify(registered(&entry));
            Ok(())
        }

        UserMessage { text, display_name } => {
            state
                .chat
                .send_from_user(conn.connection_id, &text, display_name.as_deref())
                .await?;
            Ok(())
        }

        StaffMessage {
            target_connection_id,
            text,
        } => {
            let staff = require_staff(state, conn).await?;
            state
                .chat
                .send_from_staff(target_connection_id, &text, staff.label())
                .await?;
            Ok(())
        }

        CallRequest(form) => {
            let submitted_by = state
                .ws_state
                .presence
                .lookup_by_connection(&conn.connection_id)
                .await
                .filter(PresenceEntry::is_registered)
                .map(|p| p.role.as_sender())
                .unwrap_or(ParticipantRole::User);
            let request = state
                .calls
                .submit(form, submitted_by, Some(conn.connection_id))
                .await?;
            conn.notify(ServerEvent::CallSubmitted { request });
            Ok(())
        }

        AcceptCall { request_id } => accept(state, conn, request_id).await,

        StartCall { request_id } => {
            let staff_id = staff_identity(&require_staff(state, conn).await?)?;
            state.calls.start(request_id, &staff_id).await?;
            Ok(())
        }

        EndCall { request_id } => {
            let staff_id = staff_identity(&require_staff(state, conn).await?)?;
            state.calls.end(request_id, &staff_id).await?;
            Ok(())
        }

        RejectCall { request_id } => {
            let staff_id = staff_identity(&require_staff(state, conn).await?)?;
            state.calls.reject(request_id, &staff_id).await?;
            Ok(())
        }

        SubmitFeedback {
            request_id,
            rating,
            suggestion,
        } => {
            state
                .calls
                .submit_feedback(request_id, rating, suggestion)
                .await?;
            Ok(())
        }

        AdminDeleteCall { request_id } => {
            let entry = require_staff(state, conn).await?;
            if entry.role != ParticipantRole::Admin {
                return Err(CoreError::Forbidden(
                    "Only admins can delete call requests".to_string(),
                ));
            }
            state.calls.delete(request_id).await?;
            Ok(())
        }

        ListCalls => {
            let staff_id = staff_identity(&require_staff(state, conn).await?)?;
            send_queue(state, conn, &staff_id).await
        }

        Ping => {
            conn.notify(ServerEvent::Pong);
            Ok(())
        }

        Unknown => {
            tracing::debug!(connection_id = %conn.connection_id, "Ignoring unknown event type");
            Ok(())
        }
    }
}

/// Record who is on the other end of `conn`.
///
/// Staff must name an identity; on success they also get their queue.
pub async fn register(
    state: &AppState,
    conn: &Arc<Connection>,
    role: ParticipantRole,
    identity: Option<String>,
    display_name: Option<String>,
) -> CoreResult<()> {
    let identity = identity
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty());
    let display_name = display_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    if role.is_staff() && identity.is_none() {
        return Err(CoreError::Validation(vec![helpline_shared::FieldError::new(
            "identity",
            "Staff registration requires an identity",
        )]));
    }

    let entry = state
        .ws_state
        .presence
        .register(conn.connection_id, role, identity, display_name)
        .await;

    tracing::info!(
        connection_id = %conn.connection_id,
        role = %entry.role,
        identity = ?entry.identity,
        "Connection registered"
    );

    conn.notify(registered(&entry));

    match entry.identity.as_deref() {
        Some(staff_id) if entry.is_staff() => send_queue(state, conn, staff_id).await,
        _ => Ok(()),
    }
}

async fn accept(state: &AppState, conn: &Arc<Connection>, request_id: Uuid) -> CoreResult<()> {
    let staff = require_staff(state, conn).await?;
    let staff_id = staff_identity(&staff)?;
    let staff_name = staff.label().unwrap_or(staff_id.as_str()).to_string();
    state
        .calls
        .accept(request_id, &staff_id, &staff_name, Some(conn.connection_id))
        .await?;
    Ok(())
}

async fn send_queue(state: &AppState, conn: &Arc<Connection>, staff_id: &str) -> CoreResult<()> {
    let requests = state.calls.list_for_staff(staff_id).await?;
    conn.notify(ServerEvent::CallQueue { requests });
    Ok(())
}

async fn require_staff(state: &AppState, conn: &Arc<Connection>) -> CoreResult<PresenceEntry> {
    state
        .ws_state
        .presence
        .lookup_by_connection(&conn.connection_id)
        .await
        .filter(PresenceEntry::is_staff)
        .ok_or_else(|| CoreError::Forbidden("Register as staff first".to_string()))
}

fn staff_identity(entry: &PresenceEntry) -> CoreResult<String> {
    entry
        .identity
        .clone()
        .ok_or_else(|| CoreError::Forbidden("Staff identity missing".to_string()))
}

fn registered(entry: &PresenceEntry) -> ServerEvent {
    ServerEvent::Registered {
        connection_id: entry.connection_id,
        role: entry.role,
        identity: entry.identity.clone(),
        display_name: entry.display_name.clone(),
    }
}

/// Turn a failed event into feedback for the sender
fn report(conn: &Connection, kind: &'static str, err: CoreError) {
    match err {
        CoreError::Validation(fields) => {
            conn.notify(ServerEvent::ValidationFailed { fields });
        }
        CoreError::NotFound(what) => {
            tracing::warn!(
                connection_id = %conn.connection_id,
                event = kind,
                missing = %what,
                "Event referenced a record that no longer exists"
            );
        }
        CoreError::Store(msg) => {
            tracing::error!(
                connection_id = %conn.connection_id,
                event = kind,
                error = %msg,
                "Store failure while handling event"
            );
            conn.notify(ServerEvent::Error {
                message: STORE_FAILURE_MESSAGE.to_string(),
            });
        }
        CoreError::Conflict(message) | CoreError::Forbidden(message) => {
            tracing::warn!(
                connection_id = %conn.connection_id,
                event = kind,
                reason = %message,
                "Event refused"
            );
            conn.notify(ServerEvent::Error { message });
        }
        transition @ CoreError::InvalidTransition { .. } => {
            tracing::warn!(
                connection_id = %conn.connection_id,
                event = kind,
                error = %transition,
                "Event refused"
            );
            conn.notify(ServerEvent::Error {
                message: transition.to_string(),
            });
        }
    }
}
