//! WebSocket event types and serialization
//!
//! Defines all client-to-server and server-to-client event types
//! with type-safe serde serialization.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use helpline_shared::{
    CallRequest, CallRequestForm, ChatMessage, FeedbackRating, FieldError, ParticipantRole,
};

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Declare which side of the helpline this connection is on
    RegisterRole {
        role: ParticipantRole,
        /// Staff identity, verified upstream
        #[serde(default, alias = "staff_id")]
        identity: Option<String>,
        #[serde(default, alias = "name")]
        display_name: Option<String>,
    },

    /// Attach a display name to an anonymous user connection
    RegisterUser { display_name: String },

    /// Chat message from a user to the staff pool
    UserMessage {
        text: String,
        #[serde(default)]
        display_name: Option<String>,
    },

    /// Chat reply from staff to one user connection
    StaffMessage {
        target_connection_id: Uuid,
        text: String,
    },

    /// Submit a new call request
    CallRequest(CallRequestForm),

    AcceptCall { request_id: Uuid },

    StartCall { request_id: Uuid },

    EndCall { request_id: Uuid },

    RejectCall { request_id: Uuid },

    SubmitFeedback {
        request_id: Uuid,
        rating: FeedbackRating,
        #[serde(default)]
        suggestion: Option<String>,
    },

    AdminDeleteCall { request_id: Uuid },

    /// Re-fetch the pool and this staff member's held calls
    ListCalls,

    /// Heartbeat ping to keep connection alive
    Ping,

    /// Any event type this server does not know about
    #[serde(other)]
    Unknown,
}

impl ClientEvent {
    /// Event name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::RegisterRole { .. } => "register_role",
            ClientEvent::RegisterUser { .. } => "register_user",
            ClientEvent::UserMessage { .. } => "user_message",
            ClientEvent::StaffMessage { .. } => "staff_message",
            ClientEvent::CallRequest(_) => "call_request",
            ClientEvent::AcceptCall { .. } => "accept_call",
            ClientEvent::StartCall { .. } => "start_call",
            ClientEvent::EndCall { .. } => "end_call",
            ClientEvent::RejectCall { .. } => "reject_call",
            ClientEvent::SubmitFeedback { .. } => "submit_feedback",
            ClientEvent::AdminDeleteCall { .. } => "admin_delete_call",
            ClientEvent::ListCalls => "list_calls",
            ClientEvent::Ping => "ping",
            ClientEvent::Unknown => "unknown",
        }
    }
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection acknowledged
    Connected { connection_id: Uuid },

    /// Registration acknowledged
    Registered {
        connection_id: Uuid,
        role: ParticipantRole,
        #[serde(skip_serializing_if = "Option::is_none")]
        identity: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },

    /// Sent to the submitter once its request is stored
    CallSubmitted { request: CallRequest },

    /// A new request entered the staff pool
    NewCallRequest { request: CallRequest },

    /// Sent to the staff connection whose accept won
    CallAssigned { request: CallRequest },

    /// Another staff member claimed this request
    CallRemovedFromPool { request_id: Uuid },

    /// Sent to the staff connection whose accept lost
    AcceptError { request_id: Uuid, message: String },

    CallStarted { request: CallRequest },

    CallEnded { request: CallRequest },

    /// Ask the caller's connection for a rating
    FeedbackRequested { request_id: Uuid },

    /// A request was released back into the pool
    CallRequeued { request: CallRequest },

    /// Feedback recorded, request completed
    CallUpdated { request: CallRequest },

    /// Request removed by an admin; drop any local copy
    CallDeleted { request_id: Uuid },

    /// Snapshot of the pool plus this staff member's held calls
    CallQueue { requests: Vec<CallRequest> },

    NewMessage { message: ChatMessage },

    /// Submission rejected before anything was stored
    ValidationFailed { fields: Vec<FieldError> },

    /// Heartbeat response
    Pong,

    /// Error message
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_deserialization() {
        let json = r#"{"type":"accept_call","request_id":"550e8400-e29b-41d4-a716-446655440000"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::AcceptCall { request_id } => {
                assert_eq!(
                    request_id.to_string(),
                    "550e8400-e29b-41d4-a716-446655440000"
                );
            }
            other => panic!("Expected AcceptCall event, got {:?}", other),
        }
    }

    #[test]
    fn test_call_request_fields_sit_beside_tag() {
        let json = r#"{"type":"call_request","name":"Asha","phone":"9876543210","language":"Hindi"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::CallRequest(form) => {
                assert_eq!(form.name, "Asha");
                assert_eq!(form.phone, "9876543210");
                assert_eq!(form.language.as_deref(), Some("Hindi"));
            }
            other => panic!("Expected CallRequest event, got {:?}", other),
        }
    }

    #[test]
    fn test_register_role_accepts_staff_id_alias() {
        let json = r#"{"type":"register_role","role":"staff","staff_id":"s-1","name":"Meera"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::RegisterRole {
                role,
                identity,
                display_name,
            } => {
                assert_eq!(role, ParticipantRole::Staff);
                assert_eq!(identity.as_deref(), Some("s-1"));
                assert_eq!(display_name.as_deref(), Some("Meera"));
            }
            other => panic!("Expected RegisterRole event, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_type_is_tolerated() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"typing_start"}"#).unwrap();
        assert!(matches!(event, ClientEvent::Unknown));
    }

    #[test]
    fn test_server_event_serialization() {
        let event = ServerEvent::Pong;
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }

    #[test]
    fn test_accept_error_serialization() {
        let request_id = Uuid::new_v4();
        let event = ServerEvent::AcceptError {
            request_id,
            message: "taken".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "accept_error");
        assert_eq!(value["request_id"], request_id.to_string());
    }
}
