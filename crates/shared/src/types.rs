//! Common types used across the helpline services

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{CoreError, FieldError};

// =============================================================================
// Enums
// =============================================================================

/// Lifecycle state of a call request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Pending,
    Assigned,
    InProgress,
    AwaitingFeedback,
    Completed,
    /// Never stored by the queue itself: a rejected request is re-queued as
    /// `Pending` in the same update. Kept so imported rows still decode.
    Rejected,
}

impl CallStatus {
    /// States in which a staff member holds the request
    pub const HELD: [CallStatus; 3] = [
        CallStatus::Assigned,
        CallStatus::InProgress,
        CallStatus::AwaitingFeedback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InProgress => "in-progress",
            Self::AwaitingFeedback => "awaiting-feedback",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    /// Whether a staff member is currently holding the request
    pub fn is_held(&self) -> bool {
        Self::HELD.contains(self)
    }

    /// Whether the request sits in the pool waiting for a staff member
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Pending | Self::Rejected)
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "pending" => Ok(Self::Pending),
            "assigned" => Ok(Self::Assigned),
            "in-progress" => Ok(Self::InProgress),
            "awaiting-feedback" => Ok(Self::AwaitingFeedback),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Invalid call status: {}", s)),
        }
    }
}

/// Caller's rating of a completed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackRating {
    Excellent,
    Good,
    Average,
    Poor,
}

impl std::fmt::Display for FeedbackRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Excellent => write!(f, "Excellent"),
            Self::Good => write!(f, "Good"),
            Self::Average => write!(f, "Average"),
            Self::Poor => write!(f, "Poor"),
        }
    }
}

impl std::str::FromStr for FeedbackRating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "excellent" => Ok(Self::Excellent),
            "good" => Ok(Self::Good),
            "average" => Ok(Self::Average),
            "poor" => Ok(Self::Poor),
            _ => Err(format!("Invalid feedback rating: {}", s)),
        }
    }
}

/// Which side of the helpline a participant is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    User,
    Staff,
    Admin,
}

impl Default for ParticipantRole {
    fn default() -> Self {
        Self::User
    }
}

impl ParticipantRole {
    /// Staff and admins both receive staff-pool traffic
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Staff | Self::Admin)
    }

    /// Role recorded on durable records, where admins act as staff
    pub fn as_sender(&self) -> Self {
        if self.is_staff() {
            Self::Staff
        } else {
            Self::User
        }
    }
}

impl std::fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Staff => write!(f, "staff"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for ParticipantRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "staff" => Ok(Self::Staff),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("Invalid participant role: {}", s)),
        }
    }
}

// =============================================================================
// Call Requests
// =============================================================================

/// A request for a staff callback, tracked through its lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub language: Option<String>,
    pub preferred_time: Option<String>,
    pub notes: Option<String>,
    pub submitted_by: ParticipantRole,
    /// Live connection that submitted the request, used to prompt for feedback
    pub origin_connection_id: Option<Uuid>,
    pub status: CallStatus,

    // Assignment
    pub assigned_to: Option<String>,
    pub assigned_to_name: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub assigned_at: Option<OffsetDateTime>,

    // Call timing
    #[serde(with = "time::serde::rfc3339::option")]
    pub call_started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub call_ended_at: Option<OffsetDateTime>,
    pub duration_seconds: Option<i64>,

    // Feedback
    pub rating: Option<FeedbackRating>,
    pub suggestion: Option<String>,
    pub feedback_done: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl CallRequest {
    /// Whether the request is waiting in the pool with nobody holding it
    pub fn is_unclaimed(&self) -> bool {
        self.status.is_queued() && self.assigned_to.is_none()
    }

    /// Whether `staff_id` currently holds the request
    pub fn is_held_by(&self, staff_id: &str) -> bool {
        self.status.is_held() && self.assigned_to.as_deref() == Some(staff_id)
    }

    /// Whether a staff member's queue view should include this request
    pub fn visible_to(&self, staff_id: &str) -> bool {
        self.is_unclaimed() || self.is_held_by(staff_id)
    }
}

/// Call request payload as submitted by a client form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallRequestForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    pub language: Option<String>,
    #[serde(alias = "preferredTime")]
    pub preferred_time: Option<String>,
    #[serde(alias = "reason")]
    pub notes: Option<String>,
}

/// Upper bound on any participant-supplied name
pub const MAX_NAME_CHARS: usize = 100;
const MAX_NOTES_CHARS: usize = 1000;
const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_DIGITS: usize = 15;

impl CallRequestForm {
    /// Validate the form and turn it into an insertable request.
    ///
    /// All field errors are collected so the submitter can show them together.
    pub fn validate(
        self,
        submitted_by: ParticipantRole,
        origin_connection_id: Option<Uuid>,
    ) -> Result<NewCallRequest, CoreError> {
        let mut errors = Vec::new();

        let name = self.name.trim().to_string();
        if name.is_empty() {
            errors.push(FieldError::new("name", "Name is required"));
        } else if name.chars().count() > MAX_NAME_CHARS {
            errors.push(FieldError::new(
                "name",
                format!("Name must be at most {} characters", MAX_NAME_CHARS),
            ));
        }

        let phone = self.phone.trim().to_string();
        if phone.is_empty() {
            errors.push(FieldError::new("phone", "Phone number is required"));
        } else if let Err(message) = check_phone(&phone) {
            errors.push(FieldError::new("phone", message));
        }

        let notes = non_empty(self.notes);
        if notes.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTES_CHARS) {
            errors.push(FieldError::new(
                "notes",
                format!("Notes must be at most {} characters", MAX_NOTES_CHARS),
            ));
        }

        if !errors.is_empty() {
            return Err(CoreError::Validation(errors));
        }

        Ok(NewCallRequest {
            name,
            phone,
            language: non_empty(self.language),
            preferred_time: non_empty(self.preferred_time),
            notes,
            submitted_by: submitted_by.as_sender(),
            origin_connection_id,
        })
    }
}

fn check_phone(phone: &str) -> Result<(), String> {
    if !phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'))
    {
        return Err("Phone number may only contain digits, spaces, '+', '-' and parentheses".into());
    }
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits) {
        return Err(format!(
            "Phone number must have between {} and {} digits",
            MIN_PHONE_DIGITS, MAX_PHONE_DIGITS
        ));
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A validated call request ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewCallRequest {
    pub name: String,
    pub phone: String,
    pub language: Option<String>,
    pub preferred_time: Option<String>,
    pub notes: Option<String>,
    pub submitted_by: ParticipantRole,
    pub origin_connection_id: Option<Uuid>,
}

/// Whole seconds between two instants, rounded down and never negative
pub fn call_duration_seconds(start: OffsetDateTime, end: OffsetDateTime) -> i64 {
    (end - start).whole_seconds().max(0)
}

// =============================================================================
// Chat
// =============================================================================

/// A persisted chat message. Messages are immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    /// Connection that owns the conversation thread
    pub connection_id: Uuid,
    pub sender_role: ParticipantRole,
    pub sender_name: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A chat message ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewChatMessage {
    pub connection_id: Uuid,
    pub sender_role: ParticipantRole,
    pub sender_name: String,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn form(name: &str, phone: &str) -> CallRequestForm {
        CallRequestForm {
            name: name.to_string(),
            phone: phone.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_call_status_round_trips_through_str() {
        for status in [
            CallStatus::Pending,
            CallStatus::Assigned,
            CallStatus::InProgress,
            CallStatus::AwaitingFeedback,
            CallStatus::Completed,
            CallStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<CallStatus>(), Ok(status));
        }
        assert_eq!("in_progress".parse::<CallStatus>(), Ok(CallStatus::InProgress));
        assert!("closed".parse::<CallStatus>().is_err());
    }

    #[test]
    fn test_call_status_serializes_kebab_case() {
        let json = serde_json::to_string(&CallStatus::AwaitingFeedback).unwrap();
        assert_eq!(json, r#""awaiting-feedback""#);
    }

    #[test]
    fn test_feedback_rating_uses_capitalized_names() {
        let rating: FeedbackRating = serde_json::from_str(r#""Good""#).unwrap();
        assert_eq!(rating, FeedbackRating::Good);
        assert!(serde_json::from_str::<FeedbackRating>(r#""good""#).is_err());
    }

    #[test]
    fn test_admin_records_as_staff() {
        assert_eq!(ParticipantRole::Admin.as_sender(), ParticipantRole::Staff);
        assert_eq!(ParticipantRole::User.as_sender(), ParticipantRole::User);
        assert!(ParticipantRole::Admin.is_staff());
        assert!(!ParticipantRole::User.is_staff());
    }

    #[test]
    fn test_validate_accepts_ten_digit_phone() {
        let new = form("  Asha  ", "9876543210")
            .validate(ParticipantRole::User, None)
            .unwrap();
        assert_eq!(new.name, "Asha");
        assert_eq!(new.phone, "9876543210");
        assert_eq!(new.submitted_by, ParticipantRole::User);
    }

    #[test]
    fn test_validate_collects_all_field_errors() {
        let err = form("", "").validate(ParticipantRole::User, None).unwrap_err();
        match err {
            CoreError::Validation(fields) => {
                let names: Vec<_> = fields.iter().map(|f| f.field).collect();
                assert_eq!(names, vec!["name", "phone"]);
            }
            other => panic!("Expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_malformed_phone() {
        assert!(form("Asha", "call me").validate(ParticipantRole::User, None).is_err());
        assert!(form("Asha", "12345").validate(ParticipantRole::User, None).is_err());
        assert!(form("Asha", "+91 98765-43210")
            .validate(ParticipantRole::User, None)
            .is_ok());
    }

    #[test]
    fn test_validate_blanks_become_none() {
        let mut f = form("Asha", "9876543210");
        f.language = Some("   ".to_string());
        f.notes = Some(" needs help with forms ".to_string());
        let new = f.validate(ParticipantRole::Staff, None).unwrap();
        assert_eq!(new.language, None);
        assert_eq!(new.notes.as_deref(), Some("needs help with forms"));
    }

    #[test]
    fn test_duration_is_floored_whole_seconds() {
        let start = datetime!(2025-01-01 10:00:00 UTC);
        assert_eq!(
            call_duration_seconds(start, start + time::Duration::seconds(125)),
            125
        );
        assert_eq!(
            call_duration_seconds(start, start + time::Duration::milliseconds(125_999)),
            125
        );
        assert_eq!(call_duration_seconds(start, start - time::Duration::seconds(3)), 0);
    }

    #[test]
    fn test_visible_to_pool_and_own_calls() {
        let now = datetime!(2025-01-01 10:00:00 UTC);
        let mut call = CallRequest {
            id: Uuid::new_v4(),
            name: "Asha".into(),
            phone: "9876543210".into(),
            language: None,
            preferred_time: None,
            notes: None,
            submitted_by: ParticipantRole::User,
            origin_connection_id: None,
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
            created_at: now,
            updated_at: now,
        };
        assert!(call.visible_to("staff-a"));

        call.status = CallStatus::InProgress;
        call.assigned_to = Some("staff-a".into());
        assert!(call.visible_to("staff-a"));
        assert!(!call.visible_to("staff-b"));

        call.status = CallStatus::Completed;
        assert!(!call.visible_to("staff-a"));
    }
}
