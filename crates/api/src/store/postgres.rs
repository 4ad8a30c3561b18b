//! Postgres store
//!
//! Enum columns are plain TEXT and are mapped through row structs, the same
//! way the rest of the API reads status columns.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use helpline_shared::{
    CallRequest, ChatMessage, CoreError, CoreResult, FeedbackRating, NewCallRequest,
    NewChatMessage,
};

use super::{CallStore, MessageStore};

macro_rules! call_columns {
    () => {
        r#"id, name, phone, language, preferred_time, notes, submitted_by,
           origin_connection_id, status, assigned_to, assigned_to_name, assigned_at,
           call_started_at, call_ended_at, duration_seconds, rating, suggestion,
           feedback_done, completed_at, created_at, updated_at"#
    };
}

/// Duration expression shared by end and feedback updates ($3 / $4 is "now")
macro_rules! duration_since_start {
    ($now:literal) => {
        concat!(
            "GREATEST(0, FLOOR(EXTRACT(EPOCH FROM (",
            $now,
            " - COALESCE(call_started_at, assigned_at, ",
            $now,
            ")))))::BIGINT"
        )
    };
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct CallRow {
    id: Uuid,
    name: String,
    phone: String,
    language: Option<String>,
    preferred_time: Option<String>,
    notes: Option<String>,
    submitted_by: String,
    origin_connection_id: Option<Uuid>,
    status: String,
    assigned_to: Option<String>,
    assigned_to_name: Option<String>,
    assigned_at: Option<OffsetDateTime>,
    call_started_at: Option<OffsetDateTime>,
    call_ended_at: Option<OffsetDateTime>,
    duration_seconds: Option<i64>,
    rating: Option<String>,
    suggestion: Option<String>,
    feedback_done: bool,
    completed_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<CallRow> for CallRequest {
    type Error = CoreError;

    fn try_from(row: CallRow) -> Result<Self, Self::Error> {
        Ok(CallRequest {
            id: row.id,
            name: row.name,
            phone: row.phone,
            language: row.language,
            preferred_time: row.preferred_time,
            notes: row.notes,
            submitted_by: row.submitted_by.parse().map_err(CoreError::Store)?,
            origin_connection_id: row.origin_connection_id,
            status: row.status.parse().map_err(CoreError::Store)?,
            assigned_to: row.assigned_to,
            assigned_to_name: row.assigned_to_name,
            assigned_at: row.assigned_at,
            call_started_at: row.call_started_at,
            call_ended_at: row.call_ended_at,
            duration_seconds: row.duration_seconds,
            rating: row
                .rating
                .map(|r| r.parse())
                .transpose()
                .map_err(CoreError::Store)?,
            suggestion: row.suggestion,
            feedback_done: row.feedback_done,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn decode(row: Option<CallRow>) -> CoreResult<Option<CallRequest>> {
    row.map(CallRequest::try_from).transpose()
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    connection_id: Uuid,
    sender_role: String,
    sender_name: String,
    text: String,
    created_at: OffsetDateTime,
}

impl TryFrom<MessageRow> for ChatMessage {
    type Error = CoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(ChatMessage {
            id: row.id,
            connection_id: row.connection_id,
            sender_role: row.sender_role.parse().map_err(CoreError::Store)?,
            sender_name: row.sender_name,
            text: row.text,
            created_at: row.created_at,
        })
    }
}

// =============================================================================
// Call Requests
// =============================================================================

#[async_trait]
impl CallStore for PgStore {
    async fn insert_call(&self, new: NewCallRequest, at: OffsetDateTime) -> CoreResult<CallRequest> {
        let row: CallRow = sqlx::query_as(concat!(
            r#"
            INSERT INTO call_requests (
                id, name, phone, language, preferred_time, notes,
                submitted_by, origin_connection_id, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9, $9)
            RETURNING "#,
            call_columns!()
        ))
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.phone)
        .bind(&new.language)
        .bind(&new.preferred_time)
        .bind(&new.notes)
        .bind(new.submitted_by.to_string())
        .bind(new.origin_connection_id)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get_call(&self, id: Uuid) -> CoreResult<Option<CallRequest>> {
        let row: Option<CallRow> = sqlx::query_as(concat!(
            "SELECT ",
            call_columns!(),
            " FROM call_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        decode(row)
    }

    async fn list_for_staff(&self, staff_id: &str) -> CoreResult<Vec<CallRequest>> {
        let rows: Vec<CallRow> = sqlx::query_as(concat!(
            "SELECT ",
            call_columns!(),
            r#"
            FROM call_requests
            WHERE (status IN ('pending', 'rejected') AND assigned_to IS NULL)
               OR (assigned_to = $1 AND status IN ('assigned', 'in-progress', 'awaiting-feedback'))
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(staff_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CallRequest::try_from).collect()
    }

    async fn list_calls(&self) -> CoreResult<Vec<CallRequest>> {
        let rows: Vec<CallRow> = sqlx::query_as(concat!(
            "SELECT ",
            call_columns!(),
            " FROM call_requests ORDER BY created_at DESC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CallRequest::try_from).collect()
    }

    async fn claim_call(
        &self,
        id: Uuid,
        staff_id: &str,
        staff_name: &str,
        at: OffsetDateTime,
    ) -> CoreResult<Option<CallRequest>> {
        let row: Option<CallRow> = sqlx::query_as(concat!(
            r#"
            UPDATE call_requests
            SET status = 'assigned', assigned_to = $2, assigned_to_name = $3,
                assigned_at = $4, updated_at = $4
            WHERE id = $1
              AND status IN ('pending', 'rejected')
              AND assigned_to IS NULL
            RETURNING "#,
            call_columns!()
        ))
        .bind(id)
        .bind(staff_id)
        .bind(staff_name)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        decode(row)
    }

    async fn mark_started(
        &self,
        id: Uuid,
        staff_id: &str,
        at: OffsetDateTime,
    ) -> CoreResult<Option<CallRequest>> {
        let row: Option<CallRow> = sqlx::query_as(concat!(
            r#"
            UPDATE call_requests
            SET status = 'in-progress', call_started_at = $3, updated_at = $3
            WHERE id = $1 AND assigned_to = $2 AND status = 'assigned'
            RETURNING "#,
            call_columns!()
        ))
        .bind(id)
        .bind(staff_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        decode(row)
    }

    async fn mark_ended(
        &self,
        id: Uuid,
        staff_id: &str,
        at: OffsetDateTime,
    ) -> CoreResult<Option<CallRequest>> {
        let row: Option<CallRow> = sqlx::query_as(concat!(
            r#"
            UPDATE call_requests
            SET status = 'awaiting-feedback', call_ended_at = $3::timestamptz,
                duration_seconds = "#,
            duration_since_start!("$3::timestamptz"),
            r#",
                updated_at = $3::timestamptz
            WHERE id = $1
              AND assigned_to = $2
              AND status IN ('assigned', 'in-progress')
            RETURNING "#,
            call_columns!()
        ))
        .bind(id)
        .bind(staff_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        decode(row)
    }

    async fn release_call(
        &self,
        id: Uuid,
        staff_id: &str,
        at: OffsetDateTime,
    ) -> CoreResult<Option<CallRequest>> {
        let row: Option<CallRow> = sqlx::query_as(concat!(
            r#"
            UPDATE call_requests
            SET status = 'pending', assigned_to = NULL, assigned_to_name = NULL,
                assigned_at = NULL, call_started_at = NULL, call_ended_at = NULL,
                duration_seconds = NULL, updated_at = $3
            WHERE id = $1
              AND assigned_to = $2
              AND status IN ('assigned', 'in-progress', 'awaiting-feedback')
            RETURNING "#,
            call_columns!()
        ))
        .bind(id)
        .bind(staff_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        decode(row)
    }

    async fn complete_call(
        &self,
        id: Uuid,
        rating: FeedbackRating,
        suggestion: Option<String>,
        at: OffsetDateTime,
    ) -> CoreResult<Option<CallRequest>> {
        let row: Option<CallRow> = sqlx::query_as(concat!(
            r#"
            UPDATE call_requests
            SET status = 'completed', rating = $2, suggestion = $3,
                feedback_done = TRUE, completed_at = $4::timestamptz,
                duration_seconds = COALESCE(duration_seconds, "#,
            duration_since_start!("$4::timestamptz"),
            r#"),
                call_ended_at = COALESCE(call_ended_at, $4::timestamptz),
                updated_at = $4::timestamptz
            WHERE id = $1
              AND feedback_done = FALSE
              AND status IN ('assigned', 'in-progress', 'awaiting-feedback')
            RETURNING "#,
            call_columns!()
        ))
        .bind(id)
        .bind(rating.to_string())
        .bind(suggestion)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        decode(row)
    }

    async fn delete_call(&self, id: Uuid) -> CoreResult<Option<CallRequest>> {
        let row: Option<CallRow> = sqlx::query_as(concat!(
            "DELETE FROM call_requests WHERE id = $1 RETURNING ",
            call_columns!()
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        decode(row)
    }

    async fn ping(&self) -> CoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// Chat Messages
// =============================================================================

#[async_trait]
impl MessageStore for PgStore {
    async fn insert_message(&self, new: NewChatMessage, at: OffsetDateTime) -> CoreResult<ChatMessage> {
        let row: MessageRow = sqlx::query_as(
            r#"
            INSERT INTO chat_messages (id, connection_id, sender_role, sender_name, text, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, connection_id, sender_role, sender_name, text, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.connection_id)
        .bind(new.sender_role.as_sender().to_string())
        .bind(&new.sender_name)
        .bind(&new.text)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn history(&self, connection_id: Uuid) -> CoreResult<Vec<ChatMessage>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, connection_id, sender_role, sender_name, text, created_at
            FROM chat_messages
            WHERE connection_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(connection_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChatMessage::try_from).collect()
    }
}
