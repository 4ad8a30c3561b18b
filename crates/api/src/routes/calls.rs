//! Call request routes
//!
//! HTTP counterparts of the realtime call events, for clients that are not
//! holding a socket open and for the admin export.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use helpline_shared::{CallRequest, CallRequestForm, FeedbackRating, ParticipantRole};

use crate::{
    auth::StaffIdentity,
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SubmitCallRequest {
    #[serde(flatten)]
    pub form: CallRequestForm,
    /// Live socket to prompt for feedback when the call ends
    #[serde(default)]
    pub connection_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitFeedbackRequest {
    pub rating: FeedbackRating,
    #[serde(default)]
    pub suggestion: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Submit a call request. No authentication.
pub async fn submit_call_request(
    State(state): State<AppState>,
    Json(req): Json<SubmitCallRequest>,
) -> ApiResult<(StatusCode, Json<CallRequest>)> {
    let call = state
        .calls
        .submit(req.form, ParticipantRole::User, req.connection_id)
        .await?;
    Ok((StatusCode::CREATED, Json(call)))
}

/// The pending pool plus the caller's held requests
pub async fn staff_queue(
    State(state): State<AppState>,
    Extension(staff): Extension<StaffIdentity>,
) -> ApiResult<Json<Vec<CallRequest>>> {
    let calls = state.calls.list_for_staff(&staff.staff_id).await?;
    Ok(Json(calls))
}

pub async fn submit_feedback(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Json(req): Json<SubmitFeedbackRequest>,
) -> ApiResult<Json<CallRequest>> {
    let call = state
        .calls
        .submit_feedback(request_id, req.rating, req.suggestion)
        .await?;
    Ok(Json(call))
}

/// Every request, newest first
pub async fn admin_list_calls(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<CallRequest>>> {
    Ok(Json(state.calls.list_all().await?))
}

pub async fn admin_delete_call(
    State(state): State<AppState>,
    Extension(admin): Extension<StaffIdentity>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !admin.is_admin() {
        return Err(ApiError::Forbidden);
    }
    state.calls.delete(request_id).await?;
    tracing::info!(request_id = %request_id, admin_id = %admin.staff_id, "Admin deleted call request");
    Ok(StatusCode::NO_CONTENT)
}
