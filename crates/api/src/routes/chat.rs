//! Chat history route

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use helpline_shared::ChatMessage;

use crate::{error::ApiResult, state::AppState};

/// Full thread for one user connection, oldest first
pub async fn history(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    Ok(Json(state.chat.history(connection_id).await?))
}
