//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use helpline_shared::{CoreError, FieldError};

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Authentication errors
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Authentication required")]
    Unauthorized,
    #[error("Insufficient permissions")]
    Forbidden,

    // Validation errors
    #[error("Validation failed")]
    InvalidFields(Vec<FieldError>),

    // Resource errors
    #[error("Resource not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),

    // Internal errors
    #[error("Database error: {0}")]
    Database(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Authentication
            ApiError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", self.to_string()),

            // Validation
            ApiError::InvalidFields(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", self.to_string()),

            // Resources
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),

            // Internal
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", "Database error".to_string()),
        };

        let body = match &self {
            ApiError::InvalidFields(fields) => json!({
                "error": {
                    "code": code,
                    "message": message,
                    "fields": fields,
                }
            }),
            _ => json!({
                "error": {
                    "code": code,
                    "message": message,
                }
            }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(fields) => ApiError::InvalidFields(fields),
            CoreError::NotFound(_) => ApiError::NotFound,
            CoreError::Conflict(msg) => ApiError::Conflict(msg),
            CoreError::Forbidden(_) => ApiError::Forbidden,
            transition @ CoreError::InvalidTransition { .. } => {
                ApiError::Conflict(transition.to_string())
            }
            CoreError::Store(msg) => {
                tracing::error!(error = %msg, "Store error");
                ApiError::Database(msg)
            }
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_lists_fields() {
        let err: ApiError =
            CoreError::Validation(vec![FieldError::new("phone", "Phone number is required")]).into();
        let (status, body) = body_json(err).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["fields"][0]["field"], "phone");
    }

    #[tokio::test]
    async fn test_store_error_is_opaque() {
        let err: ApiError = CoreError::Store("connection reset by peer".into()).into();
        let (status, body) = body_json(err).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "Database error");
        assert!(body["error"].get("fields").is_none());
    }

    #[tokio::test]
    async fn test_invalid_transition_is_conflict() {
        let err: ApiError = CoreError::InvalidTransition {
            action: "start",
            from: "pending".into(),
        }
        .into();
        let (status, _) = body_json(err).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
