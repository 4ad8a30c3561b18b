//! Error types for the helpline core

use serde::Serialize;
use thiserror::Error;

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Validation failed: {}", format_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Lost a race for exclusive assignment
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The caller's role does not permit the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Cannot {action} a call request in state {from}")]
    InvalidTransition { action: &'static str, from: String },

    #[error("Store error: {0}")]
    Store(String),
}

fn format_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => CoreError::NotFound("row".to_string()),
            other => CoreError::Store(other.to_string()),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_fields() {
        let err = CoreError::Validation(vec![
            FieldError::new("phone", "Phone number is required"),
            FieldError::new("name", "Name is required"),
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: phone: Phone number is required, name: Name is required"
        );
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: CoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
