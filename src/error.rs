//! Structured error types shared by the REST, tool, and agent layers.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use std::fmt;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (client)
    MissingRequiredField,
    InvalidFieldValue,

    // Not found / resolution errors
    TaskNotFound,
    AmbiguousTitle,

    // Upstream failures (server)
    DatabaseError,
    ModelError,
    InternalError,
    UnknownTool,
}

impl ErrorCode {
    /// HTTP status this code maps to at the REST boundary.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::MissingRequiredField | ErrorCode::InvalidFieldValue => {
                StatusCode::BAD_REQUEST
            }
            ErrorCode::TaskNotFound => StatusCode::NOT_FOUND,
            ErrorCode::AmbiguousTitle => StatusCode::CONFLICT,
            ErrorCode::DatabaseError
            | ErrorCode::ModelError
            | ErrorCode::InternalError
            | ErrorCode::UnknownTool => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Structured error carried through every layer of the service.
#[derive(Debug, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("{} is required", field),
        )
        .with_field(field)
    }

    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::new(ErrorCode::InvalidFieldValue, reason).with_field(field)
    }

    pub fn task_not_found(ident: impl fmt::Display) -> Self {
        Self::new(ErrorCode::TaskNotFound, format!("Task not found: {}", ident))
    }

    pub fn ambiguous_title(title: &str, ids: &[i64]) -> Self {
        Self::new(
            ErrorCode::AmbiguousTitle,
            format!("Multiple tasks match title '{}'", title),
        )
        .with_details(format!(
            "matching ids: {}",
            ids.iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    pub fn database(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::DatabaseError, err.to_string())
    }

    pub fn model(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::ModelError, err.to_string())
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(ErrorCode::UnknownTool, format!("Unknown tool: {}", name))
    }

    /// Serialize for tool results: the model sees these and can self-correct.
    pub fn to_tool_value(&self) -> serde_json::Value {
        json!({ "error": self })
    }
}

/// The db layer propagates `anyhow::Error`; unwrap it back to a structured
/// error. SQLite failures keep their own code so callers can tell a broken
/// store from a programming error.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ApiError>() {
            Ok(api_err) => api_err,
            Err(err) => match err.downcast::<rusqlite::Error>() {
                Ok(db_err) => ApiError::database(db_err),
                Err(err) => ApiError::internal(err),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status();
        // Upstream failures are surfaced with a generic message; the detail
        // goes to the log, not the client.
        let body = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(code = ?self.code, "request failed: {}", self.message);
            json!({ "error": { "code": self.code, "message": "internal server error" } })
        } else {
            json!({ "error": self })
        };
        (status, Json(body)).into_response()
    }
}

/// Result type shared across layers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
