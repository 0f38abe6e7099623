//! Error handling module for the forum backend.
//!
//! Provides centralized error types with mapping to HTTP status codes and response envelopes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const NO_AUTHORIZATION: &str = "NO_AUTHORIZATION";
    pub const TOPIC_REMOVED: &str = "TOPIC_REMOVED";
    pub const CATEGORY_REMOVED: &str = "CATEGORY_REMOVED";
    pub const CATEGORY_ARCHIVED: &str = "CATEGORY_ARCHIVED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
}

/// Fixed messages shown to clients for each failure kind.
pub mod messages {
    pub const AUTHENTICATION: &str = "Unauthenticated! Please sign in to continue.";
    pub const NO_AUTHORIZATION: &str = "You are not authorized to perform this action.";
    pub const TOPIC_REMOVED: &str = "This topic has been removed.";
    pub const CATEGORY_REMOVED: &str = "This category has been removed.";
    pub const CATEGORY_ARCHIVED: &str = "This category has been archived.";
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// Caller is not signed in
    Authentication,
    /// Caller is blocked, removed, or lacks rights over the record
    NoAuthorization,
    /// Referenced topic does not exist
    TopicRemoved,
    /// Referenced category does not exist
    CategoryRemoved,
    /// Target category is archived
    CategoryArchived,
    /// Resource not found
    NotFound(String),
    /// Validation error on one request field
    Validation { field: &'static str, message: String },
    /// Database error
    Database(String),
    /// Internal server error
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Authentication => StatusCode::UNAUTHORIZED,
            AppError::NoAuthorization => StatusCode::FORBIDDEN,
            AppError::TopicRemoved => StatusCode::NOT_FOUND,
            AppError::CategoryRemoved => StatusCode::NOT_FOUND,
            AppError::CategoryArchived => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Authentication => codes::UNAUTHENTICATED,
            AppError::NoAuthorization => codes::NO_AUTHORIZATION,
            AppError::TopicRemoved => codes::TOPIC_REMOVED,
            AppError::CategoryRemoved => codes::CATEGORY_REMOVED,
            AppError::CategoryArchived => codes::CATEGORY_ARCHIVED,
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::Validation { .. } => codes::VALIDATION_ERROR,
            AppError::Database(_) => codes::DATABASE_ERROR,
            AppError::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            AppError::Authentication => messages::AUTHENTICATION.to_string(),
            AppError::NoAuthorization => messages::NO_AUTHORIZATION.to_string(),
            AppError::TopicRemoved => messages::TOPIC_REMOVED.to_string(),
            AppError::CategoryRemoved => messages::CATEGORY_REMOVED.to_string(),
            AppError::CategoryArchived => messages::CATEGORY_ARCHIVED.to_string(),
            AppError::Validation { message, .. } => message.clone(),
            AppError::NotFound(msg) | AppError::Database(msg) | AppError::Internal(msg) => {
                msg.clone()
            }
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AppError::Database(format!("Database error: {}", err))
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetails,
}

impl ErrorResponse {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorDetails {
                code: code.to_string(),
                message: message.into(),
                details: None,
            },
        }
    }
}

impl From<&AppError> for ErrorResponse {
    fn from(error: &AppError) -> Self {
        let mut response = ErrorResponse::new(error.error_code(), error.message());
        if let AppError::Validation { field, .. } = error {
            response.error.details = Some(serde_json::json!({ "field": field }));
        }
        response
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status_code().is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        let body = ErrorResponse::from(&self);
        (self.status_code(), Json(body)).into_response()
    }
}
