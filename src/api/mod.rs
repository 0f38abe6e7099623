//! REST API module.
//!
//! Contains all API routes and handlers. Handlers take the caller's
//! [`AuthContext`](crate::auth::AuthContext) as an explicit argument and
//! check it before touching any topic data.

mod activity;
mod categories;
mod tags;
mod topics;
mod users;

pub use activity::*;
pub use categories::*;
pub use tags::*;
pub use topics::*;
pub use users::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// Reject blank required text fields.
fn require_text(value: &str, field: &'static str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation {
            field,
            message: format!("{} is required", field),
        });
    }
    Ok(())
}
