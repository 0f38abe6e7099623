//! Authentication and authorization.
//!
//! Two layers guard the API. The gateway layer checks a pre-shared key with a
//! constant-time comparison. The caller layer resolves the `x-user-id` header
//! into an [`AuthContext`] that handlers receive as an explicit argument.

use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use subtle::ConstantTimeEq;

use crate::errors::{codes, AppError, ErrorResponse};
use crate::AppState;

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header naming the calling user.
pub const USER_ID_HEADER: &str = "x-user-id";

/// PSK authentication layer function that takes the expected PSK as a parameter.
pub async fn psk_auth_layer(
    expected_psk: Option<String>,
    request: Request,
    next: Next,
) -> Response {
    // If no PSK is configured, allow all requests (dev mode)
    let Some(expected) = expected_psk else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    match provided {
        Some(provided_key) => {
            if constant_time_compare(&provided_key, &expected) {
                next.run(request).await
            } else {
                unauthorized_response("Invalid API key")
            }
        }
        None => {
            let bearer = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
                .map(|s| s.to_string());

            match bearer {
                Some(bearer_key) if constant_time_compare(&bearer_key, &expected) => {
                    next.run(request).await
                }
                _ => unauthorized_response("Missing or invalid API key"),
            }
        }
    }
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorResponse::new(codes::UNAUTHORIZED, message);
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

/// Identity and standing of the calling user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    pub is_blocked: bool,
    pub is_removed: bool,
    pub is_moderator: bool,
}

impl CurrentUser {
    /// Owners and moderators may manage a record.
    pub fn can_manage(&self, owner_id: &str) -> bool {
        self.id == owner_id || self.is_moderator
    }

    /// Fail with `NoAuthorization` unless the caller may manage the record.
    pub fn require_manage(&self, owner_id: &str) -> Result<(), AppError> {
        if self.can_manage(owner_id) {
            Ok(())
        } else {
            Err(AppError::NoAuthorization)
        }
    }
}

/// Per-request caller context.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub current_user: Option<CurrentUser>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self { current_user: None }
    }

    pub fn for_user(user: CurrentUser) -> Self {
        Self {
            current_user: Some(user),
        }
    }

    /// The caller must be signed in and neither blocked nor removed.
    pub fn require_active(&self) -> Result<&CurrentUser, AppError> {
        let user = self.current_user.as_ref().ok_or(AppError::Authentication)?;
        if user.is_blocked || user.is_removed {
            return Err(AppError::NoAuthorization);
        }
        Ok(user)
    }

    /// The caller must be an active moderator.
    pub fn require_moderator(&self) -> Result<&CurrentUser, AppError> {
        let user = self.require_active()?;
        if !user.is_moderator {
            return Err(AppError::NoAuthorization);
        }
        Ok(user)
    }
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let Some(user_id) = user_id else {
            return Ok(AuthContext::anonymous());
        };

        match state.repo.get_user_standing(user_id).await? {
            Some(user) => Ok(AuthContext::for_user(user)),
            None => {
                tracing::debug!("Unknown caller id {}", user_id);
                Ok(AuthContext::anonymous())
            }
        }
    }
}
