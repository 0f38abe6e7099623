//! User API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{require_text, success, ApiResult};
use crate::auth::AuthContext;
use crate::models::{CreateUserRequest, UpdateUserStatusRequest, User};
use crate::AppState;

/// POST /api/users - Register a user.
///
/// Anyone past the gateway may register a plain account; only a moderator
/// may register another moderator.
pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<User> {
    if request.is_moderator {
        auth.require_moderator()?;
    }
    require_text(&request.name, "name")?;
    success(state.repo.create_user(&request).await?)
}

/// PUT /api/users/:id/status - Block, remove or promote a user.
pub async fn update_user_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthContext,
    Json(request): Json<UpdateUserStatusRequest>,
) -> ApiResult<User> {
    auth.require_moderator()?;
    success(state.repo.update_user_status(&id, &request).await?)
}
