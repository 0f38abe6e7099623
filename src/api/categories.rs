//! Category API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{require_text, success, ApiResult};
use crate::auth::AuthContext;
use crate::models::{Category, CreateCategoryRequest};
use crate::AppState;

/// GET /api/categories - List all categories.
pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Vec<Category>> {
    success(state.repo.list_categories().await?)
}

/// POST /api/categories - Create a category.
pub async fn create_category(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CreateCategoryRequest>,
) -> ApiResult<Category> {
    auth.require_moderator()?;
    require_text(&request.name, "name")?;
    success(state.repo.create_category(&request).await?)
}

/// POST /api/categories/:id/archive - Archive a category, closing it to new topics.
pub async fn archive_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthContext,
) -> ApiResult<Category> {
    auth.require_moderator()?;
    success(state.repo.set_category_archived(&id, true).await?)
}

/// POST /api/categories/:id/unarchive - Reopen a category.
pub async fn unarchive_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthContext,
) -> ApiResult<Category> {
    auth.require_moderator()?;
    success(state.repo.set_category_archived(&id, false).await?)
}
