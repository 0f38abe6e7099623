//! Tag API endpoints.
//!
//! Tags are never written directly; they follow the tag strings of topics.

use axum::extract::State;

use super::{success, ApiResult};
use crate::models::Tag;
use crate::AppState;

/// GET /api/tags - List all tags with the topics that use them.
pub async fn list_tags(State(state): State<AppState>) -> ApiResult<Vec<Tag>> {
    success(state.repo.list_tags().await?)
}
