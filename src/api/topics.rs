//! Topic API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{require_text, success, ApiResult};
use crate::auth::AuthContext;
use crate::errors::AppError;
use crate::models::{
    results, Chat, CreateTopicRequest, ModerateTopicRequest, OperationResult, Task, Topic,
    TopicDetail, TopicRecord, UpdateTopicRequest,
};
use crate::AppState;

/// Load the stored columns of a topic or fail with `TopicRemoved`.
pub(super) async fn require_topic(state: &AppState, id: &str) -> Result<TopicRecord, AppError> {
    state
        .repo
        .get_topic_record(id)
        .await?
        .ok_or(AppError::TopicRemoved)
}

/// GET /api/topics - List all topics.
pub async fn list_topics(State(state): State<AppState>) -> ApiResult<Vec<Topic>> {
    success(state.repo.list_topics().await?)
}

/// GET /api/topics/:id - Get a topic with its pinned messages and announcements.
pub async fn get_topic(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<TopicDetail> {
    let detail = state
        .repo
        .get_topic_detail(&id)
        .await?
        .ok_or(AppError::TopicRemoved)?;
    success(detail)
}

/// GET /api/topics/:id/chats - List a topic's messages with their authors.
pub async fn get_topic_chats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Chat>> {
    require_topic(&state, &id).await?;
    success(state.repo.list_topic_chats(&id).await?)
}

/// GET /api/topics/:id/tasks - List a topic's incomplete tasks.
pub async fn get_topic_tasks(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Task>> {
    require_topic(&state, &id).await?;
    success(state.repo.list_open_tasks(&id).await?)
}

/// POST /api/topics - Create a new topic.
pub async fn create_topic(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CreateTopicRequest>,
) -> ApiResult<Topic> {
    let caller = auth.require_active()?;

    require_text(&request.name, "name")?;
    require_text(&request.parent_category, "parentCategory")?;

    success(state.repo.create_topic(&caller.id, &request).await?)
}

/// PUT /api/topics/:id - Update name, description and tag string.
pub async fn update_topic(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthContext,
    Json(request): Json<UpdateTopicRequest>,
) -> ApiResult<Topic> {
    let caller = auth.require_active()?;
    let topic = require_topic(&state, &id).await?;
    caller.require_manage(&topic.created_by)?;

    require_text(&request.name, "name")?;

    success(state.repo.update_topic(&id, &request).await?)
}

/// DELETE /api/topics/:id - Delete a topic and its dependent records.
pub async fn delete_topic(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthContext,
) -> ApiResult<OperationResult> {
    let caller = auth.require_active()?;
    let topic = require_topic(&state, &id).await?;
    caller.require_manage(&topic.created_by)?;

    state.repo.delete_topic(&topic).await?;
    success(OperationResult::new(results::TOPIC_DELETED))
}

/// POST /api/topics/:id/archive - Archive a topic on behalf of its owner.
pub async fn archive_topic(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthContext,
) -> ApiResult<OperationResult> {
    set_self_archived(&state, &id, &auth, true).await?;
    success(OperationResult::new(results::TOPIC_ARCHIVED))
}

/// POST /api/topics/:id/unarchive - Undo an owner-level archive.
pub async fn unarchive_topic(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthContext,
) -> ApiResult<OperationResult> {
    set_self_archived(&state, &id, &auth, false).await?;
    success(OperationResult::new(results::TOPIC_UNARCHIVED))
}

/// Owner-level archive toggles are locked while a moderator archive is in place.
async fn set_self_archived(
    state: &AppState,
    id: &str,
    auth: &AuthContext,
    archived: bool,
) -> Result<(), AppError> {
    let caller = auth.require_active()?;
    let topic = require_topic(state, id).await?;
    caller.require_manage(&topic.created_by)?;

    if topic.is_archived {
        return Err(AppError::NoAuthorization);
    }

    state.repo.set_topic_self_archived(id, archived).await
}

/// PUT /api/topics/:id/moderation - Set the moderator-level archive flag.
pub async fn moderate_topic(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthContext,
    Json(request): Json<ModerateTopicRequest>,
) -> ApiResult<Topic> {
    auth.require_moderator()?;
    require_topic(&state, &id).await?;

    state.repo.set_topic_archived(&id, request.archived).await?;

    let topic = state
        .repo
        .get_topic(&id)
        .await?
        .ok_or(AppError::TopicRemoved)?;
    success(topic)
}
