//! Chat, task, pin and announcement endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::topics::require_topic;
use super::{require_text, success, ApiResult};
use crate::auth::AuthContext;
use crate::errors::AppError;
use crate::models::{
    results, Announcement, CreateAnnouncementRequest, CreateTaskRequest, Message,
    OperationResult, PinMessageRequest, PostChatRequest, Task,
};
use crate::AppState;

/// POST /api/topics/:id/chats - Post a message into a topic.
pub async fn post_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthContext,
    Json(request): Json<PostChatRequest>,
) -> ApiResult<Message> {
    let caller = auth.require_active()?;
    require_topic(&state, &id).await?;
    require_text(&request.description, "description")?;

    success(
        state
            .repo
            .create_message(&id, &caller.id, &request.description)
            .await?,
    )
}

/// POST /api/topics/:id/tasks - Create a task, optionally attached to a message.
pub async fn create_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthContext,
    Json(request): Json<CreateTaskRequest>,
) -> ApiResult<Task> {
    let caller = auth.require_active()?;
    let topic = require_topic(&state, &id).await?;
    caller.require_manage(&topic.created_by)?;

    match &request.attached_message {
        Some(message_id) => {
            if state.repo.get_message(message_id).await?.is_none() {
                return Err(AppError::NotFound(format!(
                    "Message {} not found",
                    message_id
                )));
            }
        }
        None => {
            let description = request.description.as_deref().unwrap_or_default();
            require_text(description, "description")?;
        }
    }

    success(state.repo.create_task(&id, &request).await?)
}

/// POST /api/tasks/:id/complete - Mark a task completed.
pub async fn complete_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    auth: AuthContext,
) -> ApiResult<Task> {
    let caller = auth.require_active()?;
    let task = state
        .repo
        .get_task(&task_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Task {} not found", task_id)))?;
    let topic = require_topic(&state, &task.parent_topic).await?;
    caller.require_manage(&topic.created_by)?;

    success(state.repo.complete_task(&task_id).await?)
}

/// POST /api/topics/:id/pins - Pin one of the topic's messages.
pub async fn pin_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthContext,
    Json(request): Json<PinMessageRequest>,
) -> ApiResult<OperationResult> {
    let caller = auth.require_active()?;
    let topic = require_topic(&state, &id).await?;
    caller.require_manage(&topic.created_by)?;

    let message = state
        .repo
        .get_message(&request.message_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Message {} not found", request.message_id)))?;
    if message.parent_topic != id {
        return Err(AppError::Validation {
            field: "messageId",
            message: "Only messages of this topic can be pinned".to_string(),
        });
    }

    state.repo.pin_message(&id, &message.id).await?;
    success(OperationResult::new(results::MESSAGE_PINNED))
}

/// POST /api/topics/:id/announcements - Publish an announcement in a topic.
pub async fn create_announcement(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthContext,
    Json(request): Json<CreateAnnouncementRequest>,
) -> ApiResult<Announcement> {
    let caller = auth.require_active()?;
    let topic = require_topic(&state, &id).await?;
    caller.require_manage(&topic.created_by)?;
    require_text(&request.description, "description")?;

    success(
        state
            .repo
            .create_announcement(&id, &caller.id, &request.description)
            .await?,
    )
}
