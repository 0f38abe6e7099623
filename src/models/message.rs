//! Messages posted inside a topic, and the tasks and announcements built on them.

use serde::{Deserialize, Serialize};

use super::UserBrief;

/// A chat message in a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub parent_topic: String,
    pub user_id: String,
    pub description: String,
    pub created_at: String,
}

/// A chat message with its author resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    #[serde(flatten)]
    pub message: Message,
    /// `None` when the author no longer exists
    pub user: Option<UserBrief>,
}

/// A to-do item in a topic.
///
/// When `attached_message` is set, `description` and `parent_topic` are
/// reported from that message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub parent_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attached_message: Option<String>,
    pub created_at: String,
}

/// A topic-wide announcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: String,
    pub topic_id: String,
    pub description: String,
    pub created_by: String,
    pub created_at: String,
}

/// Request body for posting a chat message.
#[derive(Debug, Clone, Deserialize)]
pub struct PostChatRequest {
    pub description: String,
}

/// Request body for creating a task.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attached_message: Option<String>,
}

/// Request body for pinning a message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinMessageRequest {
    pub message_id: String,
}

/// Request body for creating an announcement.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAnnouncementRequest {
    pub description: String,
}
