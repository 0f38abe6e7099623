//! Topic model and its request/response shapes.

use serde::{Deserialize, Serialize};

use super::{Announcement, Message, TagRef, UserBrief};

/// A discussion topic with its creator and tags expanded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_string: Option<String>,
    pub parent_category: String,
    /// Creator, `None` when the user record no longer exists
    pub created_by: Option<UserBrief>,
    /// Moderator-level archive flag
    pub is_archived: bool,
    /// Owner-level archive flag
    pub is_self_archived: bool,
    /// Tags in tag-string order
    pub tags: Vec<TagRef>,
    pub created_at: String,
    pub updated_at: String,
}

/// Stored topic columns needed to authorize a change, without expansion.
#[derive(Debug, Clone)]
pub struct TopicRecord {
    pub id: String,
    pub parent_category: String,
    pub created_by: String,
    pub is_archived: bool,
}

/// Response of a single-topic read: pinned messages and announcements
/// travel beside the topic rather than inside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicDetail {
    pub topic: Topic,
    pub pinned_messages: Vec<Message>,
    pub announcements: Vec<Announcement>,
}

/// Request body for creating a new topic.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTopicRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tag_string: Option<String>,
    pub parent_category: String,
}

/// Request body for updating an existing topic.
///
/// Every field is written as given; an absent tag string clears the tags.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTopicRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tag_string: Option<String>,
}

/// Request body for the moderator-level archive switch.
#[derive(Debug, Clone, Deserialize)]
pub struct ModerateTopicRequest {
    pub archived: bool,
}

/// Fixed-text result of a state-changing operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub result: String,
}

impl OperationResult {
    pub fn new(result: &str) -> Self {
        Self {
            result: result.to_string(),
        }
    }
}

/// Result texts returned by topic operations.
pub mod results {
    pub const TOPIC_DELETED: &str = "Topic deleted successfully.";
    pub const TOPIC_ARCHIVED: &str = "Topic archived successfully.";
    pub const TOPIC_UNARCHIVED: &str = "Topic unarchived successfully.";
    pub const MESSAGE_PINNED: &str = "Message pinned successfully.";
}
