//! User model.

use serde::{Deserialize, Serialize};

/// A forum user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub is_blocked: bool,
    pub is_removed: bool,
    pub is_moderator: bool,
    pub created_at: String,
    /// Ids of the topics this user created (derived from `topics.created_by`)
    #[serde(default)]
    pub topics_created: Vec<String>,
}

/// Brief user projection used when a user is embedded in another record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserBrief {
    pub id: String,
    pub name: String,
}

/// Request body for registering a user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    #[serde(default)]
    pub is_moderator: bool,
}

/// Request body for changing a user's standing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserStatusRequest {
    #[serde(default)]
    pub is_blocked: Option<bool>,
    #[serde(default)]
    pub is_removed: Option<bool>,
    #[serde(default)]
    pub is_moderator: Option<bool>,
}
