//! Category model.

use serde::{Deserialize, Serialize};

/// A category grouping topics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_archived: bool,
    pub created_at: String,
    /// Ids of the topics filed under this category (derived from `topics.parent_category`)
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Request body for creating a category.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}
