//! Tag model.

use serde::{Deserialize, Serialize};

/// A tag together with the topics that reference it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub created_at: String,
    /// Ids of the referencing topics, inverse view of the topic-tag edges
    pub topics: Vec<String>,
}

/// Tag as embedded in a topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagRef {
    pub id: String,
    pub name: String,
}
