//! Topic and tag persistence.
//!
//! `topic_tags` is the only stored form of the topic/tag relation; a topic's
//! tag list and a tag's topic list are both read from it. Every write that
//! changes edges runs inside one transaction together with the topic row, so
//! readers never see a topic whose edges disagree with its tag string.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{Row, Sqlite, Transaction};

use super::Repository;
use crate::errors::AppError;
use crate::models::{
    CreateTopicRequest, Tag, TagRef, Topic, TopicDetail, TopicRecord, UpdateTopicRequest,
    UserBrief,
};
use crate::tags::{find_unique_tags, TagDelta};

const TOPIC_SELECT: &str = r#"SELECT t.id, t.name, t.description, t.tag_string, t.parent_category,
                  t.created_by, t.is_archived, t.is_self_archived, t.created_at, t.updated_at,
                  u.name AS creator_name
           FROM topics t LEFT JOIN users u ON u.id = t.created_by"#;

impl Repository {
    // ==================== TOPIC READS ====================

    /// List all topics with creator and tags expanded.
    pub async fn list_topics(&self) -> Result<Vec<Topic>, AppError> {
        let rows = sqlx::query(&format!("{} ORDER BY t.created_at, t.id", TOPIC_SELECT))
            .fetch_all(&self.pool)
            .await?;

        let edge_rows = sqlx::query(
            r#"SELECT tt.topic_id, g.id, g.name
               FROM topic_tags tt JOIN tags g ON g.id = tt.tag_id
               ORDER BY tt.topic_id, tt.position"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut tags_by_topic: HashMap<String, Vec<TagRef>> = HashMap::new();
        for row in &edge_rows {
            tags_by_topic
                .entry(row.get("topic_id"))
                .or_default()
                .push(TagRef {
                    id: row.get("id"),
                    name: row.get("name"),
                });
        }

        Ok(rows
            .iter()
            .map(|row| {
                let mut topic = topic_from_row(row);
                topic.tags = tags_by_topic.remove(&topic.id).unwrap_or_default();
                topic
            })
            .collect())
    }

    /// Get a topic by ID with creator and tags expanded.
    pub async fn get_topic(&self, id: &str) -> Result<Option<Topic>, AppError> {
        let row = sqlx::query(&format!("{} WHERE t.id = ?", TOPIC_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut topic = topic_from_row(&row);
        topic.tags = self.topic_tags(id).await?;
        Ok(Some(topic))
    }

    /// Get a topic together with its pinned messages and announcements.
    pub async fn get_topic_detail(&self, id: &str) -> Result<Option<TopicDetail>, AppError> {
        let Some(topic) = self.get_topic(id).await? else {
            return Ok(None);
        };

        let pinned_messages = self.list_pinned_messages(id).await?;
        let announcements = self.list_announcements(id).await?;

        Ok(Some(TopicDetail {
            topic,
            pinned_messages,
            announcements,
        }))
    }

    /// Get the stored columns of a topic, without expansion.
    pub async fn get_topic_record(&self, id: &str) -> Result<Option<TopicRecord>, AppError> {
        let row = sqlx::query(
            "SELECT id, parent_category, created_by, is_archived FROM topics WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(topic_record_from_row))
    }

    async fn topic_tags(&self, topic_id: &str) -> Result<Vec<TagRef>, AppError> {
        let rows = sqlx::query(
            r#"SELECT g.id, g.name
               FROM topic_tags tt JOIN tags g ON g.id = tt.tag_id
               WHERE tt.topic_id = ?
               ORDER BY tt.position"#,
        )
        .bind(topic_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| TagRef {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }

    // ==================== TOPIC WRITES ====================

    /// Create a topic in a live category and link its tags.
    pub async fn create_topic(
        &self,
        creator_id: &str,
        request: &CreateTopicRequest,
    ) -> Result<Topic, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let mut tx = self.begin_write().await?;

        let category_archived: Option<i32> =
            sqlx::query_scalar("SELECT is_archived FROM categories WHERE id = ?")
                .bind(&request.parent_category)
                .fetch_optional(&mut *tx)
                .await?;

        match category_archived {
            None => return Err(AppError::CategoryRemoved),
            Some(archived) if archived != 0 => return Err(AppError::CategoryArchived),
            Some(_) => {}
        }

        sqlx::query(
            r#"INSERT INTO topics (
                id, name, description, tag_string, parent_category, created_by,
                is_archived, is_self_archived, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, 0, 0, ?, ?)"#,
        )
        .bind(&id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(&request.tag_string)
        .bind(&request.parent_category)
        .bind(creator_id)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        if let Some(tag_string) = request.tag_string.as_deref() {
            for (position, name) in find_unique_tags(tag_string).iter().enumerate() {
                attach_tag(&mut tx, &id, name, position as i64).await?;
            }
        }

        tx.commit().await?;

        tracing::info!(
            "Created topic {} in category {} by {}",
            id,
            request.parent_category,
            creator_id
        );

        self.get_topic(&id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Topic {} missing after create", id)))
    }

    /// Apply a name/description/tag-string edit, reconciling tag edges by delta.
    ///
    /// Tags present in both the old and the new tag string keep their edge
    /// and position; only removed names are detached and only new names are
    /// attached, after the current last position.
    pub async fn update_topic(
        &self,
        id: &str,
        request: &UpdateTopicRequest,
    ) -> Result<Topic, AppError> {
        let now = Utc::now().to_rfc3339();

        let mut tx = self.begin_write().await?;

        let old_tag_string: Option<Option<String>> =
            sqlx::query_scalar("SELECT tag_string FROM topics WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let old_tag_string = old_tag_string.ok_or(AppError::TopicRemoved)?;

        let delta = TagDelta::from_tag_strings(
            old_tag_string.as_deref(),
            request.tag_string.as_deref(),
        );

        if !delta.is_empty() {
            tracing::debug!(
                "Reconciling tags of topic {}: -{:?} +{:?}",
                id,
                delta.removable,
                delta.addable
            );
        }

        for name in &delta.removable {
            let tag_id: Option<String> = sqlx::query_scalar("SELECT id FROM tags WHERE name = ?")
                .bind(name)
                .fetch_optional(&mut *tx)
                .await?;
            match tag_id {
                Some(tag_id) => {
                    if detach_tag(&mut tx, id, &tag_id).await? {
                        tracing::debug!("Tag {:?} has no topics left", name);
                    }
                }
                None => tracing::warn!("Tag {:?} of topic {} already gone", name, id),
            }
        }

        let mut position = next_tag_position(&mut tx, id).await?;
        for name in &delta.addable {
            attach_tag(&mut tx, id, name, position).await?;
            position += 1;
        }

        sqlx::query(
            "UPDATE topics SET name = ?, description = ?, tag_string = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&request.name)
        .bind(&request.description)
        .bind(&request.tag_string)
        .bind(&now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!("Updated topic {}", id);

        self.get_topic(id).await?.ok_or(AppError::TopicRemoved)
    }

    /// Delete a topic and everything hanging off it.
    ///
    /// Orphaned tags, messages, tasks, pins and announcements go with it. The
    /// parent category must still exist; if it does not, nothing is deleted.
    pub async fn delete_topic(&self, topic: &TopicRecord) -> Result<(), AppError> {
        let mut tx = self.begin_write().await?;

        let category_exists: Option<String> =
            sqlx::query_scalar("SELECT id FROM categories WHERE id = ?")
                .bind(&topic.parent_category)
                .fetch_optional(&mut *tx)
                .await?;
        if category_exists.is_none() {
            tracing::warn!(
                "Refusing to delete topic {}: category {} is gone",
                topic.id,
                topic.parent_category
            );
            return Err(AppError::CategoryRemoved);
        }

        let tag_ids: Vec<String> =
            sqlx::query_scalar("SELECT tag_id FROM topic_tags WHERE topic_id = ? ORDER BY position")
                .bind(&topic.id)
                .fetch_all(&mut *tx)
                .await?;
        let mut tags_deleted = 0;
        for tag_id in &tag_ids {
            if detach_tag(&mut tx, &topic.id, tag_id).await? {
                tags_deleted += 1;
            }
        }

        let messages = sqlx::query("DELETE FROM messages WHERE parent_topic = ?")
            .bind(&topic.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM tasks WHERE parent_topic = ?")
            .bind(&topic.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM pinned_messages WHERE topic_id = ?")
            .bind(&topic.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM announcements WHERE topic_id = ?")
            .bind(&topic.id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM topics WHERE id = ?")
            .bind(&topic.id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::TopicRemoved);
        }

        tx.commit().await?;

        tracing::info!(
            "Deleted topic {} ({} tags detached, {} orphaned tags removed, {} messages removed)",
            topic.id,
            tag_ids.len(),
            tags_deleted,
            messages.rows_affected()
        );
        Ok(())
    }

    /// Set the owner-level archive flag.
    pub async fn set_topic_self_archived(&self, id: &str, archived: bool) -> Result<(), AppError> {
        self.set_topic_flag(
            id,
            "UPDATE topics SET is_self_archived = ?, updated_at = ? WHERE id = ?",
            archived,
        )
        .await?;
        tracing::info!("Topic {} self-archived={}", id, archived);
        Ok(())
    }

    /// Set the moderator-level archive flag.
    pub async fn set_topic_archived(&self, id: &str, archived: bool) -> Result<(), AppError> {
        self.set_topic_flag(
            id,
            "UPDATE topics SET is_archived = ?, updated_at = ? WHERE id = ?",
            archived,
        )
        .await?;
        tracing::info!("Topic {} moderator-archived={}", id, archived);
        Ok(())
    }

    async fn set_topic_flag(&self, id: &str, sql: &str, value: bool) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(sql)
            .bind(value as i32)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::TopicRemoved);
        }
        Ok(())
    }

    /// Start a transaction holding the write lock from its first statement,
    /// so concurrent writers queue on the busy timeout.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, AppError> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    // ==================== TAG READS ====================

    /// List all tags with the ids of the topics referencing them.
    pub async fn list_tags(&self) -> Result<Vec<Tag>, AppError> {
        let rows = sqlx::query("SELECT id, name, created_at FROM tags ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        let edge_rows = sqlx::query(
            r#"SELECT tt.tag_id, tt.topic_id
               FROM topic_tags tt JOIN topics t ON t.id = tt.topic_id
               ORDER BY t.created_at, t.id"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut topics_by_tag: HashMap<String, Vec<String>> = HashMap::new();
        for row in &edge_rows {
            topics_by_tag
                .entry(row.get("tag_id"))
                .or_default()
                .push(row.get("topic_id"));
        }

        Ok(rows
            .iter()
            .map(|row| {
                let id: String = row.get("id");
                let topics = topics_by_tag.remove(&id).unwrap_or_default();
                Tag {
                    id,
                    name: row.get("name"),
                    created_at: row.get("created_at"),
                    topics,
                }
            })
            .collect())
    }
}

// Edge maintenance, always inside the caller's transaction

/// Locate or create the tag called `name` and link it to the topic.
async fn attach_tag(
    tx: &mut Transaction<'_, Sqlite>,
    topic_id: &str,
    name: &str,
    position: i64,
) -> Result<String, AppError> {
    let now = Utc::now().to_rfc3339();

    sqlx::query("INSERT INTO tags (id, name, created_at) VALUES (?, ?, ?) ON CONFLICT(name) DO NOTHING")
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(name)
        .bind(&now)
        .execute(&mut **tx)
        .await?;

    let tag_id: String = sqlx::query_scalar("SELECT id FROM tags WHERE name = ?")
        .bind(name)
        .fetch_one(&mut **tx)
        .await?;

    sqlx::query("INSERT OR IGNORE INTO topic_tags (topic_id, tag_id, position) VALUES (?, ?, ?)")
        .bind(topic_id)
        .bind(&tag_id)
        .bind(position)
        .execute(&mut **tx)
        .await?;

    Ok(tag_id)
}

/// Unlink a tag from a topic, deleting the tag once no topic references it.
///
/// Returns `true` when the tag itself was deleted.
async fn detach_tag(
    tx: &mut Transaction<'_, Sqlite>,
    topic_id: &str,
    tag_id: &str,
) -> Result<bool, AppError> {
    sqlx::query("DELETE FROM topic_tags WHERE topic_id = ? AND tag_id = ?")
        .bind(topic_id)
        .bind(tag_id)
        .execute(&mut **tx)
        .await?;

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM topic_tags WHERE tag_id = ?")
        .bind(tag_id)
        .fetch_one(&mut **tx)
        .await?;

    if remaining > 0 {
        return Ok(false);
    }

    sqlx::query("DELETE FROM tags WHERE id = ?")
        .bind(tag_id)
        .execute(&mut **tx)
        .await?;
    tracing::debug!("Deleted orphaned tag {}", tag_id);
    Ok(true)
}

async fn next_tag_position(
    tx: &mut Transaction<'_, Sqlite>,
    topic_id: &str,
) -> Result<i64, AppError> {
    let max: Option<i64> =
        sqlx::query_scalar("SELECT MAX(position) FROM topic_tags WHERE topic_id = ?")
            .bind(topic_id)
            .fetch_one(&mut **tx)
            .await?;
    Ok(max.map_or(0, |m| m + 1))
}

// Helper functions for row conversion

fn topic_from_row(row: &sqlx::sqlite::SqliteRow) -> Topic {
    let is_archived: i32 = row.get("is_archived");
    let is_self_archived: i32 = row.get("is_self_archived");
    let created_by: String = row.get("created_by");
    let creator_name: Option<String> = row.get("creator_name");

    Topic {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        tag_string: row.get("tag_string"),
        parent_category: row.get("parent_category"),
        created_by: creator_name.map(|name| UserBrief {
            id: created_by,
            name,
        }),
        is_archived: is_archived != 0,
        is_self_archived: is_self_archived != 0,
        tags: Vec::new(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn topic_record_from_row(row: &sqlx::sqlite::SqliteRow) -> TopicRecord {
    let is_archived: i32 = row.get("is_archived");
    TopicRecord {
        id: row.get("id"),
        parent_category: row.get("parent_category"),
        created_by: row.get("created_by"),
        is_archived: is_archived != 0,
    }
}
