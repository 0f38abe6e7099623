//! Chats, tasks, pins and announcements inside a topic.

use chrono::Utc;
use sqlx::Row;

use super::Repository;
use crate::errors::AppError;
use crate::models::{Announcement, Chat, CreateTaskRequest, Message, Task, UserBrief};

impl Repository {
    // ==================== MESSAGES ====================

    /// List a topic's messages, oldest first, each with its author resolved.
    pub async fn list_topic_chats(&self, topic_id: &str) -> Result<Vec<Chat>, AppError> {
        let rows = sqlx::query(
            r#"SELECT m.id, m.parent_topic, m.user_id, m.description, m.created_at,
                      u.name AS user_name
               FROM messages m LEFT JOIN users u ON u.id = m.user_id
               WHERE m.parent_topic = ?
               ORDER BY m.created_at, m.rowid"#,
        )
        .bind(topic_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let message = message_from_row(row);
                let user = row
                    .get::<Option<String>, _>("user_name")
                    .map(|name| UserBrief {
                        id: message.user_id.clone(),
                        name,
                    });
                Chat { message, user }
            })
            .collect())
    }

    /// Get a message by ID.
    pub async fn get_message(&self, id: &str) -> Result<Option<Message>, AppError> {
        let row = sqlx::query(
            "SELECT id, parent_topic, user_id, description, created_at FROM messages WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(message_from_row))
    }

    /// Post a message into a topic.
    pub async fn create_message(
        &self,
        topic_id: &str,
        user_id: &str,
        description: &str,
    ) -> Result<Message, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO messages (id, parent_topic, user_id, description, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(topic_id)
        .bind(user_id)
        .bind(description)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        tracing::debug!("User {} posted message {} in topic {}", user_id, id, topic_id);

        Ok(Message {
            id,
            parent_topic: topic_id.to_string(),
            user_id: user_id.to_string(),
            description: description.to_string(),
            created_at: now,
        })
    }

    // ==================== TASKS ====================

    /// List a topic's incomplete tasks.
    ///
    /// A task attached to a message reports that message's description and
    /// parent topic instead of its own.
    pub async fn list_open_tasks(&self, topic_id: &str) -> Result<Vec<Task>, AppError> {
        let rows = sqlx::query(
            r#"SELECT k.id, k.parent_topic, k.description, k.is_completed, k.attached_message,
                      k.created_at,
                      m.description AS message_description,
                      m.parent_topic AS message_parent_topic
               FROM tasks k LEFT JOIN messages m ON m.id = k.attached_message
               WHERE k.parent_topic = ? AND k.is_completed = 0
               ORDER BY k.created_at, k.rowid"#,
        )
        .bind(topic_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let mut task = task_from_row(row);
                let message_description: Option<String> = row.get("message_description");
                let message_parent_topic: Option<String> = row.get("message_parent_topic");
                if let (Some(description), Some(parent_topic)) =
                    (message_description, message_parent_topic)
                {
                    task.description = Some(description);
                    task.parent_topic = parent_topic;
                } else if let Some(message_id) = &task.attached_message {
                    tracing::warn!("Task {} points at missing message {}", task.id, message_id);
                }
                task
            })
            .collect())
    }

    /// Get a task by ID, with its own stored fields.
    pub async fn get_task(&self, id: &str) -> Result<Option<Task>, AppError> {
        let row = sqlx::query(
            "SELECT id, parent_topic, description, is_completed, attached_message, created_at FROM tasks WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(task_from_row))
    }

    /// Create a task in a topic.
    pub async fn create_task(
        &self,
        topic_id: &str,
        request: &CreateTaskRequest,
    ) -> Result<Task, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO tasks (id, parent_topic, description, is_completed, attached_message, created_at) VALUES (?, ?, ?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(topic_id)
        .bind(&request.description)
        .bind(&request.attached_message)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        tracing::info!("Created task {} in topic {}", id, topic_id);

        Ok(Task {
            id,
            parent_topic: topic_id.to_string(),
            description: request.description.clone(),
            is_completed: false,
            attached_message: request.attached_message.clone(),
            created_at: now,
        })
    }

    /// Mark a task completed.
    pub async fn complete_task(&self, id: &str) -> Result<Task, AppError> {
        let result = sqlx::query("UPDATE tasks SET is_completed = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Task {} not found", id)));
        }

        tracing::info!("Completed task {}", id);

        self.get_task(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Task {} not found", id)))
    }

    // ==================== PINS & ANNOUNCEMENTS ====================

    /// Pin a message to its topic. Pinning an already pinned message is a no-op.
    pub async fn pin_message(&self, topic_id: &str, message_id: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"INSERT OR IGNORE INTO pinned_messages (topic_id, message_id, position)
               VALUES (?, ?, (SELECT COALESCE(MAX(position) + 1, 0) FROM pinned_messages WHERE topic_id = ?))"#,
        )
        .bind(topic_id)
        .bind(message_id)
        .bind(topic_id)
        .execute(&self.pool)
        .await?;

        tracing::info!("Pinned message {} in topic {}", message_id, topic_id);
        Ok(())
    }

    /// List a topic's pinned messages in pin order.
    pub async fn list_pinned_messages(&self, topic_id: &str) -> Result<Vec<Message>, AppError> {
        let rows = sqlx::query(
            r#"SELECT m.id, m.parent_topic, m.user_id, m.description, m.created_at
               FROM pinned_messages p JOIN messages m ON m.id = p.message_id
               WHERE p.topic_id = ?
               ORDER BY p.position"#,
        )
        .bind(topic_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(message_from_row).collect())
    }

    /// List a topic's announcements, oldest first.
    pub async fn list_announcements(&self, topic_id: &str) -> Result<Vec<Announcement>, AppError> {
        let rows = sqlx::query(
            r#"SELECT id, topic_id, description, created_by, created_at
               FROM announcements WHERE topic_id = ?
               ORDER BY created_at, rowid"#,
        )
        .bind(topic_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Announcement {
                id: row.get("id"),
                topic_id: row.get("topic_id"),
                description: row.get("description"),
                created_by: row.get("created_by"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    /// Publish an announcement in a topic.
    pub async fn create_announcement(
        &self,
        topic_id: &str,
        author_id: &str,
        description: &str,
    ) -> Result<Announcement, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO announcements (id, topic_id, description, created_by, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(topic_id)
        .bind(description)
        .bind(author_id)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        tracing::info!("Created announcement {} in topic {}", id, topic_id);

        Ok(Announcement {
            id,
            topic_id: topic_id.to_string(),
            description: description.to_string(),
            created_by: author_id.to_string(),
            created_at: now,
        })
    }
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Message {
    Message {
        id: row.get("id"),
        parent_topic: row.get("parent_topic"),
        user_id: row.get("user_id"),
        description: row.get("description"),
        created_at: row.get("created_at"),
    }
}

fn task_from_row(row: &sqlx::sqlite::SqliteRow) -> Task {
    let is_completed: i32 = row.get("is_completed");
    Task {
        id: row.get("id"),
        parent_topic: row.get("parent_topic"),
        description: row.get("description"),
        is_completed: is_completed != 0,
        attached_message: row.get("attached_message"),
        created_at: row.get("created_at"),
    }
}
