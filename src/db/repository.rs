//! Database repository for CRUD operations.
//!
//! Uses prepared statements everywhere and transactions for every write that
//! touches more than one table. Topic and tag operations live in `topics.rs`,
//! chats, tasks and announcements in `activity.rs`.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{Category, CreateCategoryRequest, CreateUserRequest, UpdateUserStatusRequest, User};

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pub(super) pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== USER OPERATIONS ====================

    /// Get a user by ID, with the ids of the topics they created.
    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, is_blocked, is_removed, is_moderator, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut user = user_from_row(&row);
        user.topics_created = sqlx::query_scalar::<_, String>(
            "SELECT id FROM topics WHERE created_by = ? ORDER BY created_at, id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(user))
    }

    /// Read only the flags that decide what a caller may do.
    pub async fn get_user_standing(&self, id: &str) -> Result<Option<CurrentUser>, AppError> {
        let row = sqlx::query("SELECT id, is_blocked, is_removed, is_moderator FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| {
            let is_blocked: i32 = row.get("is_blocked");
            let is_removed: i32 = row.get("is_removed");
            let is_moderator: i32 = row.get("is_moderator");
            CurrentUser {
                id: row.get("id"),
                is_blocked: is_blocked != 0,
                is_removed: is_removed != 0,
                is_moderator: is_moderator != 0,
            }
        }))
    }

    /// Register a new user.
    pub async fn create_user(&self, request: &CreateUserRequest) -> Result<User, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO users (id, name, is_blocked, is_removed, is_moderator, created_at) VALUES (?, ?, 0, 0, ?, ?)",
        )
        .bind(&id)
        .bind(&request.name)
        .bind(request.is_moderator as i32)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        tracing::info!("Created user {}", id);

        Ok(User {
            id,
            name: request.name.clone(),
            is_blocked: false,
            is_removed: false,
            is_moderator: request.is_moderator,
            created_at: now,
            topics_created: Vec::new(),
        })
    }

    /// Change the blocked/removed/moderator flags of a user.
    pub async fn update_user_status(
        &self,
        id: &str,
        request: &UpdateUserStatusRequest,
    ) -> Result<User, AppError> {
        let existing = self
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;

        let is_blocked = request.is_blocked.unwrap_or(existing.is_blocked);
        let is_removed = request.is_removed.unwrap_or(existing.is_removed);
        let is_moderator = request.is_moderator.unwrap_or(existing.is_moderator);

        sqlx::query("UPDATE users SET is_blocked = ?, is_removed = ?, is_moderator = ? WHERE id = ?")
            .bind(is_blocked as i32)
            .bind(is_removed as i32)
            .bind(is_moderator as i32)
            .bind(id)
            .execute(&self.pool)
            .await?;

        tracing::info!(
            "Updated user {} status: blocked={}, removed={}, moderator={}",
            id,
            is_blocked,
            is_removed,
            is_moderator
        );

        Ok(User {
            is_blocked,
            is_removed,
            is_moderator,
            ..existing
        })
    }

    // ==================== CATEGORY OPERATIONS ====================

    /// List all categories with their topic ids.
    pub async fn list_categories(&self) -> Result<Vec<Category>, AppError> {
        let rows = sqlx::query(
            "SELECT id, name, description, is_archived, created_at FROM categories ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        let topic_rows =
            sqlx::query("SELECT id, parent_category FROM topics ORDER BY created_at, id")
                .fetch_all(&self.pool)
                .await?;

        let mut topics_by_category: HashMap<String, Vec<String>> = HashMap::new();
        for row in &topic_rows {
            topics_by_category
                .entry(row.get("parent_category"))
                .or_default()
                .push(row.get("id"));
        }

        Ok(rows
            .iter()
            .map(|row| {
                let mut category = category_from_row(row);
                category.topics = topics_by_category.remove(&category.id).unwrap_or_default();
                category
            })
            .collect())
    }

    /// Get a category by ID, with its topic ids.
    pub async fn get_category(&self, id: &str) -> Result<Option<Category>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, description, is_archived, created_at FROM categories WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut category = category_from_row(&row);
        category.topics = sqlx::query_scalar::<_, String>(
            "SELECT id FROM topics WHERE parent_category = ? ORDER BY created_at, id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(category))
    }

    /// Create a new category.
    pub async fn create_category(
        &self,
        request: &CreateCategoryRequest,
    ) -> Result<Category, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO categories (id, name, description, is_archived, created_at) VALUES (?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        tracing::info!("Created category {}", id);

        Ok(Category {
            id,
            name: request.name.clone(),
            description: request.description.clone(),
            is_archived: false,
            created_at: now,
            topics: Vec::new(),
        })
    }

    /// Archive or unarchive a category.
    pub async fn set_category_archived(
        &self,
        id: &str,
        archived: bool,
    ) -> Result<Category, AppError> {
        let result = sqlx::query("UPDATE categories SET is_archived = ? WHERE id = ?")
            .bind(archived as i32)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::CategoryRemoved);
        }

        tracing::info!("Category {} archived={}", id, archived);

        self.get_category(id).await?.ok_or(AppError::CategoryRemoved)
    }
}

// Helper functions for row conversion

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> User {
    let is_blocked: i32 = row.get("is_blocked");
    let is_removed: i32 = row.get("is_removed");
    let is_moderator: i32 = row.get("is_moderator");
    User {
        id: row.get("id"),
        name: row.get("name"),
        is_blocked: is_blocked != 0,
        is_removed: is_removed != 0,
        is_moderator: is_moderator != 0,
        created_at: row.get("created_at"),
        topics_created: Vec::new(),
    }
}

fn category_from_row(row: &sqlx::sqlite::SqliteRow) -> Category {
    let is_archived: i32 = row.get("is_archived");
    Category {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        is_archived: is_archived != 0,
        created_at: row.get("created_at"),
        topics: Vec::new(),
    }
}
