use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Notification Log Repository
// ============================================================================

pub struct NotificationLogRepository;

impl NotificationLogRepository {
    pub async fn create(
        pool: &SqlitePool,
        log: CreateNotificationLog,
    ) -> AppResult<NotificationLog> {
        let id = Uuid::new_v4().to_string();

        sqlx::query_as::<_, NotificationLog>(
            r#"
            INSERT INTO notification_logs (
                id, occurrence_key, event_id, user_id, status, error_message, sent_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id, occurrence_key, event_id, user_id, status, error_message, sent_at
            "#,
        )
        .bind(&id)
        .bind(&log.occurrence_key)
        .bind(&log.event_id)
        .bind(&log.user_id)
        .bind(log.status.as_str())
        .bind(&log.error_message)
        .bind(log.sent_at)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Whether a notification for this occurrence and user was logged at or after `since`.
    pub async fn exists_since(
        pool: &SqlitePool,
        occurrence_key: &str,
        user_id: &str,
        since: NaiveDateTime,
    ) -> AppResult<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT 1 FROM notification_logs
            WHERE occurrence_key = ? AND user_id = ? AND sent_at >= ?
            LIMIT 1
            "#,
        )
        .bind(occurrence_key)
        .bind(user_id)
        .bind(since)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(found.is_some())
    }

    /// Newest first, paginated.
    pub async fn find_by_user_id(
        pool: &SqlitePool,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<NotificationLog>> {
        sqlx::query_as::<_, NotificationLog>(
            r#"
            SELECT id, occurrence_key, event_id, user_id, status, error_message, sent_at
            FROM notification_logs
            WHERE user_id = ?
            ORDER BY sent_at DESC
            LIMIT ?
            OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn count_by_user_id(pool: &SqlitePool, user_id: &str) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notification_logs WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Delete rows logged before `cutoff`. Returns the number removed.
    pub async fn delete_older_than(pool: &SqlitePool, cutoff: NaiveDateTime) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM notification_logs WHERE sent_at < ?")
            .bind(cutoff)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }
}
