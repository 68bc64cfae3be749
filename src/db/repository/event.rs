use chrono::{NaiveDateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

const EVENT_COLUMNS: &str = "id, user_id, title, description, start_time, end_time, \
     is_recurring, recurrence_days, recurrence_end_date, created_at, updated_at";

fn encode_days(days: &Option<Vec<u8>>) -> AppResult<Option<String>> {
    days.as_ref()
        .map(|d| serde_json::to_string(d))
        .transpose()
        .map_err(|e| AppError::Internal(e.into()))
}

// ============================================================================
// Event Template Repository
// ============================================================================

pub struct EventRepository;

impl EventRepository {
    pub async fn create(
        pool: &SqlitePool,
        user_id: &str,
        fields: EventFields,
    ) -> AppResult<EventTemplate> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();
        let days = encode_days(&fields.recurrence_days)?;

        let row = sqlx::query_as::<_, RowEventTemplate>(&format!(
            r#"
            INSERT INTO events (
                id, user_id, title, description, start_time, end_time,
                is_recurring, recurrence_days, recurrence_end_date, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(&id)
        .bind(user_id)
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(fields.start_time)
        .bind(fields.end_time)
        .bind(fields.is_recurring)
        .bind(days)
        .bind(fields.recurrence_end_date)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.into())
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<EventTemplate>> {
        let row = sqlx::query_as::<_, RowEventTemplate>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.map(Into::into))
    }

    pub async fn update(
        pool: &SqlitePool,
        user_id: &str,
        id: &str,
        fields: EventFields,
    ) -> AppResult<EventTemplate> {
        let now = Utc::now().naive_utc();
        let days = encode_days(&fields.recurrence_days)?;

        let row = sqlx::query_as::<_, RowEventTemplate>(&format!(
            r#"
            UPDATE events
            SET title = ?,
                description = ?,
                start_time = ?,
                end_time = ?,
                is_recurring = ?,
                recurrence_days = ?,
                recurrence_end_date = ?,
                updated_at = ?
            WHERE id = ? AND user_id = ?
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(fields.start_time)
        .bind(fields.end_time)
        .bind(fields.is_recurring)
        .bind(days)
        .bind(fields.recurrence_end_date)
        .bind(now)
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

        Ok(row.into())
    }

    /// Deletes the template (and with it the whole series). Returns whether a row was removed.
    pub async fn delete(pool: &SqlitePool, user_id: &str, id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    /// Non-recurring templates of one user starting in `[from, to)`.
    pub async fn list_single_in_range(
        pool: &SqlitePool,
        user_id: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> AppResult<Vec<EventTemplate>> {
        let rows = sqlx::query_as::<_, RowEventTemplate>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM events
            WHERE user_id = ? AND is_recurring = 0
            AND start_time >= ? AND start_time < ?
            ORDER BY start_time ASC
            "#
        ))
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn list_recurring_by_user(
        pool: &SqlitePool,
        user_id: &str,
    ) -> AppResult<Vec<EventTemplate>> {
        let rows = sqlx::query_as::<_, RowEventTemplate>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE user_id = ? AND is_recurring = 1 ORDER BY start_time ASC"
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Every recurring template across all users (scanner input).
    pub async fn list_all_recurring(pool: &SqlitePool) -> AppResult<Vec<EventTemplate>> {
        let rows = sqlx::query_as::<_, RowEventTemplate>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE is_recurring = 1"
        ))
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Non-recurring templates across all users starting in `[from, to]` (scanner input).
    pub async fn list_all_single_in_range(
        pool: &SqlitePool,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> AppResult<Vec<EventTemplate>> {
        let rows = sqlx::query_as::<_, RowEventTemplate>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM events
            WHERE is_recurring = 0 AND start_time >= ? AND start_time <= ?
            "#
        ))
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
