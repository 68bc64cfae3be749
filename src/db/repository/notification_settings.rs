use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

const SETTINGS_COLUMNS: &str = "id, user_id, notifications_enabled, notification_minutes_before, \
     telegram_chat_id, lang, created_at, updated_at";

// ============================================================================
// Notification Settings Repository
// ============================================================================

pub struct NotificationSettingsRepository;

impl NotificationSettingsRepository {
    pub async fn create(pool: &SqlitePool, user_id: &str) -> AppResult<UserNotificationSettings> {
        let id = Uuid::new_v4().to_string();
        let defaults = UserNotificationSettings::defaults_for(user_id);
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, UserNotificationSettings>(&format!(
            r#"
            INSERT INTO user_settings (
                id, user_id, notifications_enabled, notification_minutes_before,
                telegram_chat_id, lang, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {SETTINGS_COLUMNS}
            "#
        ))
        .bind(&id)
        .bind(user_id)
        .bind(defaults.notifications_enabled)
        .bind(defaults.notification_minutes_before)
        .bind(defaults.telegram_chat_id)
        .bind(defaults.lang)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_user_id(
        pool: &SqlitePool,
        user_id: &str,
    ) -> AppResult<Option<UserNotificationSettings>> {
        sqlx::query_as::<_, UserNotificationSettings>(&format!(
            "SELECT {SETTINGS_COLUMNS} FROM user_settings WHERE user_id = ?"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn get_or_create(
        pool: &SqlitePool,
        user_id: &str,
    ) -> AppResult<UserNotificationSettings> {
        match Self::find_by_user_id(pool, user_id).await? {
            Some(settings) => Ok(settings),
            None => Self::create(pool, user_id).await,
        }
    }

    pub async fn update(
        pool: &SqlitePool,
        user_id: &str,
        update: UpdateNotificationSettings,
    ) -> AppResult<UserNotificationSettings> {
        let current = Self::get_or_create(pool, user_id).await?;

        let notifications_enabled = update
            .notifications_enabled
            .unwrap_or(current.notifications_enabled);
        let notification_minutes_before = update
            .notification_minutes_before
            .unwrap_or(current.notification_minutes_before);
        let lang = update.lang.or(current.lang);

        let now = Utc::now().naive_utc();
        sqlx::query_as::<_, UserNotificationSettings>(&format!(
            r#"
            UPDATE user_settings
            SET notifications_enabled = ?,
                notification_minutes_before = ?,
                lang = ?,
                updated_at = ?
            WHERE user_id = ?
            RETURNING {SETTINGS_COLUMNS}
            "#
        ))
        .bind(notifications_enabled)
        .bind(notification_minutes_before)
        .bind(lang)
        .bind(now)
        .bind(user_id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Set or clear (`None`) the chat-bot recipient.
    pub async fn set_telegram_chat(
        pool: &SqlitePool,
        user_id: &str,
        chat_id: Option<String>,
    ) -> AppResult<UserNotificationSettings> {
        Self::get_or_create(pool, user_id).await?;

        let now = Utc::now().naive_utc();
        sqlx::query_as::<_, UserNotificationSettings>(&format!(
            r#"
            UPDATE user_settings
            SET telegram_chat_id = ?, updated_at = ?
            WHERE user_id = ?
            RETURNING {SETTINGS_COLUMNS}
            "#
        ))
        .bind(chat_id)
        .bind(now)
        .bind(user_id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }
}
