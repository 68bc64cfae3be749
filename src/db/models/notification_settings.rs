use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const DEFAULT_LEAD_MINUTES: i64 = 15;
pub const MAX_LEAD_MINUTES: i64 = 1440;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserNotificationSettings {
    pub id: String,
    pub user_id: String,
    pub notifications_enabled: bool,
    pub notification_minutes_before: i64,
    /// Chat-bot recipient (Telegram chat id), kept as text.
    pub telegram_chat_id: Option<String>,
    pub lang: Option<String>,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl UserNotificationSettings {
    /// Settings in effect for a user that never stored any.
    pub fn defaults_for(user_id: &str) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id: String::new(),
            user_id: user_id.to_string(),
            notifications_enabled: true,
            notification_minutes_before: DEFAULT_LEAD_MINUTES,
            telegram_chat_id: None,
            lang: Some(crate::i18n::DEFAULT_LANG.to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn language(&self) -> &str {
        self.lang.as_deref().unwrap_or(crate::i18n::DEFAULT_LANG)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateNotificationSettings {
    pub notifications_enabled: Option<bool>,
    pub notification_minutes_before: Option<i64>,
    pub lang: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetTelegramChat {
    pub chat_id: i64,
}
