use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    /// At least one channel delivered.
    Sent,
    /// Attempted, but every channel failed.
    Failed,
    /// Due, but the user had no delivery channel configured.
    NoChannel,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Sent => "sent",
            LogStatus::Failed => "failed",
            LogStatus::NoChannel => "no_channel",
        }
    }
}

/// Dedup record for one (occurrence, user) notification attempt.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationLog {
    pub id: String,
    pub occurrence_key: String,
    pub event_id: String,
    pub user_id: String,
    pub status: String,
    pub error_message: Option<String>,
    pub sent_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct CreateNotificationLog {
    pub occurrence_key: String,
    pub event_id: String,
    pub user_id: String,
    pub status: LogStatus,
    pub error_message: Option<String>,
    pub sent_at: NaiveDateTime,
}
