//! Seams between the agenda/scanner logic and storage or delivery backends.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::db::models::{
    CreateNotificationLog, EventTemplate, PushSubscription, UserNotificationSettings,
};
use crate::error::AppResult;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Non-recurring templates of one user starting in `[from, to)`.
    async fn list_single_in_range(
        &self,
        user_id: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> AppResult<Vec<EventTemplate>>;
    async fn list_recurring_by_user(&self, user_id: &str) -> AppResult<Vec<EventTemplate>>;
    async fn list_all_recurring(&self) -> AppResult<Vec<EventTemplate>>;
    /// Non-recurring templates of every user starting in `[from, to]`.
    async fn list_all_single_in_range(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> AppResult<Vec<EventTemplate>>;
    async fn get(&self, id: &str) -> AppResult<Option<EventTemplate>>;
    async fn delete(&self, user_id: &str, id: &str) -> AppResult<bool>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// `None` when the user never stored settings.
    async fn get(&self, user_id: &str) -> AppResult<Option<UserNotificationSettings>>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<PushSubscription>>;
    async fn remove(&self, subscription_id: &str) -> AppResult<()>;
}

#[async_trait]
pub trait DedupLog: Send + Sync {
    async fn exists(
        &self,
        occurrence_key: &str,
        user_id: &str,
        since: NaiveDateTime,
    ) -> AppResult<bool>;
    async fn record(&self, entry: CreateNotificationLog) -> AppResult<()>;
}

/// Body delivered to the browser's service worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered,
    /// The endpoint is permanently invalid (404/410); the subscription should be dropped.
    Gone,
    Failed(String),
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(&self, subscription: &PushSubscription, payload: &PushPayload) -> PushOutcome;
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, recipient_id: &str, message: &str) -> AppResult<()>;
}
