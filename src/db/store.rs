use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::db::repository::*;
use crate::error::AppResult;
use crate::services::ports::{DedupLog, EventStore, SettingsStore, SubscriptionStore};

/// SQLite-backed implementation of the store traits.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn list_single_in_range(
        &self,
        user_id: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> AppResult<Vec<EventTemplate>> {
        EventRepository::list_single_in_range(&self.pool, user_id, from, to).await
    }

    async fn list_recurring_by_user(&self, user_id: &str) -> AppResult<Vec<EventTemplate>> {
        EventRepository::list_recurring_by_user(&self.pool, user_id).await
    }

    async fn list_all_recurring(&self) -> AppResult<Vec<EventTemplate>> {
        EventRepository::list_all_recurring(&self.pool).await
    }

    async fn list_all_single_in_range(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> AppResult<Vec<EventTemplate>> {
        EventRepository::list_all_single_in_range(&self.pool, from, to).await
    }

    async fn get(&self, id: &str) -> AppResult<Option<EventTemplate>> {
        EventRepository::find_by_id(&self.pool, id).await
    }

    async fn delete(&self, user_id: &str, id: &str) -> AppResult<bool> {
        EventRepository::delete(&self.pool, user_id, id).await
    }
}

#[async_trait]
impl SettingsStore for SqliteStore {
    async fn get(&self, user_id: &str) -> AppResult<Option<UserNotificationSettings>> {
        NotificationSettingsRepository::find_by_user_id(&self.pool, user_id).await
    }
}

#[async_trait]
impl SubscriptionStore for SqliteStore {
    async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<PushSubscription>> {
        PushSubscriptionRepository::find_by_user_id(&self.pool, user_id).await
    }

    async fn remove(&self, subscription_id: &str) -> AppResult<()> {
        PushSubscriptionRepository::delete(&self.pool, subscription_id).await
    }
}

#[async_trait]
impl DedupLog for SqliteStore {
    async fn exists(
        &self,
        occurrence_key: &str,
        user_id: &str,
        since: NaiveDateTime,
    ) -> AppResult<bool> {
        NotificationLogRepository::exists_since(&self.pool, occurrence_key, user_id, since).await
    }

    async fn record(&self, entry: CreateNotificationLog) -> AppResult<()> {
        NotificationLogRepository::create(&self.pool, entry).await?;
        Ok(())
    }
}
