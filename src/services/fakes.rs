//! In-memory store and transport doubles for service tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::db::models::*;
use crate::error::{AppError, AppResult};
use crate::services::ports::*;

fn storage_error() -> AppError {
    AppError::Database(sqlx::Error::PoolTimedOut)
}

#[derive(Default)]
pub struct MemoryEvents {
    templates: Mutex<Vec<EventTemplate>>,
    fail_listing: AtomicBool,
}

impl MemoryEvents {
    pub fn with(templates: Vec<EventTemplate>) -> Self {
        Self {
            templates: Mutex::new(templates),
            fail_listing: AtomicBool::new(false),
        }
    }

    pub fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> AppResult<()> {
        if self.fail_listing.load(Ordering::SeqCst) {
            Err(storage_error())
        } else {
            Ok(())
        }
    }

    fn filtered(&self, keep: impl Fn(&EventTemplate) -> bool) -> AppResult<Vec<EventTemplate>> {
        self.check()?;
        Ok(self
            .templates
            .lock()
            .unwrap()
            .iter()
            .filter(|t| keep(t))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EventStore for MemoryEvents {
    async fn list_single_in_range(
        &self,
        user_id: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> AppResult<Vec<EventTemplate>> {
        self.filtered(|t| {
            t.user_id == user_id && !t.is_recurring && t.start_time >= from && t.start_time < to
        })
    }

    async fn list_recurring_by_user(&self, user_id: &str) -> AppResult<Vec<EventTemplate>> {
        self.filtered(|t| t.user_id == user_id && t.is_recurring)
    }

    async fn list_all_recurring(&self) -> AppResult<Vec<EventTemplate>> {
        self.filtered(|t| t.is_recurring)
    }

    async fn list_all_single_in_range(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> AppResult<Vec<EventTemplate>> {
        self.filtered(|t| !t.is_recurring && t.start_time >= from && t.start_time <= to)
    }

    async fn get(&self, id: &str) -> AppResult<Option<EventTemplate>> {
        Ok(self.filtered(|t| t.id == id)?.into_iter().next())
    }

    async fn delete(&self, user_id: &str, id: &str) -> AppResult<bool> {
        let mut templates = self.templates.lock().unwrap();
        let before = templates.len();
        templates.retain(|t| !(t.id == id && t.user_id == user_id));
        Ok(templates.len() != before)
    }
}

#[derive(Default)]
pub struct MemorySettings {
    settings: Mutex<HashMap<String, UserNotificationSettings>>,
    failing_users: Mutex<HashSet<String>>,
}

impl MemorySettings {
    pub fn put(&self, user_id: &str, enabled: bool, lead: i64, chat: Option<&str>) {
        let mut s = UserNotificationSettings::defaults_for(user_id);
        s.notifications_enabled = enabled;
        s.notification_minutes_before = lead;
        s.telegram_chat_id = chat.map(str::to_string);
        self.settings.lock().unwrap().insert(user_id.to_string(), s);
    }

    pub fn fail_for(&self, user_id: &str) {
        self.failing_users.lock().unwrap().insert(user_id.to_string());
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get(&self, user_id: &str) -> AppResult<Option<UserNotificationSettings>> {
        if self.failing_users.lock().unwrap().contains(user_id) {
            return Err(storage_error());
        }
        Ok(self.settings.lock().unwrap().get(user_id).cloned())
    }
}

#[derive(Default)]
pub struct MemorySubscriptions {
    subs: Mutex<Vec<PushSubscription>>,
}

impl MemorySubscriptions {
    pub fn add(&self, user_id: &str, endpoint: &str) {
        let now = chrono::Utc::now().naive_utc();
        self.subs.lock().unwrap().push(PushSubscription {
            id: format!("sub-{endpoint}"),
            user_id: user_id.to_string(),
            endpoint: endpoint.to_string(),
            p256dh: "key".to_string(),
            auth: "auth".to_string(),
            created_at: now,
            updated_at: now,
        });
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.subs
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.endpoint.clone())
            .collect()
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptions {
    async fn list_for_user(&self, user_id: &str) -> AppResult<Vec<PushSubscription>> {
        Ok(self
            .subs
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn remove(&self, subscription_id: &str) -> AppResult<()> {
        self.subs.lock().unwrap().retain(|s| s.id != subscription_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDedupLog {
    entries: Mutex<Vec<CreateNotificationLog>>,
    fail_writes: AtomicBool,
}

impl MemoryDedupLog {
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn entries(&self) -> Vec<CreateNotificationLog> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl DedupLog for MemoryDedupLog {
    async fn exists(
        &self,
        occurrence_key: &str,
        user_id: &str,
        since: NaiveDateTime,
    ) -> AppResult<bool> {
        Ok(self.entries.lock().unwrap().iter().any(|e| {
            e.occurrence_key == occurrence_key && e.user_id == user_id && e.sent_at >= since
        }))
    }

    async fn record(&self, entry: CreateNotificationLog) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(storage_error());
        }
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

/// Records every push; endpoints can be scripted to fail, vanish or hang.
#[derive(Default)]
pub struct RecordingPush {
    sent: Mutex<Vec<(String, PushPayload)>>,
    outcomes: Mutex<HashMap<String, PushOutcome>>,
    hang: Mutex<HashSet<String>>,
}

impl RecordingPush {
    pub fn script(&self, endpoint: &str, outcome: PushOutcome) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), outcome);
    }

    pub fn hang_on(&self, endpoint: &str) {
        self.hang.lock().unwrap().insert(endpoint.to_string());
    }

    pub fn sent(&self) -> Vec<(String, PushPayload)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushTransport for RecordingPush {
    async fn send(&self, subscription: &PushSubscription, payload: &PushPayload) -> PushOutcome {
        let hangs = self.hang.lock().unwrap().contains(&subscription.endpoint);
        if hangs {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.sent
            .lock()
            .unwrap()
            .push((subscription.endpoint.clone(), payload.clone()));
        self.outcomes
            .lock()
            .unwrap()
            .get(&subscription.endpoint)
            .cloned()
            .unwrap_or(PushOutcome::Delivered)
    }
}

#[derive(Default)]
pub struct RecordingChat {
    sent: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl RecordingChat {
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingChat {
    async fn send(&self, recipient_id: &str, message: &str) -> AppResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Telegram("chat not found".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient_id.to_string(), message.to_string()));
        Ok(())
    }
}
