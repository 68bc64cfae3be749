//! One-shot reminder scan over every user's events.
//!
//! Each invocation loads candidate occurrences, decides which are due for
//! their owner, checks the dedup log, delivers over push and chat, and
//! records what it did. Overlapping invocations are tolerated; the dedup
//! check is advisory, so two runs racing on the same occurrence may both send.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDateTime};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::config::ScannerConfig;
use crate::db::models::{CreateNotificationLog, LogStatus, PushSubscription, MAX_LEAD_MINUTES};
use crate::error::{AppError, AppResult};
use crate::i18n::DEFAULT_LANG;
use crate::services::notifications;
use crate::services::ports::*;
use crate::services::recurrence::{expand, Occurrence};

#[derive(Debug, Clone)]
pub struct ScanPolicy {
    /// Lead time for users without stored settings.
    pub default_lead_minutes: i64,
    pub late_window: Duration,
    pub dedup_window: Duration,
    /// How far ahead single events are loaded (never less than the maximum lead time).
    pub lookahead: Duration,
    pub delivery_timeout: StdDuration,
    pub concurrency: usize,
}

impl ScanPolicy {
    pub fn from_config(config: &ScannerConfig) -> Self {
        Self {
            default_lead_minutes: config.default_lead_minutes,
            late_window: Duration::minutes(config.late_window_minutes),
            dedup_window: Duration::hours(config.dedup_window_hours),
            lookahead: Duration::hours(config.lookahead_hours),
            delivery_timeout: StdDuration::from_secs(config.delivery_timeout_seconds),
            concurrency: config.concurrency.max(1),
        }
    }

    fn horizon(&self) -> Duration {
        self.lookahead
            .max(Duration::minutes(MAX_LEAD_MINUTES))
            .max(Duration::minutes(self.default_lead_minutes))
    }
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            default_lead_minutes: 15,
            late_window: Duration::minutes(30),
            dedup_window: Duration::hours(12),
            lookahead: Duration::hours(24),
            delivery_timeout: StdDuration::from_secs(10),
            concurrency: 4,
        }
    }
}

pub fn trigger_instant(start: NaiveDateTime, lead_minutes: i64) -> NaiveDateTime {
    start - Duration::minutes(lead_minutes)
}

/// Due from the trigger instant until the late window has passed.
pub fn is_due(
    start: NaiveDateTime,
    lead_minutes: i64,
    now: NaiveDateTime,
    late_window: Duration,
) -> bool {
    let trigger = trigger_instant(start, lead_minutes);
    now >= trigger && now - trigger < late_window
}

#[derive(Clone)]
pub struct ScanDeps {
    pub events: Arc<dyn EventStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub dedup: Arc<dyn DedupLog>,
    pub push: Arc<dyn PushTransport>,
    pub chat: Option<Arc<dyn ChatTransport>>,
}

/// Counters returned to the scheduler. `error` is set only when the scan aborted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub success: bool,
    pub candidates: usize,
    pub due: usize,
    pub suppressed: usize,
    pub push_sent: usize,
    pub push_failed: usize,
    pub push_removed: usize,
    pub chat_sent: usize,
    pub chat_failed: usize,
    pub logs_created: usize,
    pub skipped_errors: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanSummary {
    pub fn aborted(error: &AppError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    fn merge(&mut self, other: ScanSummary) {
        self.due += other.due;
        self.suppressed += other.suppressed;
        self.push_sent += other.push_sent;
        self.push_failed += other.push_failed;
        self.push_removed += other.push_removed;
        self.chat_sent += other.chat_sent;
        self.chat_failed += other.chat_failed;
        self.logs_created += other.logs_created;
        self.skipped_errors += other.skipped_errors;
    }
}

struct Recipient {
    enabled: bool,
    lead_minutes: i64,
    chat_id: Option<String>,
    lang: String,
}

pub struct NotificationScanner {
    deps: ScanDeps,
    policy: ScanPolicy,
    open_url: String,
}

impl NotificationScanner {
    pub fn new(deps: ScanDeps, policy: ScanPolicy) -> Self {
        Self {
            deps,
            policy,
            open_url: "/".to_string(),
        }
    }

    /// URL the push notification opens when clicked.
    pub fn with_open_url(mut self, url: impl Into<String>) -> Self {
        self.open_url = url.into();
        self
    }

    /// Run one scan at `now` (display-zone wall clock).
    pub async fn scan(&self, now: NaiveDateTime) -> ScanSummary {
        match self.try_scan(now).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!("Notification scan aborted: {}", e);
                ScanSummary::aborted(&e)
            }
        }
    }

    async fn try_scan(&self, now: NaiveDateTime) -> AppResult<ScanSummary> {
        let candidates = self.collect_candidates(now).await?;
        tracing::info!("Notification scan at {}: {} candidates", now, candidates.len());

        let mut summary = ScanSummary {
            success: true,
            candidates: candidates.len(),
            ..Default::default()
        };

        let tallies: Vec<ScanSummary> = stream::iter(candidates)
            .map(|occurrence| self.process(occurrence, now))
            .buffer_unordered(self.policy.concurrency.max(1))
            .collect()
            .await;

        for tally in tallies {
            summary.merge(tally);
        }

        tracing::info!(
            "Notification scan finished: due={} suppressed={} push_sent={} chat_sent={} logs={}",
            summary.due,
            summary.suppressed,
            summary.push_sent,
            summary.chat_sent,
            summary.logs_created
        );
        Ok(summary)
    }

    /// Occurrences that could be due for some lead time at `now`.
    ///
    /// Series are expanded for yesterday, today and tomorrow so reminders that
    /// cross midnight are found.
    pub async fn collect_candidates(&self, now: NaiveDateTime) -> AppResult<Vec<Occurrence>> {
        let horizon = self.policy.horizon();
        let earliest = now - self.policy.late_window;
        let latest = now + horizon;

        let (recurring, singles) = tokio::try_join!(
            self.deps.events.list_all_recurring(),
            self.deps.events.list_all_single_in_range(earliest, latest),
        )?;

        let today = now.date();
        let dates: Vec<_> = [today.pred_opt(), Some(today), today.succ_opt()]
            .into_iter()
            .flatten()
            .collect();

        let mut out: Vec<Occurrence> = recurring
            .iter()
            .flat_map(|t| dates.iter().filter_map(move |d| expand(t, *d)))
            .collect();
        out.extend(singles.iter().filter_map(|t| expand(t, t.start_time.date())));

        out.retain(|o| o.start_time > earliest && o.start_time <= latest);
        Ok(out)
    }

    async fn recipient(&self, user_id: &str) -> AppResult<Recipient> {
        let settings = self.deps.settings.get(user_id).await?;
        Ok(match settings {
            Some(s) => Recipient {
                enabled: s.notifications_enabled,
                lead_minutes: s.notification_minutes_before,
                lang: s.language().to_string(),
                chat_id: s.telegram_chat_id.filter(|c| !c.trim().is_empty()),
            },
            None => Recipient {
                enabled: true,
                lead_minutes: self.policy.default_lead_minutes,
                chat_id: None,
                lang: DEFAULT_LANG.to_string(),
            },
        })
    }

    async fn process(&self, occurrence: Occurrence, now: NaiveDateTime) -> ScanSummary {
        let mut tally = ScanSummary::default();
        let key = occurrence.id.to_string();
        let user_id = occurrence.user_id.clone();

        let recipient = match self.recipient(&user_id).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Skipping {}: failed to load settings for {}: {}", key, user_id, e);
                tally.skipped_errors += 1;
                return tally;
            }
        };

        if !recipient.enabled {
            tracing::debug!("Skipping {}: notifications disabled for {}", key, user_id);
            return tally;
        }

        if !is_due(
            occurrence.start_time,
            recipient.lead_minutes,
            now,
            self.policy.late_window,
        ) {
            return tally;
        }
        tally.due += 1;

        match self
            .deps
            .dedup
            .exists(&key, &user_id, now - self.policy.dedup_window)
            .await
        {
            Ok(true) => {
                tracing::debug!("Skipping {}: already notified {}", key, user_id);
                tally.suppressed += 1;
                return tally;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Skipping {}: dedup lookup failed: {}", key, e);
                tally.skipped_errors += 1;
                return tally;
            }
        }

        let mut attempts = 0usize;
        let mut delivered = 0usize;
        let mut errors: Vec<String> = Vec::new();

        match self.deps.subscriptions.list_for_user(&user_id).await {
            Ok(subscriptions) => {
                let payload = notifications::push_payload(
                    &occurrence,
                    recipient.lead_minutes,
                    &recipient.lang,
                    &self.open_url,
                );
                let outcomes =
                    join_all(subscriptions.iter().map(|sub| self.push_one(sub, &payload))).await;

                for (sub, outcome) in subscriptions.iter().zip(outcomes) {
                    attempts += 1;
                    match outcome {
                        PushOutcome::Delivered => {
                            tally.push_sent += 1;
                            delivered += 1;
                        }
                        PushOutcome::Gone => {
                            errors.push(format!("push {}: endpoint gone", sub.id));
                            match self.deps.subscriptions.remove(&sub.id).await {
                                Ok(()) => {
                                    tracing::info!("Removed expired push subscription {}", sub.id);
                                    tally.push_removed += 1;
                                }
                                Err(e) => tracing::warn!(
                                    "Failed to remove expired push subscription {}: {}",
                                    sub.id,
                                    e
                                ),
                            }
                        }
                        PushOutcome::Failed(reason) => {
                            tracing::warn!("Push to {} failed for {}: {}", sub.id, key, reason);
                            tally.push_failed += 1;
                            errors.push(format!("push {}: {}", sub.id, reason));
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Failed to load push subscriptions for {}: {}", user_id, e);
                errors.push(format!("push: {}", e));
            }
        }

        if let Some(chat_id) = recipient.chat_id.as_deref() {
            match &self.deps.chat {
                Some(chat) => {
                    attempts += 1;
                    let message =
                        notifications::chat_message(&occurrence, recipient.lead_minutes, &recipient.lang);
                    let sent =
                        tokio::time::timeout(self.policy.delivery_timeout, chat.send(chat_id, &message))
                            .await;
                    match sent {
                        Ok(Ok(())) => {
                            tally.chat_sent += 1;
                            delivered += 1;
                        }
                        Ok(Err(e)) => {
                            tracing::warn!("Chat reminder for {} failed: {}", key, e);
                            tally.chat_failed += 1;
                            errors.push(format!("chat: {}", e));
                        }
                        Err(_) => {
                            tracing::warn!("Chat reminder for {} timed out", key);
                            tally.chat_failed += 1;
                            errors.push("chat: timed out".to_string());
                        }
                    }
                }
                None => tracing::debug!(
                    "User {} has a chat recipient but no chat bot is configured",
                    user_id
                ),
            }
        }

        let status = if delivered > 0 {
            LogStatus::Sent
        } else if attempts == 0 {
            LogStatus::NoChannel
        } else {
            LogStatus::Failed
        };

        let entry = CreateNotificationLog {
            occurrence_key: key.clone(),
            event_id: occurrence.template_id.clone(),
            user_id,
            status,
            error_message: (!errors.is_empty()).then(|| errors.join("; ")),
            sent_at: now,
        };
        match self.deps.dedup.record(entry).await {
            Ok(()) => tally.logs_created += 1,
            Err(e) => tracing::warn!("Failed to record notification log for {}: {}", key, e),
        }

        tally
    }

    async fn push_one(&self, subscription: &PushSubscription, payload: &PushPayload) -> PushOutcome {
        match tokio::time::timeout(
            self.policy.delivery_timeout,
            self.deps.push.send(subscription, payload),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => PushOutcome::Failed("timed out".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::EventTemplate;
    use crate::services::fakes::*;
    use crate::services::recurrence::tests::{dt, template};

    struct Harness {
        events: Arc<MemoryEvents>,
        settings: Arc<MemorySettings>,
        subs: Arc<MemorySubscriptions>,
        log: Arc<MemoryDedupLog>,
        push: Arc<RecordingPush>,
        chat: Arc<RecordingChat>,
        policy: ScanPolicy,
    }

    impl Harness {
        fn new(templates: Vec<EventTemplate>) -> Self {
            Self {
                events: Arc::new(MemoryEvents::with(templates)),
                settings: Arc::new(MemorySettings::default()),
                subs: Arc::new(MemorySubscriptions::default()),
                log: Arc::new(MemoryDedupLog::default()),
                push: Arc::new(RecordingPush::default()),
                chat: Arc::new(RecordingChat::default()),
                policy: ScanPolicy::default(),
            }
        }

        fn scanner(&self) -> NotificationScanner {
            NotificationScanner::new(
                ScanDeps {
                    events: self.events.clone(),
                    settings: self.settings.clone(),
                    subscriptions: self.subs.clone(),
                    dedup: self.log.clone(),
                    push: self.push.clone(),
                    chat: Some(self.chat.clone()),
                },
                self.policy.clone(),
            )
        }

        async fn scan(&self, now: &str) -> ScanSummary {
            self.scanner().scan(dt(now)).await
        }
    }

    fn standup() -> EventTemplate {
        template(
            "standup",
            "2024-01-01 09:00",
            Some("2024-01-01 09:15"),
            Some(vec![1, 2, 3, 4, 5]),
        )
    }

    fn owned_by(mut t: EventTemplate, user: &str) -> EventTemplate {
        t.user_id = user.to_string();
        t
    }

    #[test]
    fn due_window_boundaries() {
        let now = dt("2024-01-09 08:00");
        let late = Duration::minutes(30);

        // Starts exactly one lead time away.
        assert!(is_due(now + Duration::minutes(15), 15, now, late));
        // One minute before the lead window opens.
        assert!(!is_due(now + Duration::minutes(16), 15, now, late));
        // Trigger 29 minutes ago: late but inside the grace period.
        assert!(is_due(now - Duration::minutes(14), 15, now, late));
        // Trigger exactly 30 and 31 minutes ago: stale.
        assert!(!is_due(now - Duration::minutes(15), 15, now, late));
        assert!(!is_due(now - Duration::minutes(16), 15, now, late));
    }

    #[test]
    fn zero_lead_fires_at_start() {
        let start = dt("2024-01-09 09:00");
        assert_eq!(trigger_instant(start, 0), start);
        assert!(is_due(start, 0, start, Duration::minutes(30)));
    }

    #[tokio::test]
    async fn standup_is_sent_once() {
        let h = Harness::new(vec![standup()]);
        h.settings.put("u1", true, 10, None);
        h.subs.add("u1", "https://push/a");
        h.subs.add("u1", "https://push/b");

        // Tuesday 08:50, ten minutes before the 09:00 standup.
        let first = h.scan("2024-01-09 08:50").await;
        assert!(first.success);
        assert_eq!(first.candidates, 1);
        assert_eq!(first.due, 1);
        assert_eq!(first.push_sent, 2);
        assert_eq!(first.logs_created, 1);

        let entries = h.log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].occurrence_key, "v:2024-01-09:standup");
        assert_eq!(entries[0].event_id, "standup");
        assert_eq!(entries[0].status, LogStatus::Sent);

        let second = h.scan("2024-01-09 08:51").await;
        assert_eq!(second.due, 1);
        assert_eq!(second.suppressed, 1);
        assert_eq!(second.push_sent, 0);
        assert_eq!(h.push.sent().len(), 2);
        assert_eq!(h.log.entries().len(), 1);
    }

    #[tokio::test]
    async fn next_day_occurrence_is_eligible_again() {
        let h = Harness::new(vec![standup()]);
        h.settings.put("u1", true, 10, None);
        h.subs.add("u1", "https://push/a");

        h.scan("2024-01-09 08:50").await;
        let wednesday = h.scan("2024-01-10 08:50").await;

        assert_eq!(wednesday.push_sent, 1);
        assert_eq!(wednesday.suppressed, 0);
        assert_eq!(h.push.sent().len(), 2);
    }

    #[tokio::test]
    async fn dedup_entry_only_suppresses_inside_window() {
        let h = Harness::new(vec![standup()]);
        h.settings.put("u1", true, 10, None);
        h.subs.add("u1", "https://push/a");

        let old = CreateNotificationLog {
            occurrence_key: "v:2024-01-09:standup".to_string(),
            event_id: "standup".to_string(),
            user_id: "u1".to_string(),
            status: LogStatus::Sent,
            error_message: None,
            sent_at: dt("2024-01-08 19:00"),
        };
        h.log.record(old.clone()).await.unwrap();

        // 13h50m after the stale entry.
        let summary = h.scan("2024-01-09 08:50").await;
        assert_eq!(summary.push_sent, 1);

        let h = Harness::new(vec![standup()]);
        h.settings.put("u1", true, 10, None);
        h.subs.add("u1", "https://push/a");
        h.log
            .record(CreateNotificationLog {
                sent_at: dt("2024-01-08 21:00"),
                ..old
            })
            .await
            .unwrap();

        // 11h50m after the entry.
        let summary = h.scan("2024-01-09 08:50").await;
        assert_eq!(summary.suppressed, 1);
        assert!(h.push.sent().is_empty());
    }

    #[tokio::test]
    async fn disabled_user_gets_nothing_and_no_log() {
        let h = Harness::new(vec![standup()]);
        h.settings.put("u1", false, 10, Some("42"));
        h.subs.add("u1", "https://push/a");

        let summary = h.scan("2024-01-09 08:50").await;
        assert_eq!(summary.due, 0);
        assert!(h.push.sent().is_empty());
        assert!(h.chat.sent().is_empty());
        assert!(h.log.entries().is_empty());
    }

    #[tokio::test]
    async fn missing_settings_use_default_lead() {
        let h = Harness::new(vec![template("call", "2024-01-09 15:00", None, None)]);
        h.subs.add("u1", "https://push/a");

        assert_eq!(h.scan("2024-01-09 14:40").await.due, 0);
        let summary = h.scan("2024-01-09 14:45").await;
        assert_eq!(summary.push_sent, 1);
        let (_, payload) = &h.push.sent()[0];
        assert_eq!(payload.body, "Começa em 15 min: 15:00");
        assert_eq!(payload.title, "Agenda: call");
    }

    #[tokio::test]
    async fn gone_endpoint_is_removed_and_others_still_delivered() {
        let h = Harness::new(vec![standup()]);
        h.settings.put("u1", true, 10, None);
        h.subs.add("u1", "https://push/a");
        h.subs.add("u1", "https://push/b");
        h.push.script("https://push/b", PushOutcome::Gone);

        let summary = h.scan("2024-01-09 08:50").await;
        assert_eq!(summary.push_sent, 1);
        assert_eq!(summary.push_removed, 1);
        assert_eq!(h.subs.endpoints(), vec!["https://push/a".to_string()]);
        assert_eq!(h.log.entries()[0].status, LogStatus::Sent);
    }

    #[tokio::test]
    async fn transient_failures_are_logged_not_fatal() {
        let h = Harness::new(vec![standup()]);
        h.settings.put("u1", true, 10, Some("42"));
        h.subs.add("u1", "https://push/a");
        h.push
            .script("https://push/a", PushOutcome::Failed("HTTP 500".to_string()));
        h.chat.fail();

        let summary = h.scan("2024-01-09 08:50").await;
        assert!(summary.success);
        assert_eq!(summary.push_failed, 1);
        assert_eq!(summary.chat_failed, 1);
        assert_eq!(summary.logs_created, 1);

        let entry = &h.log.entries()[0];
        assert_eq!(entry.status, LogStatus::Failed);
        let message = entry.error_message.as_deref().unwrap();
        assert!(message.contains("HTTP 500"));
        assert!(message.contains("chat"));
    }

    #[tokio::test]
    async fn chat_delivery_is_independent_of_push() {
        let h = Harness::new(vec![standup()]);
        h.settings.put("u1", true, 10, Some("42"));

        let summary = h.scan("2024-01-09 08:50").await;
        assert_eq!(summary.chat_sent, 1);
        assert_eq!(summary.push_sent, 0);

        let sent = h.chat.sent();
        assert_eq!(sent[0].0, "42");
        assert!(sent[0].1.contains("🔁 standup"));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out_without_blocking_others() {
        let mut h = Harness::new(vec![standup()]);
        h.policy.delivery_timeout = StdDuration::from_millis(50);
        h.settings.put("u1", true, 10, None);
        h.subs.add("u1", "https://push/slow");
        h.subs.add("u1", "https://push/fast");
        h.push.hang_on("https://push/slow");

        let summary = h.scan("2024-01-09 08:50").await;
        assert_eq!(summary.push_sent, 1);
        assert_eq!(summary.push_failed, 1);
        assert_eq!(summary.logs_created, 1);
    }

    #[tokio::test]
    async fn one_users_settings_failure_does_not_stop_others() {
        let h = Harness::new(vec![
            standup(),
            owned_by(template("review", "2024-01-09 09:00", None, None), "u2"),
        ]);
        h.settings.put("u1", true, 10, None);
        h.settings.fail_for("u2");
        h.subs.add("u1", "https://push/a");
        h.subs.add("u2", "https://push/b");

        let summary = h.scan("2024-01-09 08:50").await;
        assert!(summary.success);
        assert_eq!(summary.skipped_errors, 1);
        assert_eq!(summary.push_sent, 1);
        assert_eq!(h.push.sent()[0].0, "https://push/a");
    }

    #[tokio::test]
    async fn listing_failure_aborts_scan() {
        let h = Harness::new(vec![standup()]);
        h.events.fail_listing();

        let summary = h.scan("2024-01-09 08:50").await;
        assert!(!summary.success);
        assert!(summary.error.is_some());
        assert_eq!(summary.candidates, 0);
    }

    #[tokio::test]
    async fn log_write_failure_is_swallowed() {
        let h = Harness::new(vec![standup()]);
        h.settings.put("u1", true, 10, None);
        h.subs.add("u1", "https://push/a");
        h.log.fail_writes();

        let summary = h.scan("2024-01-09 08:50").await;
        assert!(summary.success);
        assert_eq!(summary.push_sent, 1);
        assert_eq!(summary.logs_created, 0);
    }

    #[tokio::test]
    async fn due_without_channels_is_still_logged() {
        let h = Harness::new(vec![standup()]);
        h.settings.put("u1", true, 10, None);

        let summary = h.scan("2024-01-09 08:50").await;
        assert_eq!(summary.due, 1);
        assert_eq!(summary.logs_created, 1);
        assert_eq!(h.log.entries()[0].status, LogStatus::NoChannel);
    }

    #[tokio::test]
    async fn reminder_before_midnight_finds_tomorrows_occurrence() {
        let h = Harness::new(vec![template(
            "early",
            "2024-01-03 00:10",
            None,
            Some(vec![3]),
        )]);
        h.settings.put("u1", true, 30, None);
        h.subs.add("u1", "https://push/a");

        // Tuesday 23:45 for Wednesday 00:10.
        let summary = h.scan("2024-01-09 23:45").await;
        assert_eq!(summary.push_sent, 1);
        assert_eq!(h.log.entries()[0].occurrence_key, "v:2024-01-10:early");
    }

    #[tokio::test]
    async fn ended_or_future_series_are_not_due() {
        let mut ended = standup();
        ended.recurrence_end_date = Some(dt("2024-01-08 00:00").date());
        let future = template("later", "2024-01-16 09:00", None, Some(vec![2]));
        let h = Harness::new(vec![ended, future]);
        h.settings.put("u1", true, 10, None);
        h.subs.add("u1", "https://push/a");

        let summary = h.scan("2024-01-09 08:50").await;
        assert_eq!(summary.candidates, 0);
        assert!(h.push.sent().is_empty());
    }
}
