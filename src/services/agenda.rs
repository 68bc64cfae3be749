//! Per-user agenda views: one day, a date range, or what comes next.

use std::cmp::Ordering;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::i18n;
use crate::services::lanes::{self, LaneLayout};
use crate::services::ports::EventStore;
use crate::services::recurrence::{expand, Occurrence};

pub const MAX_RANGE_DAYS: i64 = 62;
pub const MAX_UPCOMING_DAYS: i64 = 31;

/// Start ascending, longer first on equal starts, then by id so the order is total.
pub fn compare_occurrences(a: &Occurrence, b: &Occurrence) -> Ordering {
    a.start_time
        .cmp(&b.start_time)
        .then_with(|| b.duration().cmp(&a.duration()))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_occurrences(occurrences: &mut [Occurrence]) {
    occurrences.sort_by(compare_occurrences);
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::default())
}

/// Occurrences of `user_id` on every date in `from..=to`, sorted.
///
/// Storage errors are returned as is; an empty list always means no events.
pub async fn occurrences_for_range(
    store: &dyn EventStore,
    user_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> AppResult<Vec<Occurrence>> {
    if to < from {
        return Ok(Vec::new());
    }

    let window_start = midnight(from);
    let window_end = midnight(to) + Duration::days(1);

    let (singles, recurring) = tokio::try_join!(
        store.list_single_in_range(user_id, window_start, window_end),
        store.list_recurring_by_user(user_id),
    )?;

    let mut out: Vec<Occurrence> = singles
        .iter()
        .filter_map(|t| expand(t, t.start_time.date()))
        .collect();

    for date in from.iter_days().take_while(|d| *d <= to) {
        out.extend(recurring.iter().filter_map(|t| expand(t, date)));
    }

    sort_occurrences(&mut out);
    Ok(out)
}

pub async fn occurrences_for_day(
    store: &dyn EventStore,
    user_id: &str,
    date: NaiveDate,
) -> AppResult<Vec<Occurrence>> {
    occurrences_for_range(store, user_id, date, date).await
}

#[derive(Debug, Clone, Serialize)]
pub struct PlacedOccurrence {
    #[serde(flatten)]
    pub occurrence: Occurrence,
    pub lane: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayView {
    pub date: NaiveDate,
    pub occurrences: Vec<PlacedOccurrence>,
    pub lane_count: usize,
}

/// Day occurrences together with their timeline lanes.
pub async fn day_view(store: &dyn EventStore, user_id: &str, date: NaiveDate) -> AppResult<DayView> {
    let occurrences = occurrences_for_day(store, user_id, date).await?;
    let layout: LaneLayout = lanes::pack(&occurrences);

    Ok(DayView {
        date,
        occurrences: occurrences
            .into_iter()
            .map(|occurrence| PlacedOccurrence {
                // every packed occurrence has an entry
                lane: layout.lane_of(&occurrence.id).unwrap_or_default(),
                occurrence,
            })
            .collect(),
        lane_count: layout.lane_count,
    })
}

/// Occurrences starting in `[now, now + days]`.
pub async fn upcoming(
    store: &dyn EventStore,
    user_id: &str,
    now: NaiveDateTime,
    days: i64,
) -> AppResult<Vec<Occurrence>> {
    let horizon = now + Duration::days(days);
    let mut out = occurrences_for_range(store, user_id, now.date(), horizon.date()).await?;
    out.retain(|o| o.start_time >= now && o.start_time <= horizon);
    Ok(out)
}

pub fn validate_range(from: NaiveDate, to: NaiveDate, lang: Option<&str>) -> AppResult<()> {
    if to < from {
        return Err(AppError::Validation(i18n::tr(lang, "validation.range_order", None)));
    }
    if (to - from).num_days() + 1 > MAX_RANGE_DAYS {
        return Err(AppError::Validation(i18n::tr(
            lang,
            "validation.range_too_long",
            Some(&[("max", &MAX_RANGE_DAYS.to_string())]),
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fakes::MemoryEvents;
    use crate::services::recurrence::tests::{date, dt, template};
    use crate::services::recurrence::OccurrenceId;

    fn store() -> MemoryEvents {
        MemoryEvents::with(vec![
            template("standup", "2024-01-01 09:00", Some("2024-01-01 09:15"), Some(vec![1, 2, 3, 4, 5])),
            template("gym", "2024-01-03 07:00", Some("2024-01-03 08:00"), Some(vec![1, 3])),
            template("dentist", "2024-01-08 09:00", Some("2024-01-08 11:00"), None),
            template("lunch", "2024-01-08 12:00", None, None),
            template("tomorrow", "2024-01-09 08:00", None, None),
        ])
    }

    #[tokio::test]
    async fn merges_singles_and_series_sorted() {
        let store = store();
        let day = occurrences_for_day(&store, "u1", date("2024-01-08")).await.unwrap();

        let ids: Vec<String> = day.iter().map(|o| o.id.to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "v:2024-01-08:gym".to_string(),
                // Same start: the longer dentist appointment first.
                "dentist".to_string(),
                "v:2024-01-08:standup".to_string(),
                "lunch".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn repeated_calls_are_identical() {
        let store = store();
        let a = occurrences_for_day(&store, "u1", date("2024-01-08")).await.unwrap();
        let b = occurrences_for_day(&store, "u1", date("2024-01-08")).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn other_users_events_are_not_visible() {
        let store = store();
        let day = occurrences_for_day(&store, "u2", date("2024-01-08")).await.unwrap();
        assert!(day.is_empty());
    }

    #[tokio::test]
    async fn storage_failure_is_not_an_empty_day() {
        let store = store();
        store.fail_listing();
        let result = occurrences_for_day(&store, "u1", date("2024-01-08")).await;
        assert!(matches!(result, Err(AppError::Database(_))));
    }

    #[tokio::test]
    async fn day_view_assigns_lanes() {
        let store = store();
        let view = day_view(&store, "u1", date("2024-01-08")).await.unwrap();

        // gym 07-08 alone, dentist 09-11 encloses standup 09:00-09:15.
        assert_eq!(view.lane_count, 2);
        let lane = |id: &str| {
            view.occurrences
                .iter()
                .find(|p| p.occurrence.id.to_string() == id)
                .map(|p| p.lane)
                .unwrap()
        };
        assert_eq!(lane("dentist"), 0);
        assert_eq!(lane("v:2024-01-08:standup"), 1);
        assert_eq!(lane("lunch"), 0);
    }

    #[tokio::test]
    async fn range_expands_every_date() {
        let store = store();
        let week = occurrences_for_range(&store, "u1", date("2024-01-07"), date("2024-01-13"))
            .await
            .unwrap();

        let standups = week
            .iter()
            .filter(|o| o.template_id == "standup")
            .count();
        assert_eq!(standups, 5);
        assert!(week.windows(2).all(|w| w[0].start_time <= w[1].start_time));
    }

    #[tokio::test]
    async fn upcoming_skips_started_occurrences() {
        let store = store();
        let next = upcoming(&store, "u1", dt("2024-01-08 09:05"), 1).await.unwrap();

        let ids: Vec<OccurrenceId> = next.iter().map(|o| o.id.clone()).collect();
        assert!(!ids.contains(&OccurrenceId::Single("dentist".to_string())));
        assert!(ids.contains(&OccurrenceId::Single("lunch".to_string())));
        assert!(ids.contains(&OccurrenceId::Single("tomorrow".to_string())));
        // Tuesday's standup falls inside the one-day horizon.
        assert_eq!(next.last().map(|o| o.start_time), Some(dt("2024-01-09 09:00")));
    }

    #[test]
    fn range_validation() {
        assert!(validate_range(date("2024-01-01"), date("2024-03-02"), None).is_ok());
        assert!(validate_range(date("2024-01-01"), date("2024-03-03"), None).is_err());
        assert!(validate_range(date("2024-01-02"), date("2024-01-01"), None).is_err());
    }
}
