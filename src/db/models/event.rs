use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Stored definition of a single appointment or of a weekly series.
///
/// For a recurring template `start_time`/`end_time` carry the anchor date
/// (first occurrence) and the time-of-day used for every occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTemplate {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub is_recurring: bool,
    /// Weekday numbers, 0 = Sunday .. 6 = Saturday. Sorted, no duplicates.
    pub recurrence_days: Option<Vec<u8>>,
    pub recurrence_end_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl EventTemplate {
    /// Calendar date of the template's own start (the anchor for a series).
    pub fn anchor_date(&self) -> NaiveDate {
        self.start_time.date()
    }

    pub fn recurs_on_weekday(&self, weekday: u8) -> bool {
        self.is_recurring
            && self
                .recurrence_days
                .as_deref()
                .is_some_and(|days| days.contains(&weekday))
    }
}

// Intermediate structure for reading from DB (recurrence days are stored as JSON text)
#[derive(sqlx::FromRow)]
pub(crate) struct RowEventTemplate {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub is_recurring: bool,
    pub recurrence_days: Option<String>,
    pub recurrence_end_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<RowEventTemplate> for EventTemplate {
    fn from(row: RowEventTemplate) -> Self {
        let recurrence_days = row.recurrence_days.as_deref().and_then(|raw| {
            match serde_json::from_str::<Vec<u8>>(raw) {
                Ok(days) => Some(days),
                Err(e) => {
                    tracing::warn!(
                        "Event {} has unreadable recurrence_days {:?}: {}",
                        row.id,
                        raw,
                        e
                    );
                    None
                }
            }
        });

        EventTemplate {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            description: row.description,
            start_time: row.start_time,
            end_time: row.end_time,
            is_recurring: row.is_recurring,
            recurrence_days,
            recurrence_end_date: row.recurrence_end_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventTemplate {
    pub title: String,
    pub description: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub is_recurring: bool,
    pub recurrence_days: Option<Vec<u8>>,
    pub recurrence_end_date: Option<NaiveDate>,
}

/// Partial update. Nullable fields use `Option<Option<_>>` so that an explicit
/// `null` clears the value while an absent field leaves it untouched.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateEventTemplate {
    pub title: Option<String>,
    #[serde(default, with = "double_option")]
    pub description: Option<Option<String>>,
    pub start_time: Option<NaiveDateTime>,
    #[serde(default, with = "double_option")]
    pub end_time: Option<Option<NaiveDateTime>>,
    pub is_recurring: Option<bool>,
    #[serde(default, with = "double_option")]
    pub recurrence_days: Option<Option<Vec<u8>>>,
    #[serde(default, with = "double_option")]
    pub recurrence_end_date: Option<Option<NaiveDate>>,
}

mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

/// Validated field set written to the `events` table on create or update.
#[derive(Debug, Clone)]
pub struct EventFields {
    pub title: String,
    pub description: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub is_recurring: bool,
    pub recurrence_days: Option<Vec<u8>>,
    pub recurrence_end_date: Option<NaiveDate>,
}

impl EventFields {
    /// Enforce the template invariants and normalize recurrence days.
    ///
    /// Returns a human readable message on the first violated rule.
    pub fn validated(mut self) -> Result<Self, String> {
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            return Err("title must not be empty".to_string());
        }
        self.description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        if let Some(end) = self.end_time {
            if end < self.start_time {
                return Err("end_time must not be before start_time".to_string());
            }
        }

        if self.is_recurring {
            let mut days = self.recurrence_days.take().unwrap_or_default();
            if let Some(bad) = days.iter().find(|d| **d > 6) {
                return Err(format!(
                    "recurrence_days must be weekday numbers 0..=6, got {}",
                    bad
                ));
            }
            days.sort_unstable();
            days.dedup();
            if days.is_empty() {
                return Err("recurring events need at least one recurrence day".to_string());
            }
            if let Some(end_date) = self.recurrence_end_date {
                if end_date < self.start_time.date() {
                    return Err("recurrence_end_date must not be before the first occurrence".to_string());
                }
            }
            self.recurrence_days = Some(days);
        } else {
            // A single event carries no recurrence data.
            self.recurrence_days = None;
            self.recurrence_end_date = None;
        }

        Ok(self)
    }

    pub fn from_create(create: CreateEventTemplate) -> Self {
        EventFields {
            title: create.title,
            description: create.description,
            start_time: create.start_time,
            end_time: create.end_time,
            is_recurring: create.is_recurring,
            recurrence_days: create.recurrence_days,
            recurrence_end_date: create.recurrence_end_date,
        }
    }

    /// Merge a partial update onto the current template.
    pub fn merge(current: &EventTemplate, update: UpdateEventTemplate) -> Self {
        EventFields {
            title: update.title.unwrap_or_else(|| current.title.clone()),
            description: update
                .description
                .unwrap_or_else(|| current.description.clone()),
            start_time: update.start_time.unwrap_or(current.start_time),
            end_time: update.end_time.unwrap_or(current.end_time),
            is_recurring: update.is_recurring.unwrap_or(current.is_recurring),
            recurrence_days: update
                .recurrence_days
                .unwrap_or_else(|| current.recurrence_days.clone()),
            recurrence_end_date: update
                .recurrence_end_date
                .unwrap_or(current.recurrence_end_date),
        }
    }
}
