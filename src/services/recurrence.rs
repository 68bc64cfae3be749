//! Projection of event templates onto concrete calendar dates.
//!
//! A recurring template is never materialized per occurrence. Each occurrence
//! is computed on demand by [`expand`] and identified by an [`OccurrenceId`]
//! that maps back to its template.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::db::models::EventTemplate;

const VIRTUAL_PREFIX: &str = "v:";
const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_LEN: usize = 10;

/// Identity of one occurrence.
///
/// Wire form: the template id for single events, `v:YYYY-MM-DD:<template id>`
/// for occurrences of a series. The date has a fixed width, so any template id
/// (including ones containing `:`) round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OccurrenceId {
    Single(String),
    Virtual { template_id: String, date: NaiveDate },
}

impl OccurrenceId {
    pub fn template_id(&self) -> &str {
        match self {
            OccurrenceId::Single(id) => id,
            OccurrenceId::Virtual { template_id, .. } => template_id,
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            OccurrenceId::Single(_) => None,
            OccurrenceId::Virtual { date, .. } => Some(*date),
        }
    }
}

impl fmt::Display for OccurrenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OccurrenceId::Single(id) => f.write_str(id),
            OccurrenceId::Virtual { template_id, date } => write!(
                f,
                "{}{}:{}",
                VIRTUAL_PREFIX,
                date.format(DATE_FORMAT),
                template_id
            ),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid occurrence id: {0}")]
pub struct ParseOccurrenceIdError(String);

impl FromStr for OccurrenceId {
    type Err = ParseOccurrenceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseOccurrenceIdError(s.to_string()));
        }

        let Some(rest) = s.strip_prefix(VIRTUAL_PREFIX) else {
            return Ok(OccurrenceId::Single(s.to_string()));
        };

        let (date_part, tail) = match (rest.get(..DATE_LEN), rest.get(DATE_LEN..)) {
            (Some(d), Some(t)) => (d, t),
            _ => return Err(ParseOccurrenceIdError(s.to_string())),
        };
        let date = NaiveDate::parse_from_str(date_part, DATE_FORMAT)
            .map_err(|_| ParseOccurrenceIdError(s.to_string()))?;
        let template_id = tail
            .strip_prefix(':')
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ParseOccurrenceIdError(s.to_string()))?;

        Ok(OccurrenceId::Virtual {
            template_id: template_id.to_string(),
            date,
        })
    }
}

impl Serialize for OccurrenceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OccurrenceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A template placed on one concrete date. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Occurrence {
    pub id: OccurrenceId,
    pub template_id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub is_virtual: bool,
    pub is_recurring: bool,
    pub recurrence_days: Option<Vec<u8>>,
    pub recurrence_end_date: Option<NaiveDate>,
}

impl Occurrence {
    /// Actual duration; an occurrence without end is a point in time.
    pub fn duration(&self) -> Duration {
        self.end_time
            .map(|end| end - self.start_time)
            .filter(|d| *d > Duration::zero())
            .unwrap_or_else(Duration::zero)
    }
}

/// Weekday number used by templates: 0 = Sunday .. 6 = Saturday.
pub fn weekday_number(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Project `template` onto `date`.
///
/// Returns `None` when the template has no occurrence on that date: a single
/// event on another day, a series whose weekdays do not include the date, a
/// date before the series anchor or after its end date.
pub fn expand(template: &EventTemplate, date: NaiveDate) -> Option<Occurrence> {
    if !template.is_recurring {
        if template.start_time.date() != date {
            return None;
        }
        return Some(Occurrence {
            id: OccurrenceId::Single(template.id.clone()),
            template_id: template.id.clone(),
            user_id: template.user_id.clone(),
            title: template.title.clone(),
            description: template.description.clone(),
            start_time: template.start_time,
            end_time: template.end_time,
            is_virtual: false,
            is_recurring: false,
            recurrence_days: None,
            recurrence_end_date: None,
        });
    }

    if !template.recurs_on_weekday(weekday_number(date)) {
        return None;
    }
    if date < template.anchor_date() {
        return None;
    }
    if template.recurrence_end_date.is_some_and(|end| date > end) {
        return None;
    }

    let start_time = date.and_time(template.start_time.time());
    // Same-day series keep the end on the target date; a series that crosses
    // midnight keeps its day span.
    let end_time = template.end_time.map(|end| {
        let day_span = end.date() - template.start_time.date();
        (date + day_span).and_time(end.time())
    });

    Some(Occurrence {
        id: OccurrenceId::Virtual {
            template_id: template.id.clone(),
            date,
        },
        template_id: template.id.clone(),
        user_id: template.user_id.clone(),
        title: template.title.clone(),
        description: template.description.clone(),
        start_time,
        end_time,
        is_virtual: true,
        is_recurring: true,
        recurrence_days: template.recurrence_days.clone(),
        recurrence_end_date: template.recurrence_end_date,
    })
}
