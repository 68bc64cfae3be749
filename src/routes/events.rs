use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::db::models::{CreateEventTemplate, EventFields, EventTemplate, UpdateEventTemplate};
use crate::db::EventRepository;
use crate::error::{AppError, AppErrorWithDetails, AppResult};
use crate::i18n;
use crate::routes::auth::AuthUser;
use crate::services::agenda::{self, DayView, MAX_UPCOMING_DAYS};
use crate::services::ports::EventStore;
use crate::services::recurrence::{Occurrence, OccurrenceId};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", axum::routing::post(create_event))
        // NOTE: fixed paths must be registered before the generic "/:id" route
        .route("/day", get(get_day))
        .route("/range", get(get_range))
        .route("/upcoming", get(get_upcoming))
        .route(
            "/:id",
            get(get_event).put(update_event).delete(delete_event),
        )
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    pub date: String,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OccurrencesResponse {
    pub items: Vec<Occurrence>,
    pub total: usize,
}

impl From<Vec<Occurrence>> for OccurrencesResponse {
    fn from(items: Vec<Occurrence>) -> Self {
        Self {
            total: items.len(),
            items,
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_date(raw: &str) -> Result<NaiveDate, AppErrorWithDetails> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        AppError::Validation(i18n::t_with("validation.invalid_date", &[("value", raw)]))
            .with_details(serde_json::json!({ "value": raw, "format": "YYYY-MM-DD" }))
    })
}

/// Accepts a template id or a virtual occurrence id; both address the whole template.
fn template_id_from_path(raw: &str) -> AppResult<String> {
    let id = raw
        .parse::<OccurrenceId>()
        .map_err(|_| AppError::NotFound(i18n::t("not_found.event")))?;
    if let Some(date) = id.date() {
        tracing::debug!("Occurrence on {} resolves to series {}", date, id.template_id());
    }
    Ok(id.template_id().to_string())
}

/// Someone else's template is reported as missing, not forbidden.
async fn load_owned(state: &AppState, user_id: &str, raw_id: &str) -> AppResult<EventTemplate> {
    let id = template_id_from_path(raw_id)?;
    state
        .store
        .get(&id)
        .await?
        .filter(|template| template.user_id == user_id)
        .ok_or_else(|| AppError::NotFound(i18n::t("not_found.event")))
}

// ============================================================================
// Handlers
// ============================================================================

async fn create_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<CreateEventTemplate>,
) -> AppResult<(StatusCode, Json<EventTemplate>)> {
    let fields = EventFields::from_create(body)
        .validated()
        .map_err(AppError::Validation)?;

    let created = EventRepository::create(&state.db, &user_id, fields).await?;
    tracing::info!("User {} created event {}", user_id, created.id);

    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<EventTemplate>> {
    Ok(Json(load_owned(&state, &user_id, &id).await?))
}

/// Partial update. On a series this edits every occurrence.
async fn update_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateEventTemplate>,
) -> AppResult<Json<EventTemplate>> {
    let current = load_owned(&state, &user_id, &id).await?;
    let fields = EventFields::merge(&current, body)
        .validated()
        .map_err(AppError::Validation)?;

    let updated = EventRepository::update(&state.db, &user_id, &current.id, fields).await?;
    Ok(Json(updated))
}

/// Deleting any occurrence of a series deletes the series.
async fn delete_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let template_id = template_id_from_path(&id)?;

    if !state.store.delete(&user_id, &template_id).await? {
        return Err(AppError::NotFound(i18n::t("not_found.event")));
    }
    tracing::info!("User {} deleted event {}", user_id, template_id);

    Ok(Json(serde_json::json!({
        "message": i18n::t("event.deleted")
    })))
}

/// Occurrences of one day with their timeline lanes
async fn get_day(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<DayQuery>,
) -> Result<Json<DayView>, AppErrorWithDetails> {
    let date = parse_date(&query.date)?;
    Ok(Json(agenda::day_view(&state.store, &user_id, date).await?))
}

async fn get_range(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<RangeQuery>,
) -> Result<Json<OccurrencesResponse>, AppErrorWithDetails> {
    let from = parse_date(&query.from)?;
    let to = parse_date(&query.to)?;
    agenda::validate_range(from, to, None)?;

    let items = agenda::occurrences_for_range(&state.store, &user_id, from, to).await?;
    Ok(Json(items.into()))
}

async fn get_upcoming(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<UpcomingQuery>,
) -> AppResult<Json<OccurrencesResponse>> {
    let days = query.days.unwrap_or(1);
    if !(1..=MAX_UPCOMING_DAYS).contains(&days) {
        return Err(AppError::Validation(i18n::t_with(
            "validation.upcoming_days",
            &[("max", &MAX_UPCOMING_DAYS.to_string())],
        )));
    }

    let now = state.config.display.now_local();
    let items = agenda::upcoming(&state.store, &user_id, now, days).await?;
    Ok(Json(items.into()))
}
