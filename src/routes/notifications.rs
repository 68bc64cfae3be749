use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::models::NotificationLog;
use crate::db::NotificationLogRepository;
use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_notifications))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct NotificationsListResponse {
    pub items: Vec<NotificationLog>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

// ============================================================================
// Handlers
// ============================================================================

/// Reminder history of the current user, newest first
async fn list_notifications(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<ListNotificationsQuery>,
) -> AppResult<Json<NotificationsListResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * per_page;

    let (items, total) = tokio::try_join!(
        NotificationLogRepository::find_by_user_id(&state.db, &user_id, per_page, offset),
        NotificationLogRepository::count_by_user_id(&state.db, &user_id),
    )?;

    let total_pages = (total + per_page - 1) / per_page;

    Ok(Json(NotificationsListResponse {
        items,
        total,
        page,
        per_page,
        total_pages,
    }))
}
