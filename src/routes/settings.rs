use std::sync::Arc;

use axum::{extract::State, routing::get, routing::put, Json, Router};
use serde::Serialize;

use crate::db::models::{
    SetTelegramChat, UpdateNotificationSettings, UserNotificationSettings, MAX_LEAD_MINUTES,
};
use crate::db::NotificationSettingsRepository;
use crate::error::{AppError, AppResult};
use crate::i18n;
use crate::routes::auth::AuthUser;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_settings).put(update_settings))
        .route(
            "/telegram",
            put(set_telegram_chat).delete(clear_telegram_chat),
        )
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub notifications_enabled: bool,
    pub notification_minutes_before: i64,
    pub telegram_chat_id: Option<String>,
    pub lang: String,
    /// Whether the server has a working chat bot at all.
    pub telegram_available: bool,
}

impl SettingsResponse {
    fn new(settings: UserNotificationSettings, telegram_available: bool) -> Self {
        Self {
            lang: settings.language().to_string(),
            notifications_enabled: settings.notifications_enabled,
            notification_minutes_before: settings.notification_minutes_before,
            telegram_chat_id: settings.telegram_chat_id,
            telegram_available,
        }
    }
}

async fn telegram_available(state: &AppState) -> bool {
    state.telegram.read().await.is_some()
}

fn validate_update(mut update: UpdateNotificationSettings) -> AppResult<UpdateNotificationSettings> {
    if let Some(minutes) = update.notification_minutes_before {
        if !(0..=MAX_LEAD_MINUTES).contains(&minutes) {
            return Err(AppError::Validation(i18n::t_with(
                "validation.lead_minutes",
                &[("max", &MAX_LEAD_MINUTES.to_string())],
            )));
        }
    }

    if let Some(lang) = update.lang.take() {
        let normalized = i18n::normalize_language(&lang);
        if !i18n::is_supported_language(&normalized) {
            return Err(AppError::Validation(i18n::t_with(
                "error.unsupported_language",
                &[("lang", &lang)],
            )));
        }
        update.lang = Some(normalized);
    }

    Ok(update)
}

// ============================================================================
// Handlers
// ============================================================================

/// Stored settings, or the defaults when the user never saved any
async fn get_settings(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<SettingsResponse>> {
    let settings = NotificationSettingsRepository::find_by_user_id(&state.db, &user_id)
        .await?
        .unwrap_or_else(|| UserNotificationSettings::defaults_for(&user_id));

    Ok(Json(SettingsResponse::new(
        settings,
        telegram_available(&state).await,
    )))
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<UpdateNotificationSettings>,
) -> AppResult<Json<SettingsResponse>> {
    let update = validate_update(body)?;
    let settings = NotificationSettingsRepository::update(&state.db, &user_id, update).await?;

    Ok(Json(SettingsResponse::new(
        settings,
        telegram_available(&state).await,
    )))
}

async fn set_telegram_chat(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<SetTelegramChat>,
) -> AppResult<Json<serde_json::Value>> {
    if !telegram_available(&state).await {
        tracing::debug!(
            "User {} linked a Telegram chat while no bot is configured",
            user_id
        );
    }

    NotificationSettingsRepository::set_telegram_chat(
        &state.db,
        &user_id,
        Some(body.chat_id.to_string()),
    )
    .await?;

    Ok(Json(serde_json::json!({
        "message": i18n::t("telegram.linked")
    })))
}

async fn clear_telegram_chat(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<serde_json::Value>> {
    NotificationSettingsRepository::set_telegram_chat(&state.db, &user_id, None).await?;

    Ok(Json(serde_json::json!({
        "message": i18n::t("telegram.unlinked")
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::routes::tests::{app, bearer, read_json};

    fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", bearer("ana"))
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap()
    }

    #[test]
    fn lead_time_bounds_are_enforced() {
        let too_long = UpdateNotificationSettings {
            notification_minutes_before: Some(MAX_LEAD_MINUTES + 1),
            ..Default::default()
        };
        assert!(matches!(validate_update(too_long), Err(AppError::Validation(_))));

        let negative = UpdateNotificationSettings {
            notification_minutes_before: Some(-1),
            ..Default::default()
        };
        assert!(validate_update(negative).is_err());
    }

    #[test]
    fn language_is_normalized() {
        let update = UpdateNotificationSettings {
            lang: Some("EN-us".to_string()),
            ..Default::default()
        };
        assert_eq!(validate_update(update).unwrap().lang.as_deref(), Some("en"));

        let update = UpdateNotificationSettings {
            lang: Some("fr".to_string()),
            ..Default::default()
        };
        assert!(validate_update(update).is_err());
    }

    #[tokio::test]
    async fn defaults_then_partial_update_then_telegram_link() {
        let (app, _) = app().await;

        let resp = app.clone().oneshot(request("GET", "/api/settings", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = read_json(resp).await;
        assert_eq!(body["notifications_enabled"], true);
        assert_eq!(body["notification_minutes_before"], 15);
        assert_eq!(body["lang"], "pt");
        assert_eq!(body["telegram_available"], false);

        let resp = app
            .clone()
            .oneshot(request(
                "PUT",
                "/api/settings",
                Some(json!({ "notification_minutes_before": 30 })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = read_json(resp).await;
        assert_eq!(body["notification_minutes_before"], 30);
        assert_eq!(body["notifications_enabled"], true);

        let resp = app
            .clone()
            .oneshot(request(
                "PUT",
                "/api/settings/telegram",
                Some(json!({ "chat_id": -100123 })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app.clone().oneshot(request("GET", "/api/settings", None)).await.unwrap();
        assert_eq!(read_json(resp).await["telegram_chat_id"], "-100123");

        let resp = app
            .clone()
            .oneshot(request("DELETE", "/api/settings/telegram", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app.oneshot(request("GET", "/api/settings", None)).await.unwrap();
        assert_eq!(read_json(resp).await["telegram_chat_id"], Value::Null);
    }
}
