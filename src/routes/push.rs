use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::db::models::{CreatePushSubscription, RemovePushSubscription};
use crate::db::PushSubscriptionRepository;
use crate::error::{AppError, AppResult};
use crate::i18n;
use crate::routes::auth::AuthUser;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/subscribe", post(subscribe))
        .route("/unsubscribe", post(unsubscribe))
        .route("/vapid-public-key", get(vapid_public_key))
}

#[derive(Debug, Serialize)]
pub struct VapidKeyResponse {
    pub public_key: String,
}

fn validate_subscription(mut sub: CreatePushSubscription) -> AppResult<CreatePushSubscription> {
    sub.endpoint = sub.endpoint.trim().to_string();
    if sub.endpoint.is_empty() {
        return Err(AppError::Validation(i18n::t("validation.endpoint_required")));
    }
    if sub.keys.p256dh.trim().is_empty() || sub.keys.auth.trim().is_empty() {
        return Err(AppError::Validation(i18n::t(
            "validation.push_keys_required",
        )));
    }
    Ok(sub)
}

/// Store a browser subscription; re-subscribing an endpoint refreshes its keys
async fn subscribe(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<CreatePushSubscription>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let sub = validate_subscription(body)?;
    let stored = PushSubscriptionRepository::upsert(&state.db, &user_id, sub).await?;
    tracing::info!("User {} registered push subscription {}", user_id, stored.id);

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": stored.id,
            "message": i18n::t("push.subscribed")
        })),
    ))
}

async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<RemovePushSubscription>,
) -> AppResult<Json<serde_json::Value>> {
    let removed =
        PushSubscriptionRepository::delete_by_endpoint(&state.db, &user_id, body.endpoint.trim())
            .await?;
    if !removed {
        return Err(AppError::NotFound(i18n::t("not_found.subscription")));
    }

    Ok(Json(serde_json::json!({
        "message": i18n::t("push.unsubscribed")
    })))
}

/// Public key browsers need to create a subscription. Needs no authentication.
async fn vapid_public_key(State(state): State<Arc<AppState>>) -> AppResult<Json<VapidKeyResponse>> {
    let public_key = state
        .config
        .push
        .public_key
        .clone()
        .ok_or_else(|| AppError::ServiceUnavailable(i18n::t("push.not_configured")))?;

    Ok(Json(VapidKeyResponse { public_key }))
}
