use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};

use crate::error::{AppError, AppResult};
use crate::routes::auth::bearer_token;
use crate::services::ports::{ChatTransport, PushTransport};
use crate::services::scanner::{NotificationScanner, ScanDeps, ScanPolicy, ScanSummary};
use crate::AppState;

/// Entry point for the external scheduler. Rate limiting is applied by the caller.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/send-notifications",
        get(send_notifications).post(send_notifications),
    )
}

fn check_secret(state: &AppState, headers: &HeaderMap) -> AppResult<()> {
    let Some(expected) = state.config.server.cron_secret.as_deref() else {
        return Ok(());
    };

    let presented = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);

    match presented {
        Some(token) if token == expected => Ok(()),
        _ => {
            tracing::warn!("Rejected scan trigger with a missing or wrong secret");
            Err(AppError::Unauthorized)
        }
    }
}

/// Wire the scanner to SQLite and whatever delivery channels are up.
async fn build_scanner(state: &AppState) -> AppResult<NotificationScanner> {
    let push: Arc<dyn PushTransport> = state
        .push
        .read()
        .await
        .clone()
        .ok_or_else(|| AppError::Config("Web Push (VAPID) is not configured".to_string()))?;

    let chat = state
        .telegram
        .read()
        .await
        .clone()
        .map(|tg| Arc::new(tg) as Arc<dyn ChatTransport>);

    let store = Arc::new(state.store.clone());
    let deps = ScanDeps {
        events: store.clone(),
        settings: store.clone(),
        subscriptions: store.clone(),
        dedup: store,
        push,
        chat,
    };

    Ok(
        NotificationScanner::new(deps, ScanPolicy::from_config(&state.config.scanner))
            .with_open_url(state.config.server.frontend_url.clone()),
    )
}

/// Run one notification scan and report what it did
async fn send_notifications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<(StatusCode, Json<ScanSummary>)> {
    check_secret(&state, &headers)?;

    let scanner = match build_scanner(&state).await {
        Ok(scanner) => scanner,
        Err(e) => {
            tracing::error!("Notification scan not started: {}", e);
            return Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ScanSummary::aborted(&e)),
            ));
        }
    };

    let summary = scanner.scan(state.config.display.now_local()).await;
    let status = if summary.error.is_some() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };

    Ok((status, Json(summary)))
}
