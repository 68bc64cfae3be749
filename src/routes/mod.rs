use std::sync::Arc;

use axum::Router;

use crate::AppState;

pub mod auth;
pub mod cron;
pub mod events;
pub mod health;
pub mod notifications;
pub mod push;
pub mod settings;

/// Every `/api` area. The cron router is passed in so the caller can put a rate limiter on it.
pub fn api(cron: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    Router::new()
        .nest("/events", events::router())
        .nest("/settings", settings::router())
        .nest("/push", push::router())
        .nest("/notifications", notifications::router())
        .nest("/cron", cron)
}
