pub mod health;
pub mod usage;
pub mod users;
pub mod webhooks;

use axum::Router;

use crate::adapters::http::app_state::AppState;

pub fn router(app_state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/webhooks", webhooks::router())
        .nest("/usage", usage::router(app_state))
        .nest("/users", users::router())
}
