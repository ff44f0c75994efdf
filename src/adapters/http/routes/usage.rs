use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};

use crate::{
    adapters::http::{
        app_state::AppState,
        middleware::{AuthUser, metered_usage},
    },
    app_error::AppResult,
};

pub fn router(app_state: AppState) -> Router<AppState> {
    Router::new().route("/current", get(current_usage)).route(
        "/consume",
        post(consume).layer(middleware::from_fn_with_state(app_state, metered_usage)),
    )
}

async fn current_usage(
    State(app_state): State<AppState>,
    user: AuthUser,
) -> AppResult<impl IntoResponse> {
    let status = app_state.ledger.usage_status(user.user_id).await?;
    Ok(Json(status))
}

/// One billed unit. Gating and charging happen in `metered_usage`.
async fn consume(_user: AuthUser) -> StatusCode {
    StatusCode::NO_CONTENT
}
