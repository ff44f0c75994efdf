use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
};
use uuid::Uuid;

use crate::{adapters::http::app_state::AppState, app_error::AppResult};

const SIGNATURE_HEADER: &str = "x-signature";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/lemonsqueezy", post(receive_lemonsqueezy))
        .route("/lemonsqueezy/replay/{event_id}", post(replay_lemonsqueezy))
}

fn signature(headers: &HeaderMap) -> Option<&str> {
    headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok())
}

/// Acknowledges once the raw event is stored; reconciliation runs in the background.
async fn receive_lemonsqueezy(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let ack = app_state
        .webhook_ingestor
        .receive(&body, signature(&headers))
        .await?;
    Ok(Json(ack))
}

/// Re-dispatches a stored event. `X-Signature` signs the event id.
async fn replay_lemonsqueezy(
    State(app_state): State<AppState>,
    Path(event_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let ack = app_state
        .webhook_ingestor
        .replay(event_id, signature(&headers))
        .await?;
    Ok(Json(ack))
}
