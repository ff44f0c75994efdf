use axum::{Json, Router, extract::State, response::IntoResponse, routing::post};
use serde::{Deserialize, Serialize};

use crate::{
    adapters::http::{app_state::AppState, middleware::AuthUser},
    app_error::{AppError, AppResult},
    application::validators::is_valid_license_token,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/license", post(apply_license))
}

#[derive(Deserialize)]
struct LicenseRequest {
    license_key: String,
    instance_id: String,
}

#[derive(Serialize)]
struct LicenseResponse {
    is_premium: bool,
}

async fn apply_license(
    State(app_state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<LicenseRequest>,
) -> AppResult<impl IntoResponse> {
    let license_key = payload.license_key.trim();
    let instance_id = payload.instance_id.trim();
    if !is_valid_license_token(license_key) || !is_valid_license_token(instance_id) {
        return Err(AppError::InvalidInput(
            "license_key and instance_id are required".into(),
        ));
    }

    let is_premium = app_state
        .reconciler
        .apply_license(user.user_id, license_key, instance_id)
        .await?;

    Ok(Json(LicenseResponse { is_premium }))
}
