use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::jwt,
};

/// The signed-in user behind a bearer access token.
///
/// Unknown users are created as FREE on their first authenticated request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> AppResult<Self> {
        // Already resolved by an outer layer.
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let token = bearer_token(&parts.headers).ok_or(AppError::Unauthorized)?;
        let claims = jwt::verify(token, &state.config.jwt_secret)?;
        let user_id = claims.user_id()?;

        let user = state
            .user_use_cases
            .ensure_user(user_id, claims.email.as_deref().unwrap_or_default())
            .await?;

        let auth = AuthUser {
            user_id: user.id,
            email: user.email,
        };
        parts.extensions.insert(auth.clone());
        Ok(auth)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Gates a quota-consuming route on the usage ledger.
///
/// Denied users get 429. A successful response is charged one unit on a
/// detached task, so the charge lands after the response is produced.
pub async fn metered_usage(
    State(app_state): State<AppState>,
    user: AuthUser,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let allowed = match app_state.ledger.is_user_allowed(user.user_id).await {
        Ok(allowed) => allowed,
        Err(e) => {
            // Fail open.
            warn!(user_id = %user.user_id, error = %e, "Usage check failed, allowing request");
            true
        }
    };
    if !allowed {
        return Err(AppError::QuotaExceeded);
    }

    let response = next.run(request).await;

    if response.status().is_success() {
        let ledger = app_state.ledger.clone();
        let user_id = user.user_id;
        tokio::spawn(async move {
            if let Err(e) = ledger.update_user_usage(user_id, 1).await {
                error!(%user_id, error = %e, "Failed to record usage");
            }
        });
    }

    Ok(response)
}
