use crate::app_error::{AppError, ErrorCode};
use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::InvalidSignature => (StatusCode::FORBIDDEN, ErrorCode::InvalidSignature, None),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, None),
            AppError::InvalidInput(ref msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::InvalidInput, Some(msg.clone()))
            }
            AppError::NotFound => (StatusCode::NOT_FOUND, ErrorCode::NotFound, None),
            AppError::QuotaExceeded => {
                (StatusCode::TOO_MANY_REQUESTS, ErrorCode::QuotaExceeded, None)
            }
            AppError::Provider { .. } | AppError::ProviderTransport(_) | AppError::ProviderTimeout => {
                (StatusCode::BAD_GATEWAY, ErrorCode::ProviderError, None)
            }
            AppError::Database(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::DatabaseError, None)
            }
            AppError::UserNotResolved(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::UserNotResolved, None)
            }
            AppError::SubscriptionMismatch { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::SubscriptionMismatch, None)
            }
            AppError::RawWebhookStorage(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::WebhookStorageFailed, None)
            }
            AppError::QueueUnavailable | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::InternalError, None)
            }
        };

        // Log the error before it gets converted into a status response.
        if status.is_server_error() {
            tracing::error!(error = ?self, %status, "Request failed");
        } else {
            tracing::warn!(error = %self, %status, "Request rejected");
        }

        error_resp(status, code, message)
    }
}

fn error_resp(status: StatusCode, code: ErrorCode, message: Option<String>) -> Response {
    let body = match message {
        Some(msg) => serde_json::json!({ "code": code.as_str(), "message": msg }),
        None => serde_json::json!({ "code": code.as_str() }),
    };
    (status, Json(body)).into_response()
}
