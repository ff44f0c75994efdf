use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Usage quota exceeded")]
    QuotaExceeded,

    #[error("Not found")]
    NotFound,

    #[error("Cannot resolve user for webhook: {0}")]
    UserNotResolved(String),

    /// Event contradicts the subscription/variant stored for the user.
    #[error("Subscription state mismatch for user {user_id}: {detail}")]
    SubscriptionMismatch { user_id: Uuid, detail: String },

    #[error("Billing provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Billing provider unreachable: {0}")]
    ProviderTransport(String),

    #[error("Billing provider call timed out")]
    ProviderTimeout,

    #[error("Failed to store raw webhook: {0}")]
    RawWebhookStorage(String),

    #[error("Reconcile queue unavailable")]
    QueueUnavailable,

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Clone, Copy, Debug)]
pub enum ErrorCode {
    DatabaseError,
    InvalidSignature,
    InvalidInput,
    Unauthorized,
    QuotaExceeded,
    NotFound,
    UserNotResolved,
    SubscriptionMismatch,
    ProviderError,
    WebhookStorageFailed,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::QuotaExceeded => "QUOTA_EXCEEDED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::UserNotResolved => "USER_NOT_RESOLVED",
            ErrorCode::SubscriptionMismatch => "SUBSCRIPTION_MISMATCH",
            ErrorCode::ProviderError => "PROVIDER_ERROR",
            ErrorCode::WebhookStorageFailed => "WEBHOOK_STORAGE_FAILED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::ProviderTimeout
        } else {
            AppError::ProviderTransport(err.to_string())
        }
    }
}
