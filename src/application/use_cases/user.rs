use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::reconcile_queue::{ReconcileDispatcher, ReconcileJob},
        validators::is_valid_email,
    },
    domain::entities::user::{BillingUpdate, User},
};

#[async_trait]
pub trait UserRepoTrait: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> AppResult<Option<User>>;

    /// Inserts a FREE user. Returns the existing row if the id is taken.
    async fn create_user(&self, user_id: Uuid, email: &str) -> AppResult<User>;

    /// Overwrites every billing column in one statement.
    async fn update_billing(&self, user_id: Uuid, update: &BillingUpdate) -> AppResult<User>;

    async fn set_premium_until(
        &self,
        user_id: Uuid,
        premium_until: DateTime<Utc>,
    ) -> AppResult<User>;

    async fn get_user_by_provider_customer_id(&self, customer_id: i64)
    -> AppResult<Option<User>>;
}

#[derive(Clone)]
pub struct UserUseCases {
    repo: Arc<dyn UserRepoTrait>,
    dispatcher: Arc<dyn ReconcileDispatcher>,
}

impl UserUseCases {
    pub fn new(repo: Arc<dyn UserRepoTrait>, dispatcher: Arc<dyn ReconcileDispatcher>) -> Self {
        Self { repo, dispatcher }
    }

    /// Returns the local user, creating it as FREE on first sign-in.
    ///
    /// A newly created user gets a background lookup of any purchase already
    /// made with the same email.
    #[instrument(skip(self))]
    pub async fn ensure_user(&self, user_id: Uuid, email: &str) -> AppResult<User> {
        if let Some(user) = self.repo.get_user(user_id).await? {
            return Ok(user);
        }

        let email = email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(AppError::InvalidInput("Token carries no usable email".into()));
        }

        let user = self.repo.create_user(user_id, &email).await?;
        info!(user_id = %user.id, "Created user on first sign-in");

        if let Err(e) = self
            .dispatcher
            .dispatch(ReconcileJob::LinkExisting { user_id: user.id })
        {
            warn!(user_id = %user.id, error = %e, "Could not schedule purchase lookup for new user");
        }

        Ok(user)
    }
}
