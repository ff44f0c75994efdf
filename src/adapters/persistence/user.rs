use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::user::UserRepoTrait,
    domain::entities::user::{BillingUpdate, User},
};

fn row_to_user(row: sqlx::postgres::PgRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        tier: row.get("tier"),
        is_premium: row.get("is_premium"),
        premium_until: row.get("premium_until"),
        provider_customer_id: row.get("provider_customer_id"),
        subscription_id: row.get("subscription_id"),
        variant_id: row.get("variant_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const SELECT_COLS: &str = "id, email, tier, is_premium, premium_until, provider_customer_id, \
     subscription_id, variant_id, created_at, updated_at";

#[async_trait]
impl UserRepoTrait for PostgresPersistence {
    async fn get_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", SELECT_COLS))
            .bind(user_id)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::from)?;

        Ok(row.map(row_to_user))
    }

    async fn create_user(&self, user_id: Uuid, email: &str) -> AppResult<User> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (id, email)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET email = users.email
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(user_id)
        .bind(email)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row_to_user(row))
    }

    async fn update_billing(&self, user_id: Uuid, update: &BillingUpdate) -> AppResult<User> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE users
            SET tier = $2,
                is_premium = $3,
                premium_until = $4,
                provider_customer_id = COALESCE($5, provider_customer_id),
                subscription_id = $6,
                variant_id = $7,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(user_id)
        .bind(update.tier())
        .bind(update.is_premium())
        .bind(update.premium_until())
        .bind(update.provider_customer_id())
        .bind(update.subscription_id())
        .bind(update.variant_id())
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row_to_user(row))
    }

    async fn set_premium_until(
        &self,
        user_id: Uuid,
        premium_until: DateTime<Utc>,
    ) -> AppResult<User> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE users
            SET premium_until = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(user_id)
        .bind(premium_until)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row_to_user(row))
    }

    async fn get_user_by_provider_customer_id(
        &self,
        customer_id: i64,
    ) -> AppResult<Option<User>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM users
            WHERE provider_customer_id = $1
            ORDER BY created_at
            LIMIT 1
            "#,
            SELECT_COLS
        ))
        .bind(customer_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_user))
    }
}
