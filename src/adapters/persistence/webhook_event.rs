use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::webhook_ingest::WebhookEventRepoTrait,
    domain::entities::webhook::WebhookEventProfile,
};

fn row_to_profile(row: sqlx::postgres::PgRow) -> WebhookEventProfile {
    WebhookEventProfile {
        id: row.get("id"),
        payload: row.get("payload"),
        signature: row.get("signature"),
        received_at: row.get("received_at"),
    }
}

const SELECT_COLS: &str = "id, payload, signature, received_at";

#[async_trait]
impl WebhookEventRepoTrait for PostgresPersistence {
    async fn create(&self, payload: &str, signature: &str) -> AppResult<WebhookEventProfile> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO webhook_raw (payload, signature)
            VALUES ($1, $2)
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(payload)
        .bind(signature)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row_to_profile(row))
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<WebhookEventProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM webhook_raw WHERE id = $1",
            SELECT_COLS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_profile))
    }
}
