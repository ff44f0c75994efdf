use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::usage_ledger::UsageRepoTrait,
    domain::entities::usage::{UsagePeriod, UsageSnapshot},
};

fn row_to_period(row: sqlx::postgres::PgRow) -> UsagePeriod {
    UsagePeriod {
        id: row.get("id"),
        user_id: row.get("user_id"),
        time_from: row.get("time_from"),
        time_to: row.get("time_to"),
        usage: row.get("usage"),
    }
}

const SELECT_COLS: &str = "id, user_id, time_from, time_to, usage";

#[async_trait]
impl UsageRepoTrait for PostgresPersistence {
    async fn get_current_period(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<Option<UsagePeriod>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM period_usage
            WHERE user_id = $1 AND time_from <= $2 AND time_to > $2
            ORDER BY time_from DESC
            LIMIT 1
            "#,
            SELECT_COLS
        ))
        .bind(user_id)
        .bind(at)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_period))
    }

    async fn increment_usage(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
        delta: i64,
        period_days: i32,
    ) -> AppResult<UsageSnapshot> {
        let row = sqlx::query(
            "SELECT usage, time_to FROM update_or_insert_period_usage($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(at)
        .bind(delta)
        .bind(period_days)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(UsageSnapshot {
            usage: row.get("usage"),
            time_to: row.get("time_to"),
        })
    }
}
