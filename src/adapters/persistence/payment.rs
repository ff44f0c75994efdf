use async_trait::async_trait;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::reconciler::PaymentRepoTrait,
    domain::entities::payment::NewPayment,
};

#[async_trait]
impl PaymentRepoTrait for PostgresPersistence {
    async fn create_payment(&self, payment: &NewPayment) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscription_payments (
                invoice_id, user_id, email, provider_subscription_id, provider_customer_id,
                billing_reason, status, currency, total, subtotal, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (invoice_id) DO NOTHING
            "#,
        )
        .bind(&payment.invoice_id)
        .bind(payment.user_id)
        .bind(&payment.email)
        .bind(&payment.provider_subscription_id)
        .bind(payment.provider_customer_id)
        .bind(&payment.billing_reason)
        .bind(&payment.status)
        .bind(&payment.currency)
        .bind(payment.total)
        .bind(payment.subtotal)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected() == 1)
    }
}
