use async_trait::async_trait;

use crate::{
    app_error::AppResult,
    domain::entities::lemonsqueezy::{Customer, LicenseValidation, Order, Price, Subscription},
};

// ============================================================================
// Billing Provider Port
// ============================================================================

/// Read-only view of the payment provider.
///
/// Implementations are plain request/response wrappers: every non-2xx answer
/// becomes an error and nothing is retried or cached at this layer.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    async fn validate_license(
        &self,
        license_key: &str,
        instance_id: &str,
    ) -> AppResult<LicenseValidation>;

    async fn get_subscription(&self, subscription_id: &str) -> AppResult<Subscription>;

    /// Subscription created by a given order item, if the item was recurring.
    async fn find_subscription_by_order_item(
        &self,
        order_item_id: i64,
    ) -> AppResult<Option<Subscription>>;

    async fn list_orders(&self, customer_id: i64) -> AppResult<Vec<Order>>;

    async fn list_subscriptions(&self, customer_id: i64) -> AppResult<Vec<Subscription>>;

    async fn get_customer(&self, customer_id: i64) -> AppResult<Customer>;

    async fn find_customer_by_email(&self, email: &str) -> AppResult<Option<Customer>>;

    /// Price model of a variant. Decides lifetime versus recurring.
    async fn get_variant_price(&self, variant_id: i64) -> AppResult<Price>;
}
