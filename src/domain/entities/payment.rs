use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A successful subscription charge, keyed by the provider's invoice id.
///
/// `user_id` is absent when the invoice could not be linked to a local user;
/// `email` then carries the customer's address from the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub invoice_id: String,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub provider_subscription_id: String,
    pub provider_customer_id: i64,
    pub billing_reason: String,
    pub status: String,
    pub currency: String,
    pub total: i64,
    pub subtotal: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
