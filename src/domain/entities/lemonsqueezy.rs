//! Resource shapes of the Lemon Squeezy JSON:API.
//!
//! The same attribute sets arrive in webhook payloads and in API responses,
//! so both the webhook parser and the API client share them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// A JSON:API resource object. Ids are strings on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource<A> {
    pub id: String,
    pub attributes: A,
}

/// Top-level `{ "data": ... }` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document<T> {
    pub data: T,
}

// ============================================================================
// Orders
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Failed,
    Paid,
    Refunded,
    PartialRefund,
    Fraudulent,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    #[serde(default)]
    pub id: Option<i64>,
    pub product_id: i64,
    pub variant_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAttributes {
    pub customer_id: i64,
    #[serde(default)]
    pub user_email: Option<String>,
    pub status: OrderStatus,
    #[serde(default)]
    pub refunded: bool,
    pub first_order_item: OrderItem,
}

impl OrderAttributes {
    /// Paid and not refunded.
    pub fn is_settled(&self) -> bool {
        self.status == OrderStatus::Paid && !self.refunded
    }
}

pub type Order = Resource<OrderAttributes>;

// ============================================================================
// Subscriptions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
    OnTrial,
    Active,
    Paused,
    PastDue,
    Unpaid,
    Cancelled,
    Expired,
    #[serde(other)]
    Unknown,
}

impl SubscriptionStatus {
    /// Statuses that still carry entitlement until `premium_until` lapses.
    pub fn is_active_state(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::OnTrial
                | SubscriptionStatus::Active
                | SubscriptionStatus::Paused
                | SubscriptionStatus::PastDue
                | SubscriptionStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionAttributes {
    pub customer_id: i64,
    #[serde(default)]
    pub order_item_id: Option<i64>,
    pub product_id: i64,
    pub variant_id: i64,
    #[serde(default)]
    pub user_email: Option<String>,
    pub status: SubscriptionStatus,
    pub renews_at: DateTime<Utc>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
}

impl SubscriptionAttributes {
    /// When access ends: `ends_at` once the provider has set it, else the renewal date.
    pub fn entitled_until(&self) -> DateTime<Utc> {
        self.ends_at.unwrap_or(self.renews_at)
    }

    pub fn is_entitled_at(&self, now: DateTime<Utc>) -> bool {
        self.status.is_active_state() && self.entitled_until() > now
    }
}

pub type Subscription = Resource<SubscriptionAttributes>;

// ============================================================================
// Subscription invoices
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionInvoiceAttributes {
    pub subscription_id: i64,
    pub customer_id: i64,
    #[serde(default)]
    pub user_email: Option<String>,
    pub billing_reason: String,
    pub status: String,
    pub currency: String,
    pub total: i64,
    pub subtotal: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// License keys
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseKeyAttributes {
    pub customer_id: i64,
    pub order_id: i64,
    pub order_item_id: i64,
    pub product_id: i64,
    #[serde(default)]
    pub user_email: Option<String>,
    pub status: String,
}

/// Response of `POST /licenses/validate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseValidation {
    pub valid: bool,
    #[serde(default)]
    pub error: Option<String>,
    pub license_key: ValidatedLicenseKey,
    pub meta: LicenseMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedLicenseKey {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseMeta {
    pub order_item_id: i64,
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub variant_id: Option<i64>,
    #[serde(default)]
    pub customer_id: Option<i64>,
}

impl LicenseValidation {
    pub fn is_usable(&self) -> bool {
        self.valid && self.license_key.status == "active"
    }
}

// ============================================================================
// Customers and prices
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerAttributes {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

pub type Customer = Resource<CustomerAttributes>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceCategory {
    OneTime,
    Subscription,
    LeadMagnet,
    Pwyw,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAttributes {
    pub variant_id: i64,
    pub category: PriceCategory,
}

impl PriceAttributes {
    /// Anything that does not renew is a one-time, lifetime purchase.
    pub fn is_lifetime(&self) -> bool {
        self.category != PriceCategory::Subscription
    }
}

pub type Price = Resource<PriceAttributes>;
