//! Test data factories for creating valid test fixtures.
//!
//! Each factory creates a complete object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::domain::entities::{
    lemonsqueezy::{
        Customer, CustomerAttributes, LicenseKeyAttributes, Order, OrderAttributes, OrderItem,
        OrderStatus, Price, PriceAttributes, PriceCategory, Resource, Subscription,
        SubscriptionAttributes, SubscriptionInvoiceAttributes, SubscriptionStatus,
    },
    usage::UsagePeriod,
    user::{Tier, User},
    webhook::{CustomData, EventName, WebhookEntity, WebhookMeta, WebhookPayload},
};

/// Product id every factory bills by default.
pub const TEST_PRODUCT_ID: i64 = 4242;

const TEST_CUSTOMER_ID: i64 = 1;
const TEST_VARIANT_ID: i64 = 1;

// ============================================================================
// Local state
// ============================================================================

/// A FREE user with a unique email and no provider link.
pub fn create_test_user(overrides: impl FnOnce(&mut User)) -> User {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let mut user = User {
        id,
        email: format!("user-{}@example.com", id.simple()),
        tier: Tier::Free,
        is_premium: false,
        premium_until: None,
        provider_customer_id: None,
        subscription_id: None,
        variant_id: None,
        created_at: Some(now),
        updated_at: Some(now),
    };
    overrides(&mut user);
    user
}

/// A period that started an hour ago and runs for another 23 hours.
pub fn create_test_period(user_id: Uuid, overrides: impl FnOnce(&mut UsagePeriod)) -> UsagePeriod {
    let now = Utc::now();
    let mut period = UsagePeriod {
        id: Uuid::new_v4(),
        user_id,
        time_from: now - Duration::hours(1),
        time_to: now + Duration::hours(23),
        usage: 0,
    };
    overrides(&mut period);
    period
}

// ============================================================================
// Provider resources
// ============================================================================

pub fn test_customer(id: i64, email: &str) -> Customer {
    Resource {
        id: id.to_string(),
        attributes: CustomerAttributes {
            email: email.to_string(),
            name: None,
        },
    }
}

pub fn test_price(variant_id: i64, category: PriceCategory) -> Price {
    Resource {
        id: (variant_id * 100).to_string(),
        attributes: PriceAttributes {
            variant_id,
            category,
        },
    }
}

fn order_attributes() -> OrderAttributes {
    OrderAttributes {
        customer_id: TEST_CUSTOMER_ID,
        user_email: None,
        status: OrderStatus::Paid,
        refunded: false,
        first_order_item: OrderItem {
            id: Some(1),
            product_id: TEST_PRODUCT_ID,
            variant_id: TEST_VARIANT_ID,
        },
    }
}

fn subscription_attributes() -> SubscriptionAttributes {
    SubscriptionAttributes {
        customer_id: TEST_CUSTOMER_ID,
        order_item_id: Some(1),
        product_id: TEST_PRODUCT_ID,
        variant_id: TEST_VARIANT_ID,
        user_email: None,
        status: SubscriptionStatus::Active,
        renews_at: Utc::now() + Duration::days(30),
        ends_at: None,
    }
}

/// A paid, unrefunded order of the test product.
pub fn test_order(id: &str, overrides: impl FnOnce(&mut OrderAttributes)) -> Order {
    let mut attributes = order_attributes();
    overrides(&mut attributes);
    Resource {
        id: id.to_string(),
        attributes,
    }
}

/// An active subscription renewing in 30 days.
pub fn test_subscription(id: &str, overrides: impl FnOnce(&mut SubscriptionAttributes)) -> Subscription {
    let mut attributes = subscription_attributes();
    overrides(&mut attributes);
    Resource {
        id: id.to_string(),
        attributes,
    }
}

// ============================================================================
// Webhook payloads
// ============================================================================

fn payload(event: EventName, user_id: Option<Uuid>, data: WebhookEntity) -> WebhookPayload {
    WebhookPayload {
        meta: WebhookMeta {
            event_name: event,
            custom_data: user_id.map(|id| CustomData {
                user_id: Some(id.to_string()),
            }),
        },
        data,
    }
}

pub fn order_payload(
    event: EventName,
    user_id: Option<Uuid>,
    overrides: impl FnOnce(&mut OrderAttributes),
) -> WebhookPayload {
    let order = test_order("1", overrides);
    payload(
        event,
        user_id,
        WebhookEntity::Order {
            id: order.id,
            attributes: order.attributes,
        },
    )
}

pub fn subscription_payload(
    event: EventName,
    user_id: Option<Uuid>,
    subscription_id: &str,
    overrides: impl FnOnce(&mut SubscriptionAttributes),
) -> WebhookPayload {
    let subscription = test_subscription(subscription_id, overrides);
    payload(
        event,
        user_id,
        WebhookEntity::Subscription {
            id: subscription.id,
            attributes: subscription.attributes,
        },
    )
}

pub fn invoice_payload(
    event: EventName,
    user_id: Option<Uuid>,
    invoice_id: &str,
    overrides: impl FnOnce(&mut SubscriptionInvoiceAttributes),
) -> WebhookPayload {
    let now = Utc::now();
    let mut attributes = SubscriptionInvoiceAttributes {
        subscription_id: 1,
        customer_id: TEST_CUSTOMER_ID,
        user_email: None,
        billing_reason: "renewal".into(),
        status: "paid".into(),
        currency: "USD".into(),
        total: 999,
        subtotal: 999,
        created_at: now,
        updated_at: now,
    };
    overrides(&mut attributes);
    payload(
        event,
        user_id,
        WebhookEntity::SubscriptionInvoice {
            id: invoice_id.to_string(),
            attributes,
        },
    )
}

pub fn license_key_payload(
    event: EventName,
    user_id: Option<Uuid>,
    overrides: impl FnOnce(&mut LicenseKeyAttributes),
) -> WebhookPayload {
    let mut attributes = LicenseKeyAttributes {
        customer_id: TEST_CUSTOMER_ID,
        order_id: 1,
        order_item_id: 1,
        product_id: TEST_PRODUCT_ID,
        user_email: None,
        status: "active".into(),
    };
    overrides(&mut attributes);
    payload(
        event,
        user_id,
        WebhookEntity::LicenseKey {
            id: "1".into(),
            attributes,
        },
    )
}
