use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use uuid::Uuid;

use super::lemonsqueezy::{
    LicenseKeyAttributes, OrderAttributes, SubscriptionAttributes, SubscriptionInvoiceAttributes,
};

/// Every event name the provider sends for a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventName {
    OrderCreated,
    OrderRefunded,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionCancelled,
    SubscriptionResumed,
    SubscriptionExpired,
    SubscriptionPaused,
    SubscriptionUnpaused,
    SubscriptionPaymentSuccess,
    SubscriptionPaymentFailed,
    SubscriptionPaymentRecovered,
    SubscriptionPaymentRefunded,
    LicenseKeyCreated,
    LicenseKeyUpdated,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomData {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookMeta {
    pub event_name: EventName,
    #[serde(default)]
    pub custom_data: Option<CustomData>,
}

/// The resource a webhook is about, discriminated by its JSON:API `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WebhookEntity {
    #[serde(rename = "orders")]
    Order {
        id: String,
        attributes: OrderAttributes,
    },
    #[serde(rename = "subscriptions")]
    Subscription {
        id: String,
        attributes: SubscriptionAttributes,
    },
    #[serde(rename = "subscription-invoices")]
    SubscriptionInvoice {
        id: String,
        attributes: SubscriptionInvoiceAttributes,
    },
    #[serde(rename = "license-keys")]
    LicenseKey {
        id: String,
        attributes: LicenseKeyAttributes,
    },
}

impl WebhookEntity {
    pub fn kind(&self) -> &'static str {
        match self {
            WebhookEntity::Order { .. } => "orders",
            WebhookEntity::Subscription { .. } => "subscriptions",
            WebhookEntity::SubscriptionInvoice { .. } => "subscription-invoices",
            WebhookEntity::LicenseKey { .. } => "license-keys",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            WebhookEntity::Order { id, .. }
            | WebhookEntity::Subscription { id, .. }
            | WebhookEntity::SubscriptionInvoice { id, .. }
            | WebhookEntity::LicenseKey { id, .. } => id,
        }
    }

    pub fn customer_id(&self) -> i64 {
        match self {
            WebhookEntity::Order { attributes, .. } => attributes.customer_id,
            WebhookEntity::Subscription { attributes, .. } => attributes.customer_id,
            WebhookEntity::SubscriptionInvoice { attributes, .. } => attributes.customer_id,
            WebhookEntity::LicenseKey { attributes, .. } => attributes.customer_id,
        }
    }

    /// Product the entity belongs to, when the payload carries one.
    pub fn product_id(&self) -> Option<i64> {
        match self {
            WebhookEntity::Order { attributes, .. } => Some(attributes.first_order_item.product_id),
            WebhookEntity::Subscription { attributes, .. } => Some(attributes.product_id),
            WebhookEntity::LicenseKey { attributes, .. } => Some(attributes.product_id),
            WebhookEntity::SubscriptionInvoice { .. } => None,
        }
    }
}

/// A parsed provider callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub meta: WebhookMeta,
    pub data: WebhookEntity,
}

impl WebhookPayload {
    pub fn event_name(&self) -> EventName {
        self.meta.event_name
    }

    /// The raw `custom_data.user_id` as sent at checkout, if any.
    pub fn custom_user_id(&self) -> Option<&str> {
        self.meta
            .custom_data
            .as_ref()
            .and_then(|c| c.user_id.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Key under which processing of this event is serialized.
    pub fn ordering_key(&self) -> String {
        match self.custom_user_id() {
            Some(user_id) => format!("user:{user_id}"),
            None => format!("customer:{}", self.data.customer_id()),
        }
    }
}

/// Raw webhook as persisted before any interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEventProfile {
    pub id: Uuid,
    pub payload: String,
    pub signature: String,
    pub received_at: DateTime<Utc>,
}
