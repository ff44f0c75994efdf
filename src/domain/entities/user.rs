use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Billing tier of a user as stored locally.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    sqlx::Type,
    AsRefStr,
    Display,
    EnumString,
)]
#[sqlx(type_name = "user_tier", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Tier {
    #[default]
    Free,
    Premium,
    Lifetime,
}

impl Tier {
    pub fn is_paid(&self) -> bool {
        matches!(self, Tier::Premium | Tier::Lifetime)
    }
}

/// `premium_until` value stored for lifetime purchases.
pub fn lifetime_premium_until() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|d| d.and_hms_micro_opt(23, 59, 59, 999_999))
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub tier: Tier,
    pub is_premium: bool,
    pub premium_until: Option<DateTime<Utc>>,
    pub provider_customer_id: Option<i64>,
    pub subscription_id: Option<String>,
    pub variant_id: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    /// Entitled right now: flagged premium and `premium_until` still ahead.
    pub fn is_entitled_at(&self, now: DateTime<Utc>) -> bool {
        self.is_premium && self.premium_until.is_some_and(|until| until > now)
    }
}

/// A complete overwrite of a user's billing columns.
///
/// Only constructible through [`BillingUpdate::free`], [`BillingUpdate::premium`]
/// and [`BillingUpdate::lifetime`], so `tier`/`is_premium`/`subscription_id`
/// always agree with each other.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingUpdate {
    tier: Tier,
    premium_until: Option<DateTime<Utc>>,
    provider_customer_id: Option<i64>,
    subscription_id: Option<String>,
    variant_id: Option<i64>,
}

impl BillingUpdate {
    pub fn free(provider_customer_id: Option<i64>) -> Self {
        Self {
            tier: Tier::Free,
            premium_until: None,
            provider_customer_id,
            subscription_id: None,
            variant_id: None,
        }
    }

    pub fn premium(
        provider_customer_id: Option<i64>,
        subscription_id: String,
        variant_id: i64,
        premium_until: DateTime<Utc>,
    ) -> Self {
        Self {
            tier: Tier::Premium,
            premium_until: Some(premium_until),
            provider_customer_id,
            subscription_id: Some(subscription_id),
            variant_id: Some(variant_id),
        }
    }

    pub fn lifetime(provider_customer_id: Option<i64>, variant_id: i64) -> Self {
        Self {
            tier: Tier::Lifetime,
            premium_until: Some(lifetime_premium_until()),
            provider_customer_id,
            subscription_id: None,
            variant_id: Some(variant_id),
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn is_premium(&self) -> bool {
        self.tier.is_paid()
    }

    pub fn premium_until(&self) -> Option<DateTime<Utc>> {
        self.premium_until
    }

    pub fn provider_customer_id(&self) -> Option<i64> {
        self.provider_customer_id
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription_id.as_deref()
    }

    pub fn variant_id(&self) -> Option<i64> {
        self.variant_id
    }

    /// True when `user` already carries exactly this billing state.
    pub fn is_reflected_in(&self, user: &User) -> bool {
        user.tier == self.tier
            && user.is_premium == self.is_premium()
            && user.premium_until == self.premium_until
            && user.subscription_id == self.subscription_id
            && user.variant_id == self.variant_id
            && (self.provider_customer_id.is_none()
                || user.provider_customer_id == self.provider_customer_id)
    }

    /// Applies the update to an in-memory user.
    pub fn apply_to(&self, user: &mut User) {
        user.tier = self.tier;
        user.is_premium = self.is_premium();
        user.premium_until = self.premium_until;
        user.provider_customer_id = self.provider_customer_id.or(user.provider_customer_id);
        user.subscription_id = self.subscription_id.clone();
        user.variant_id = self.variant_id;
    }
}
