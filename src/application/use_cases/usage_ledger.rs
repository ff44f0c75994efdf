use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    application::{ports::cache::CacheStore, use_cases::user::UserRepoTrait},
    domain::entities::usage::{ThrottlingConfig, ThrottlingPeriod, UsagePeriod, UsageSnapshot},
};

// ============================================================================
// Constants
// ============================================================================

/// Ceiling for caching a positive premium flag. Reconciliation revalidates on
/// every change, this only bounds staleness when such a revalidation is lost.
pub const MAX_PREMIUM_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub fn premium_key(user_id: Uuid) -> String {
    format!("users:premium:{user_id}")
}

pub fn usage_key(user_id: Uuid) -> String {
    format!("users:usage:{user_id}")
}

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait UsageRepoTrait: Send + Sync {
    /// The period whose interval contains `at`, if one exists.
    async fn get_current_period(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<Option<UsagePeriod>>;

    /// Single atomic store-side operation: adds `delta` to the period containing
    /// `at`, or opens `[at, at + period_days)` when there is none.
    async fn increment_usage(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
        delta: i64,
        period_days: i32,
    ) -> AppResult<UsageSnapshot>;
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct UsageStatus {
    pub usage: i64,
    pub limit: i64,
    pub period: ThrottlingPeriod,
    pub is_premium: bool,
    pub allowed: bool,
}

/// Allow/deny decisions over a cache-first, store-authoritative usage ledger.
#[derive(Clone)]
pub struct UsageLedger {
    users: Arc<dyn UserRepoTrait>,
    usage: Arc<dyn UsageRepoTrait>,
    cache: Arc<dyn CacheStore>,
    throttling: ThrottlingConfig,
    non_premium_ttl: Duration,
}

impl UsageLedger {
    pub fn new(
        users: Arc<dyn UserRepoTrait>,
        usage: Arc<dyn UsageRepoTrait>,
        cache: Arc<dyn CacheStore>,
        throttling: ThrottlingConfig,
        non_premium_ttl: Duration,
    ) -> Self {
        Self {
            users,
            usage,
            cache,
            throttling,
            non_premium_ttl,
        }
    }

    /// Premium users always pass; everyone else while under the free-tier limit.
    #[instrument(skip(self))]
    pub async fn is_user_allowed(&self, user_id: Uuid) -> AppResult<bool> {
        let (premium, usage) =
            tokio::join!(self.is_user_premium(user_id), self.get_user_usage(user_id));

        if premium? {
            return Ok(true);
        }
        Ok(usage? < self.throttling.limit)
    }

    #[instrument(skip(self))]
    pub async fn usage_status(&self, user_id: Uuid) -> AppResult<UsageStatus> {
        let (premium, usage) =
            tokio::join!(self.is_user_premium(user_id), self.get_user_usage(user_id));
        let (is_premium, usage) = (premium?, usage?);

        Ok(UsageStatus {
            usage,
            limit: self.throttling.limit,
            period: self.throttling.period,
            is_premium,
            allowed: is_premium || usage < self.throttling.limit,
        })
    }

    #[instrument(skip(self))]
    pub async fn is_user_premium(&self, user_id: Uuid) -> AppResult<bool> {
        let key = premium_key(user_id);
        if let Some(raw) = self.cache_get(&key).await {
            match raw.as_str() {
                "true" => return Ok(true),
                "false" => return Ok(false),
                other => warn!(%user_id, value = other, "Unreadable premium cache entry"),
            }
        }

        let Some(user) = self.users.get_user(user_id).await? else {
            warn!(%user_id, "Premium check for unknown user");
            return Ok(false);
        };

        let now = Utc::now();
        let premium = user.is_entitled_at(now);
        let ttl = match (premium, user.premium_until) {
            (true, Some(until)) => {
                positive_ttl(until - now).map(|ttl| ttl.min(MAX_PREMIUM_CACHE_TTL))
            }
            _ => Some(self.non_premium_ttl),
        };

        if let Some(ttl) = ttl {
            self.cache_set(&key, if premium { "true" } else { "false" }, ttl)
                .await;
        }
        Ok(premium)
    }

    #[instrument(skip(self))]
    pub async fn get_user_usage(&self, user_id: Uuid) -> AppResult<i64> {
        let key = usage_key(user_id);
        if let Some(raw) = self.cache_get(&key).await {
            match raw.parse::<i64>() {
                Ok(usage) => return Ok(usage),
                Err(_) => warn!(%user_id, value = %raw, "Unreadable usage cache entry"),
            }
        }

        let now = Utc::now();
        let Some(period) = self.usage.get_current_period(user_id, now).await? else {
            // Nothing to cache until the next write opens a period.
            return Ok(0);
        };

        if let Some(ttl) = positive_ttl(period.time_to - now) {
            self.cache_raise(&key, period.usage, ttl).await;
        }
        Ok(period.usage)
    }

    /// Records consumption. The store's answer replaces any lower cached value.
    ///
    /// Usage only grows within a period, so a lower value is an older snapshot
    /// and must not overwrite a newer one written by a concurrent call.
    #[instrument(skip(self))]
    pub async fn update_user_usage(&self, user_id: Uuid, delta: i64) -> AppResult<UsageSnapshot> {
        let key = usage_key(user_id);
        let optimistic = match self.cache.incr(&key, delta).await {
            Ok(value) => value,
            Err(e) => {
                warn!(%user_id, error = %e, "Cache increment failed");
                None
            }
        };

        let now = Utc::now();
        let snapshot = match self
            .usage
            .increment_usage(user_id, now, delta, self.throttling.period.days())
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if optimistic.is_some()
                    && let Err(undo) = self.cache.incr(&key, -delta).await
                {
                    warn!(%user_id, error = %undo, "Failed to undo cache increment");
                }
                return Err(e);
            }
        };

        if let Some(cached) = optimistic
            && cached != snapshot.usage
        {
            warn!(
                %user_id,
                cached,
                stored = snapshot.usage,
                "Ledger drift between cache and store"
            );
        }

        if let Some(ttl) = positive_ttl(snapshot.remaining(now)) {
            self.cache_raise(&key, snapshot.usage, ttl).await;
        }
        Ok(snapshot)
    }

    /// Drops both cache entries and re-reads them from the store.
    #[instrument(skip(self))]
    pub async fn revalidate_user(&self, user_id: Uuid) -> AppResult<()> {
        for key in [premium_key(user_id), usage_key(user_id)] {
            if let Err(e) = self.cache.delete(&key).await {
                warn!(%user_id, key = %key, error = %e, "Cache delete failed");
            }
        }

        let premium = self.is_user_premium(user_id).await?;
        let usage = self.get_user_usage(user_id).await?;
        debug!(%user_id, premium, usage, "Revalidated ledger cache");
        Ok(())
    }

    async fn cache_get(&self, key: &str) -> Option<String> {
        match self.cache.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, falling back to store");
                None
            }
        }
    }

    async fn cache_raise(&self, key: &str, value: i64, ttl: Duration) {
        if let Err(e) = self.cache.raise(key, value, ttl).await {
            warn!(key, error = %e, "Cache write failed");
        }
    }

    async fn cache_set(&self, key: &str, value: &str, ttl: Duration) {
        if let Err(e) = self.cache.set(key, value, Some(ttl)).await {
            warn!(key, error = %e, "Cache write failed");
        }
    }
}

/// Converts a remaining interval into a cache TTL; elapsed intervals yield `None`.
fn positive_ttl(remaining: chrono::Duration) -> Option<Duration> {
    remaining
        .to_std()
        .ok()
        .filter(|ttl| ttl.as_millis() > 0)
}
