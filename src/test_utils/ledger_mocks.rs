//! In-memory mocks for users, usage periods and the cache.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::cache::CacheStore,
        use_cases::{usage_ledger::UsageRepoTrait, user::UserRepoTrait},
    },
    domain::entities::{
        usage::{UsagePeriod, UsageSnapshot},
        user::{BillingUpdate, Tier, User},
    },
};

// ============================================================================
// InMemoryUserRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryUserRepo {
    pub users: Mutex<HashMap<Uuid, User>>,
    billing_writes: AtomicUsize,
}

impl InMemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: Vec<User>) -> Self {
        Self {
            users: Mutex::new(users.into_iter().map(|u| (u.id, u)).collect()),
            billing_writes: AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, user: User) {
        self.users.lock().unwrap().insert(user.id, user);
    }

    pub fn get(&self, user_id: Uuid) -> Option<User> {
        self.users.lock().unwrap().get(&user_id).cloned()
    }

    /// Number of billing writes that reached the repo.
    pub fn billing_writes(&self) -> usize {
        self.billing_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserRepoTrait for InMemoryUserRepo {
    async fn get_user(&self, user_id: Uuid) -> AppResult<Option<User>> {
        Ok(self.get(user_id))
    }

    async fn create_user(&self, user_id: Uuid, email: &str) -> AppResult<User> {
        let mut users = self.users.lock().unwrap();
        let now = Utc::now();
        let user = users.entry(user_id).or_insert_with(|| User {
            id: user_id,
            email: email.to_string(),
            tier: Tier::Free,
            is_premium: false,
            premium_until: None,
            provider_customer_id: None,
            subscription_id: None,
            variant_id: None,
            created_at: Some(now),
            updated_at: Some(now),
        });
        Ok(user.clone())
    }

    async fn update_billing(&self, user_id: Uuid, update: &BillingUpdate) -> AppResult<User> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(&user_id).ok_or(AppError::NotFound)?;
        update.apply_to(user);
        user.updated_at = Some(Utc::now());
        self.billing_writes.fetch_add(1, Ordering::SeqCst);
        Ok(user.clone())
    }

    async fn set_premium_until(
        &self,
        user_id: Uuid,
        premium_until: DateTime<Utc>,
    ) -> AppResult<User> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(&user_id).ok_or(AppError::NotFound)?;
        user.premium_until = Some(premium_until);
        user.updated_at = Some(Utc::now());
        self.billing_writes.fetch_add(1, Ordering::SeqCst);
        Ok(user.clone())
    }

    async fn get_user_by_provider_customer_id(
        &self,
        customer_id: i64,
    ) -> AppResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.provider_customer_id == Some(customer_id))
            .cloned())
    }
}

// ============================================================================
// InMemoryUsageRepo
// ============================================================================

/// Increments run under one lock, matching the store's single-statement upsert.
#[derive(Default)]
pub struct InMemoryUsageRepo {
    periods: Mutex<Vec<UsagePeriod>>,
}

impl InMemoryUsageRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, period: UsagePeriod) {
        self.periods.lock().unwrap().push(period);
    }

    pub fn periods_for(&self, user_id: Uuid) -> Vec<UsagePeriod> {
        self.periods
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl UsageRepoTrait for InMemoryUsageRepo {
    async fn get_current_period(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<Option<UsagePeriod>> {
        Ok(self
            .periods
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.user_id == user_id && p.contains(at))
            .cloned())
    }

    async fn increment_usage(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
        delta: i64,
        period_days: i32,
    ) -> AppResult<UsageSnapshot> {
        let mut periods = self.periods.lock().unwrap();
        if let Some(period) = periods
            .iter_mut()
            .find(|p| p.user_id == user_id && p.contains(at))
        {
            period.usage += delta;
            return Ok(UsageSnapshot {
                usage: period.usage,
                time_to: period.time_to,
            });
        }

        let period = UsagePeriod {
            id: Uuid::new_v4(),
            user_id,
            time_from: at,
            time_to: at + chrono::Duration::days(i64::from(period_days)),
            usage: delta,
        };
        let snapshot = UsageSnapshot {
            usage: period.usage,
            time_to: period.time_to,
        };
        periods.push(period);
        Ok(snapshot)
    }
}

// ============================================================================
// InMemoryCache
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: String,
    pub ttl: Option<Duration>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self) -> bool {
        self.expires_at.is_none_or(|at| at > Instant::now())
    }
}

/// Expiring key/value map. `set_failing(true)` makes every call error.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    failing: AtomicBool,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entry under `key`, bypassing the failure switch.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .filter(|e| e.is_live())
            .cloned()
    }

    /// Stores `value` without expiry.
    pub fn seed(&self, key: &str, value: &str) {
        self.entries.lock().unwrap().insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                ttl: None,
                expires_at: None,
            },
        );
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Internal("cache unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.check()?;
        Ok(self.entry(key).map(|e| e.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        self.check()?;
        self.entries.lock().unwrap().insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                ttl,
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.check()?;
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, delta: i64) -> AppResult<Option<i64>> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(key).filter(|e| e.is_live()) else {
            return Ok(None);
        };
        let current: i64 = entry
            .value
            .parse()
            .map_err(|_| AppError::Internal(format!("{key} is not an integer")))?;
        entry.value = (current + delta).to_string();
        Ok(Some(current + delta))
    }

    async fn raise(&self, key: &str, value: i64, ttl: Duration) -> AppResult<()> {
        self.check()?;
        let mut entries = self.entries.lock().unwrap();
        let current = entries
            .get(key)
            .filter(|e| e.is_live())
            .and_then(|e| e.value.parse::<i64>().ok());
        if current.is_some_and(|current| current >= value) {
            return Ok(());
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                ttl: Some(ttl),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }
}
