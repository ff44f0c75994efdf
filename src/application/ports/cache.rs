use std::time::Duration;

use async_trait::async_trait;

use crate::app_error::AppResult;

/// Key/value cache with per-key TTL.
///
/// Callers treat every error as a cache miss; the store stays authoritative.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Writes `value`. `None` TTL keeps the entry until it is deleted.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()>;

    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Atomically adds `delta` to an existing integer entry, keeping its TTL.
    /// Returns `None` without creating anything when the key is absent.
    async fn incr(&self, key: &str, delta: i64) -> AppResult<Option<i64>>;

    /// Stores integer `value` with `ttl` unless the entry already holds a value
    /// at least as large. Unreadable entries are replaced.
    async fn raise(&self, key: &str, value: i64, ttl: Duration) -> AppResult<()>;
}
