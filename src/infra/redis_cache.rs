use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Script, aio::ConnectionManager};

use super::error::InfraError;
use crate::{
    app_error::{AppError, AppResult},
    application::ports::cache::CacheStore,
};

/// Lua script for an increment that never creates the key.
/// INCRBY keeps the existing TTL; a missing key yields nil.
const INCR_IF_EXISTS_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return redis.call('INCRBY', KEYS[1], ARGV[1])
end
return false
"#;

/// Lua script for a write that never lowers an integer entry.
/// A missing or non-numeric value is overwritten.
const RAISE_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]))
if current and current >= tonumber(ARGV[1]) then
    return 0
end
redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
return 1
"#;

/// Redis-backed cache for the usage ledger.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
    incr_script: Script,
    raise_script: Script,
}

impl RedisCache {
    pub async fn new(redis_url: &str) -> Result<Self, InfraError> {
        let client = redis::Client::open(redis_url).map_err(InfraError::RedisConnection)?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(InfraError::RedisConnection)?;
        Ok(Self {
            manager,
            incr_script: Script::new(INCR_IF_EXISTS_SCRIPT),
            raise_script: Script::new(RAISE_SCRIPT),
        })
    }
}

/// PX 0 is rejected by Redis.
fn ttl_millis(ttl: Duration) -> u64 {
    ttl.as_millis().max(1) as u64
}

fn cache_error(e: redis::RedisError) -> AppError {
    AppError::Internal(format!("Cache error: {e}"))
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.manager.clone();
        conn.get(key).await.map_err(cache_error)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        cmd.query_async::<_, ()>(&mut conn)
            .await
            .map_err(cache_error)
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key).await.map_err(cache_error)
    }

    async fn incr(&self, key: &str, delta: i64) -> AppResult<Option<i64>> {
        let mut conn = self.manager.clone();
        self.incr_script
            .key(key)
            .arg(delta)
            .invoke_async(&mut conn)
            .await
            .map_err(cache_error)
    }

    async fn raise(&self, key: &str, value: i64, ttl: Duration) -> AppResult<()> {
        let mut conn = self.manager.clone();
        self.raise_script
            .key(key)
            .arg(value)
            .arg(ttl_millis(ttl))
            .invoke_async::<_, i64>(&mut conn)
            .await
            .map(|_| ())
            .map_err(cache_error)
    }
}
