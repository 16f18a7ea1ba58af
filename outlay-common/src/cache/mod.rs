use deadpool_redis::redis;
use deadpool_redis::{Config as RedisConfig, Connection, Pool, Runtime};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

pub type CachePool = Pool;

pub fn create_cache_pool(redis_uri: &str, max_connections: usize) -> CachePool {
    let mut config = RedisConfig::from_url(redis_uri);
    config.pool = Some(deadpool_redis::PoolConfig::new(max_connections));

    config
        .create_pool(Some(Runtime::Tokio1))
        .expect("Failed to create Redis pool")
}

#[derive(Debug)]
pub enum CacheError {
    PoolFailure(String),
    CommandFailed(String),
}

impl std::error::Error for CacheError {}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::PoolFailure(e) => {
                write!(f, "CacheError: Failed to obtain Redis connection: {e}")
            }
            CacheError::CommandFailed(e) => {
                write!(f, "CacheError: Redis command failed: {e}")
            }
        }
    }
}

/// Key builders for every ephemeral-secret concern. Nothing touches the cache
/// without going through one of these namespaces.
pub mod keys {
    use super::*;

    pub fn verification_token(token: &str) -> String {
        format!("verification_token:{token}")
    }

    pub fn verification_rate_limit(user_id: Uuid) -> String {
        format!("verification_rate_limit:{user_id}")
    }

    pub fn password_reset(token: &str) -> String {
        format!("password_reset:{token}")
    }

    pub fn password_reset_rate_limit(user_id: Uuid) -> String {
        format!("password_reset_rate_limit:{user_id}")
    }

    pub fn email_change(user_id: Uuid) -> String {
        format!("email_change:{user_id}")
    }

    pub fn staff_email_change(token: &str) -> String {
        format!("staff_email_change:{token}")
    }

    pub fn staff_email_change_rate_limit(user_id: Uuid) -> String {
        format!("staff_email_change_rate_limit:{user_id}")
    }
}

pub struct TokenCache {
    cache_pool: CachePool,
}

impl TokenCache {
    pub fn new(cache_pool: &CachePool) -> Self {
        Self {
            cache_pool: cache_pool.clone(),
        }
    }

    async fn conn(&self) -> Result<Connection, CacheError> {
        self.cache_pool
            .get()
            .await
            .map_err(|e| CacheError::PoolFailure(e.to_string()))
    }

    pub async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;

        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::CommandFailed(e.to_string()))
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn().await?;

        redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(|e| CacheError::CommandFailed(e.to_string()))
    }

    /// Atomic get-and-delete. This is the serialization point for single-use
    /// secrets; two concurrent consumers cannot both see a value.
    pub async fn take(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn().await?;

        redis::cmd("GETDEL")
            .arg(key)
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(|e| CacheError::CommandFailed(e.to_string()))
    }

    pub async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn().await?;

        redis::cmd("EXISTS")
            .arg(key)
            .query_async::<bool>(&mut conn)
            .await
            .map_err(|e| CacheError::CommandFailed(e.to_string()))
    }

    /// None when the key does not exist or carries no expiration.
    pub async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let mut conn = self.conn().await?;

        let ttl_secs = redis::cmd("TTL")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| CacheError::CommandFailed(e.to_string()))?;

        if ttl_secs < 0 {
            return Ok(None);
        }

        Ok(Some(Duration::from_secs(ttl_secs as u64)))
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;

        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::CommandFailed(e.to_string()))
    }

    /// Minutes a caller must wait before the rate-limited action may be
    /// retried, rounded up to the next whole minute. None when no rate limit
    /// is in effect.
    pub async fn minutes_until_allowed(&self, rate_limit_key: &str) -> Result<Option<u64>, CacheError> {
        match self.remaining_ttl(rate_limit_key).await? {
            Some(remaining) => Ok(Some(std::cmp::max(remaining.as_secs().div_ceil(60), 1))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use once_cell::sync::Lazy;

    use crate::threadrand::SecureRng;

    static CACHE_POOL: Lazy<CachePool> = Lazy::new(|| {
        let redis_uri = std::env::var("OUTLAY_REDIS_URI")
            .unwrap_or_else(|_| String::from("redis://127.0.0.1:6379"));
        create_cache_pool(&redis_uri, 8)
    });

    fn cache() -> TokenCache {
        TokenCache::new(&CACHE_POOL)
    }

    fn unique_key() -> String {
        format!("cache_test:{}", SecureRng::next_u128())
    }

    #[tokio::test]
    async fn test_put_get_exists_delete() {
        let cache = cache();
        let key = unique_key();

        assert!(!cache.exists(&key).await.unwrap());
        assert_eq!(cache.get(&key).await.unwrap(), None);

        cache
            .put(&key, "value", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(cache.exists(&key).await.unwrap());
        assert_eq!(cache.get(&key).await.unwrap(), Some(String::from("value")));

        cache.delete(&key).await.unwrap();
        assert!(!cache.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_take_is_single_use() {
        let cache = cache();
        let key = unique_key();

        cache
            .put(&key, "only-once", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            cache.take(&key).await.unwrap(),
            Some(String::from("only-once"))
        );
        assert_eq!(cache.take(&key).await.unwrap(), None);
        assert!(!cache.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_remaining_ttl() {
        let cache = cache();
        let key = unique_key();

        assert_eq!(cache.remaining_ttl(&key).await.unwrap(), None);

        cache
            .put(&key, "1", Duration::from_secs(600))
            .await
            .unwrap();

        let remaining = cache.remaining_ttl(&key).await.unwrap().unwrap();
        assert!(remaining.as_secs() > 590);
        assert!(remaining.as_secs() <= 600);

        cache.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_minutes_until_allowed_rounds_up() {
        let cache = cache();
        let key = unique_key();

        assert_eq!(cache.minutes_until_allowed(&key).await.unwrap(), None);

        cache
            .put(&key, "1", Duration::from_secs(600))
            .await
            .unwrap();

        // 600 seconds left rounds up to 10 minutes at most, and can never
        // report zero while the key exists
        let minutes = cache.minutes_until_allowed(&key).await.unwrap().unwrap();
        assert!(minutes >= 1);
        assert!(minutes <= 10);

        cache.delete(&key).await.unwrap();
    }
}
