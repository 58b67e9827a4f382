// =====================================================================================
// REDIS RATE LIMIT STORE - SHARED COUNTERS ACROSS INSTANCES
// =====================================================================================

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::Script;
use tracing::{debug, info};

use crate::models::{RateLimitEntry, RateLimitError};
use crate::services::store::RateLimitStore;

const KEY_PREFIX: &str = "rate_limit:";

// INCR and the first PEXPIRE run inside one script so that two instances
// can never both open a window for the same key.
const HIT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#;

pub struct RedisRateLimitStore {
    pool: Pool,
    script: Script,
}

impl RedisRateLimitStore {
    pub async fn new(redis_url: &str) -> Result<Self, RateLimitError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            RateLimitError::StoreUnavailable(format!("Failed to create Redis pool: {}", e))
        })?;

        let store = Self {
            pool,
            script: Script::new(HIT_SCRIPT),
        };

        let mut conn = store.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis rate limit store initialized successfully");

        Ok(store)
    }

    async fn get_connection(&self) -> Result<Connection, RateLimitError> {
        self.pool.get().await.map_err(|e| {
            RateLimitError::StoreUnavailable(format!("Failed to connect to Redis: {}", e))
        })
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn hit(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitEntry, RateLimitError> {
        let mut conn = self.get_connection().await?;
        let window_ms = window.num_milliseconds().max(1);

        let (count, ttl_ms): (i64, i64) = self
            .script
            .key(format!("{}{}", KEY_PREFIX, key))
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await?;

        debug!("Redis rate limit hit for {}: count={} ttl_ms={}", key, count, ttl_ms);

        Ok(RateLimitEntry {
            count: u32::try_from(count).unwrap_or(u32::MAX),
            reset_time: now + Duration::milliseconds(ttl_ms.max(0)),
        })
    }

    async fn sweep_expired(&self, _now: DateTime<Utc>) -> Result<usize, RateLimitError> {
        // Key expiry is handled by Redis itself.
        Ok(0)
    }

    async fn tracked_keys(&self) -> Option<usize> {
        None
    }
}
