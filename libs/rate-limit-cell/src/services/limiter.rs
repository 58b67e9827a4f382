// =====================================================================================
// RATE LIMITER SERVICE - ADMISSION DECISIONS
// =====================================================================================

use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use shared_config::AppConfig;
use shared_utils::clock::{Clock, SystemClock};

use crate::models::{RateLimitConfig, RateLimitError, RateLimitPreset, RateLimitResult};
use crate::services::redis_store::RedisRateLimitStore;
use crate::services::store::{InMemoryRateLimitStore, RateLimitStore};

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryRateLimitStore::new()), Arc::new(SystemClock))
    }

    /// Pick the backing store from configuration. A Redis backend that cannot
    /// be reached at startup is an error rather than a silent downgrade.
    pub async fn from_config(config: &AppConfig) -> Result<Self, RateLimitError> {
        match config.redis_url.as_deref().filter(|_| config.uses_redis()) {
            Some(url) => {
                let store = RedisRateLimitStore::new(url).await?;
                info!("Rate limiting backed by Redis");
                Ok(Self::new(Arc::new(store), Arc::new(SystemClock)))
            }
            None => {
                info!("Rate limiting backed by in-process memory");
                Ok(Self::in_memory())
            }
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Record one attempt for `identifier` and decide whether it is admitted.
    ///
    /// The attempt is counted even when it is rejected. An error only comes
    /// back when the backing store itself is unreachable.
    #[instrument(skip(self, config))]
    pub async fn check(
        &self,
        identifier: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, RateLimitError> {
        let now = self.clock.now();
        let entry = self.store.hit(identifier, config.window(), now).await?;
        let result = RateLimitResult::from_entry(&entry, config);

        if result.success {
            debug!(
                "Admitted {} ({} of {} in window)",
                identifier, entry.count, result.limit
            );
        } else {
            warn!(
                "Rate limit exceeded for {} - {} attempts against limit {}",
                identifier, entry.count, result.limit
            );
        }

        Ok(result)
    }

    pub async fn check_preset(
        &self,
        preset: RateLimitPreset,
        client: &str,
    ) -> Result<RateLimitResult, RateLimitError> {
        self.check(&preset.key_for(client), &preset.config()).await
    }

    pub async fn sweep_expired(&self) -> Result<usize, RateLimitError> {
        self.store.sweep_expired(self.clock.now()).await
    }

    pub async fn tracked_keys(&self) -> Option<usize> {
        self.store.tracked_keys().await
    }
}

/// Periodically drop expired windows. Abort the handle to stop it.
pub fn spawn_expiry_sweep(limiter: Arc<RateLimiter>, every: StdDuration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match limiter.sweep_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!("Rate limit sweep removed {} entries", removed),
                Err(e) => error!("Rate limit sweep failed: {}", e),
            }
        }
    })
}
