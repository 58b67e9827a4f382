// =====================================================================================
// RATE LIMIT STORES - PER-KEY WINDOW COUNTERS
// =====================================================================================

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{RateLimitEntry, RateLimitError};

/// Keyed window counters shared by every request handler in the process.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Open a new window when `key` is absent or its window has elapsed, then
    /// count one attempt. The reset and the increment happen as one step.
    async fn hit(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitEntry, RateLimitError>;

    /// Drop entries whose window has elapsed. Returns how many were removed.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, RateLimitError>;

    /// Keys currently held, if the store can tell cheaply.
    async fn tracked_keys(&self) -> Option<usize>;
}

#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    entries: RwLock<HashMap<String, RateLimitEntry>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<RateLimitEntry> {
        self.entries.read().await.get(key).cloned()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn hit(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitEntry, RateLimitError> {
        // The write guard is held across reset, increment and snapshot.
        let mut entries = self.entries.write().await;

        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| RateLimitEntry::new(now + window));

        if entry.is_expired(now) {
            *entry = RateLimitEntry::new(now + window);
        }

        entry.count = entry.count.saturating_add(1);

        Ok(entry.clone())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, RateLimitError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();

        entries.retain(|_, entry| !entry.is_expired(now));

        let removed = before - entries.len();
        if removed > 0 {
            debug!("Swept {} expired rate limit entries, {} remain", removed, entries.len());
        }

        Ok(removed)
    }

    async fn tracked_keys(&self) -> Option<usize> {
        Some(self.entries.read().await.len())
    }
}
