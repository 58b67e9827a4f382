// =====================================================================================
// RATE LIMIT MODELS
// =====================================================================================

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ==============================================================================
// CONFIGURATION
// ==============================================================================

/// Window length and admission budget. Only constructible through `new`, so a
/// zero window or zero limit is rejected before any check runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    window: Duration,
    max_requests: u32,
}

impl RateLimitConfig {
    pub fn new(window: Duration, max_requests: u32) -> Result<Self, RateLimitError> {
        if window <= Duration::zero() {
            return Err(RateLimitError::InvalidConfig(format!(
                "window must be positive, got {}ms",
                window.num_milliseconds()
            )));
        }
        if max_requests == 0 {
            return Err(RateLimitError::InvalidConfig(
                "max_requests must be at least 1".to_string(),
            ));
        }

        Ok(Self { window, max_requests })
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }
}

/// Per operation class policy. The numbers are policy, not invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitPreset {
    Auth,
    Registration,
    Booking,
    Api,
    Public,
}

impl RateLimitPreset {
    pub fn config(&self) -> RateLimitConfig {
        let (window, max_requests) = match self {
            RateLimitPreset::Auth => (Duration::minutes(15), 5),
            RateLimitPreset::Registration => (Duration::hours(1), 3),
            RateLimitPreset::Booking => (Duration::minutes(1), 10),
            RateLimitPreset::Api => (Duration::minutes(1), 100),
            RateLimitPreset::Public => (Duration::minutes(1), 300),
        };

        RateLimitConfig { window, max_requests }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitPreset::Auth => "auth",
            RateLimitPreset::Registration => "registration",
            RateLimitPreset::Booking => "booking",
            RateLimitPreset::Api => "api",
            RateLimitPreset::Public => "public",
        }
    }

    pub fn key_for(&self, client: &str) -> String {
        format!("{}:{}", self.as_str(), client)
    }
}

impl fmt::Display for RateLimitPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==============================================================================
// STATE AND RESULTS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_time: DateTime<Utc>,
}

impl RateLimitEntry {
    pub fn new(reset_time: DateTime<Utc>) -> Self {
        Self { count: 0, reset_time }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_time
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitResult {
    pub success: bool,
    pub remaining: u32,
    pub reset_time: DateTime<Utc>,
    pub limit: u32,
}

impl RateLimitResult {
    pub fn from_entry(entry: &RateLimitEntry, config: &RateLimitConfig) -> Self {
        let limit = config.max_requests();

        Self {
            success: entry.count <= limit,
            remaining: limit.saturating_sub(entry.count),
            reset_time: entry.reset_time,
            limit,
        }
    }

    /// Whole seconds until the window resets, never less than one.
    pub fn retry_after_seconds(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_time - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000).max(1)
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("Invalid rate limit configuration: {0}")]
    InvalidConfig(String),

    #[error("Rate limit store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}
