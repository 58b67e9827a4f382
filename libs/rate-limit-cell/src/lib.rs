// =====================================================================================
// RATE LIMIT CELL - FIXED WINDOW ADMISSION CONTROL
// =====================================================================================
//
// This cell bounds the number of admitted operations per identifier:
// - Fixed-window counters keyed by "preset:client"
// - In-memory store for a single process, Redis store for a fleet
// - Periodic sweep of expired windows
// - Axum middleware that answers 429 with retry hints
//
// =====================================================================================

pub mod middleware;
pub mod models;
pub mod services;

pub use models::{
    RateLimitConfig, RateLimitEntry, RateLimitError, RateLimitPreset, RateLimitResult,
};

pub use services::{
    spawn_expiry_sweep, InMemoryRateLimitStore, RateLimitStore, RateLimiter,
    RedisRateLimitStore,
};

pub use middleware::{rate_limit_middleware, RateLimitState};
