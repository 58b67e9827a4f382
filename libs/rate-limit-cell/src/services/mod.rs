pub mod limiter;
pub mod redis_store;
pub mod store;

pub use limiter::{spawn_expiry_sweep, RateLimiter};
pub use redis_store::RedisRateLimitStore;
pub use store::{InMemoryRateLimitStore, RateLimitStore};
