use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use shared_config::{AppConfig, RateLimitBackend};

use crate::clock::ManualClock;

pub struct TestConfig {
    pub max_appointment_duration_minutes: i64,
    pub trust_proxy_headers: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            max_appointment_duration_minutes: 24 * 60,
            trust_proxy_headers: false,
        }
    }
}

impl TestConfig {
    /// Key clients on `X-Forwarded-For`, as when running behind a proxy.
    pub fn behind_proxy() -> Self {
        Self {
            trust_proxy_headers: true,
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            rate_limit_backend: RateLimitBackend::Memory,
            redis_url: None,
            rate_limit_sweep_interval_secs: 60,
            max_appointment_duration_minutes: self.max_appointment_duration_minutes,
            trust_proxy_headers: self.trust_proxy_headers,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// 2025-06-20 at the given wall-clock time, UTC.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 20, hour, minute, 0)
        .single()
        .unwrap_or_else(|| panic!("invalid test time {}:{}", hour, minute))
}

pub fn test_clock() -> ManualClock {
    ManualClock::new(at(8, 0))
}
