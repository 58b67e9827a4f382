use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackend {
    Memory,
    Redis,
}

impl FromStr for RateLimitBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in_memory" | "in-memory" => Ok(RateLimitBackend::Memory),
            "redis" => Ok(RateLimitBackend::Redis),
            other => Err(format!("unknown rate limit backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub rate_limit_backend: RateLimitBackend,
    pub redis_url: Option<String>,
    pub rate_limit_sweep_interval_secs: u64,
    pub max_appointment_duration_minutes: i64,
    pub trust_proxy_headers: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 3000,
            rate_limit_backend: RateLimitBackend::Memory,
            redis_url: None,
            rate_limit_sweep_interval_secs: 60,
            max_appointment_duration_minutes: 24 * 60,
            trust_proxy_headers: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| {
                    warn!("SERVER_HOST not set, using default");
                    defaults.server_host.clone()
                }),
            server_port: parse_var("SERVER_PORT", defaults.server_port),
            rate_limit_backend: parse_var("RATE_LIMIT_BACKEND", defaults.rate_limit_backend),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            rate_limit_sweep_interval_secs: parse_var(
                "RATE_LIMIT_SWEEP_INTERVAL_SECS",
                defaults.rate_limit_sweep_interval_secs,
            ),
            max_appointment_duration_minutes: parse_var(
                "MAX_APPOINTMENT_DURATION_MINUTES",
                defaults.max_appointment_duration_minutes,
            ),
            trust_proxy_headers: parse_var("TRUST_PROXY_HEADERS", defaults.trust_proxy_headers),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - falling back to in-memory rate limiting");
        }

        config
    }

    /// A Redis backend without a URL cannot be honored.
    pub fn is_configured(&self) -> bool {
        match self.rate_limit_backend {
            RateLimitBackend::Memory => true,
            RateLimitBackend::Redis => self.redis_url.is_some(),
        }
    }

    pub fn uses_redis(&self) -> bool {
        self.rate_limit_backend == RateLimitBackend::Redis && self.redis_url.is_some()
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit_sweep_interval_secs.max(1))
    }

    pub fn max_appointment_duration(&self) -> chrono::Duration {
        chrono::Duration::try_minutes(self.max_appointment_duration_minutes.max(1))
            .unwrap_or_else(|| chrono::Duration::minutes(24 * 60))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {:?}", name, raw, default);
            default
        }),
        Err(_) => {
            warn!("{} not set, using default {:?}", name, default);
            default
        }
    }
}
