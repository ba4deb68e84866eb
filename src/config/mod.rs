use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_FEED_URL: &str = "https://nationalbank.kz/rss/get_rates.cfm";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub server_host: String,
    pub server_port: u16,
    pub limiter: LimiterConfig,
    pub feed_url: String,
    pub request_timeout_secs: u64,
    pub worker_count: usize,
    pub worker_queue_capacity: usize,
}

/// Token bucket settings applied to every client identity.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    pub enabled: bool,
    pub rps: f64,
    pub burst: u32,
    pub sweep_interval_secs: u64,
    pub stale_after_secs: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rps: 2.0,
            burst: 4,
            sweep_interval_secs: 60,
            stale_after_secs: 180,
        }
    }
}

impl LimiterConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let defaults = LimiterConfig::default();
        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 10),
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            server_port: parse_or("SERVER_PORT", 8080),
            limiter: LimiterConfig {
                enabled: parse_or("LIMITER_ENABLED", defaults.enabled),
                rps: parse_or("LIMITER_RPS", defaults.rps),
                burst: parse_or("LIMITER_BURST", defaults.burst),
                sweep_interval_secs: parse_or(
                    "LIMITER_SWEEP_INTERVAL",
                    defaults.sweep_interval_secs,
                ),
                stale_after_secs: parse_or("LIMITER_STALE_AFTER", defaults.stale_after_secs),
            },
            feed_url: env::var("FEED_URL").unwrap_or_else(|_| DEFAULT_FEED_URL.into()),
            request_timeout_secs: parse_or("HTTP_REQUEST_TIMEOUT", 10),
            worker_count: parse_or("WORKER_COUNT", 4),
            worker_queue_capacity: parse_or("WORKER_QUEUE_CAPACITY", 64),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid value for {}: {:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
