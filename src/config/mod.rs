use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::services::risk_score::RiskWeights;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    /// Default for `use_ssl` when a request leaves it out.
    pub ad_use_ssl: bool,
    pub connect_timeout_secs: u64,
    pub scan_timeout_secs: u64,
    pub stale_sweep_interval_secs: u64,
    pub risk_weights: RiskWeights,
}

/// Configuration that parsed but cannot be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid risk weights: {0}")]
    RiskWeights(String),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = RiskWeights::default();
        let risk_weights = RiskWeights {
            critical: parse_or("RISK_WEIGHT_CRITICAL", defaults.critical),
            high: parse_or("RISK_WEIGHT_HIGH", defaults.high),
            medium: parse_or("RISK_WEIGHT_MEDIUM", defaults.medium),
            low: parse_or("RISK_WEIGHT_LOW", defaults.low),
        };
        risk_weights.validate().map_err(ConfigError::RiskWeights)?;

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://adsecurecheck.db?mode=rwc".to_string()),
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5),
            host: env::var("BACKEND_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_or("BACKEND_PORT", 5000),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            ad_use_ssl: env::var("AD_USE_SSL")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(true),
            connect_timeout_secs: parse_or("CONNECT_TIMEOUT_SECS", 10),
            scan_timeout_secs: parse_or("SCAN_TIMEOUT_SECS", 900),
            stale_sweep_interval_secs: parse_or("STALE_SWEEP_INTERVAL_SECS", 60),
            risk_weights,
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn stale_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.stale_sweep_interval_secs.max(1))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            database_max_connections: 1,
            host: "127.0.0.1".to_string(),
            port: 5000,
            frontend_url: "http://localhost:3000".to_string(),
            ad_use_ssl: true,
            connect_timeout_secs: 10,
            scan_timeout_secs: 900,
            stale_sweep_interval_secs: 60,
            risk_weights: RiskWeights::default(),
        }
    }
}

/// Read and parse an environment variable, falling back to `default` when unset or malformed.
fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
