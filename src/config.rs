use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_POOL_MAX_SIZE: u32 = 10;

pub(crate) struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub pool_max_size: u32,
    pub breaker: BreakerConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BreakerConfig {
    /// Storage faults in a row before calls are rejected.
    pub consecutive_failures: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            consecutive_failures: 3,
            backoff_min: Duration::from_secs(10),
            backoff_max: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub(crate) fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = BreakerConfig::default();

        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let host = lookup("BIND_HOST").unwrap_or_else(|| {
            log::info!("BIND_HOST not set, using default: {DEFAULT_HOST}");
            DEFAULT_HOST.to_string()
        });
        let port = try_load(&lookup, "BIND_PORT", DEFAULT_PORT)?;
        let pool_max_size = try_load(&lookup, "DB_POOL_MAX_SIZE", DEFAULT_POOL_MAX_SIZE)?;

        let breaker = BreakerConfig {
            consecutive_failures: try_load(
                &lookup,
                "BREAKER_CONSECUTIVE_FAILURES",
                defaults.consecutive_failures,
            )?,
            backoff_min: Duration::from_secs(try_load(
                &lookup,
                "BREAKER_BACKOFF_MIN_SECS",
                defaults.backoff_min.as_secs(),
            )?),
            backoff_max: Duration::from_secs(try_load(
                &lookup,
                "BREAKER_BACKOFF_MAX_SECS",
                defaults.backoff_max.as_secs(),
            )?),
        };

        if pool_max_size == 0 {
            return Err(ConfigError::Invalid {
                key: "DB_POOL_MAX_SIZE",
                value: pool_max_size.to_string(),
                reason: "pool needs at least one connection".to_string(),
            });
        }
        if breaker.consecutive_failures == 0 {
            return Err(ConfigError::Invalid {
                key: "BREAKER_CONSECUTIVE_FAILURES",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if breaker.backoff_min > breaker.backoff_max {
            return Err(ConfigError::Invalid {
                key: "BREAKER_BACKOFF_MIN_SECS",
                value: breaker.backoff_min.as_secs().to_string(),
                reason: "must not exceed BREAKER_BACKOFF_MAX_SECS".to_string(),
            });
        }

        Ok(Self {
            database_url,
            host,
            port,
            pool_max_size,
            breaker,
        })
    }
}

fn try_load<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => {
            log::info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
