use reqwest::Url;
use std::{env, fmt::Display, str::FromStr};
use tracing::{info, warn};

use crate::api::ClientError;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    // Room detail lookups allowed in flight while loading bookings
    pub max_concurrent_lookups: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: 10_000,
            max_concurrent_lookups: 8,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    // Same as `from_env` with an injectable variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let defaults = Self::default();
        let config = Self {
            base_url: try_load(&lookup, "BOOKING_API_URL", defaults.base_url)?,
            timeout_ms: try_load(&lookup, "BOOKING_TIMEOUT_MS", defaults.timeout_ms)?,
            max_concurrent_lookups: try_load(
                &lookup,
                "BOOKING_MAX_LOOKUPS",
                defaults.max_concurrent_lookups,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        Url::parse(&self.base_url).map_err(|e| {
            ClientError::ConfigError(format!("invalid base url {:?}: {}", self.base_url, e))
        })?;
        if self.timeout_ms == 0 {
            return Err(ClientError::ConfigError(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_lookups == 0 {
            return Err(ClientError::ConfigError(
                "max_concurrent_lookups must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn try_load<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ClientError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|e| {
            warn!("Invalid {key} value: {e}");
            ClientError::ConfigError(format!("invalid {}={:?}: {}", key, value, e))
        }),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
