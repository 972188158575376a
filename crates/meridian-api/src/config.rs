//! Environment configuration for the API server.

use std::str::FromStr;
use std::time::Duration;

use meridian_dispatch::{BackoffPolicy, DeliveryMode, DispatcherConfig};

use crate::error::AppError;

/// Runtime configuration read from the environment at startup.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// PostgreSQL connection string. Required.
    pub database_url: String,
    /// Bind host. Defaults to `0.0.0.0`.
    pub host: String,
    /// Bind port. Defaults to `3000`.
    pub port: u16,
    /// How deliveries leave the process. Defaults to `http`; set
    /// `DELIVERY_MODE=noop` for standalone operation.
    pub delivery_mode: DeliveryMode,
    /// Per-attempt webhook timeout.
    pub delivery_timeout: Duration,
    /// Dispatcher tuning.
    pub dispatcher: DispatcherConfig,
}

fn env_or<T: FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{name} has an invalid value: {raw}"))),
        Err(_) => Ok(default),
    }
}

impl ApiConfig {
    /// Reads the configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is unset or any
    /// variable fails to parse.
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL environment variable must be set".into()))?;

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = env_or("PORT", 3000)?;
        let delivery_mode = match std::env::var("DELIVERY_MODE") {
            Ok(raw) => raw.parse().map_err(AppError::Config)?,
            Err(_) => DeliveryMode::Http,
        };
        let delivery_timeout = Duration::from_millis(env_or("DELIVERY_TIMEOUT_MS", 10_000)?);

        let dispatcher = DispatcherConfig {
            worker_count: env_or("DISPATCH_WORKERS", 2)?,
            poll_interval: Duration::from_millis(env_or("DISPATCH_POLL_MS", 500)?),
            backoff: BackoffPolicy {
                base: Duration::from_millis(env_or("RETRY_BASE_MS", 1_000)?),
                max: Duration::from_millis(env_or("RETRY_MAX_MS", 60_000)?),
                ..BackoffPolicy::default()
            },
            ..DispatcherConfig::default()
        };

        Ok(Self {
            database_url,
            host,
            port,
            delivery_mode,
            delivery_timeout,
            dispatcher,
        })
    }
}
