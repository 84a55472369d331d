//! Worker configuration assembled from the environment.

use core_config::{ConfigError, Environment, FromEnv, env_parse};
use database::common::RetryConfig;
use database::postgres::PostgresConfig;
use mqtt_worker::{DispatchConfig, MqttConfig};

pub const DEFAULT_HEALTH_PORT: u16 = 8083;

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub environment: Environment,
    pub mqtt: MqttConfig,
    pub dispatch: DispatchConfig,
    pub postgres: PostgresConfig,
    pub store_retry: RetryConfig,
    pub health_port: u16,
}

/// Every setting is validated here so a bad value stops the process before
/// any connection is attempted.
impl FromEnv for IngestConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            environment: Environment::from_env(),
            mqtt: MqttConfig::from_env()?,
            dispatch: DispatchConfig::from_env()?,
            postgres: PostgresConfig::from_env()?,
            store_retry: store_retry_from_env()?,
            health_port: env_parse("HEALTH_PORT", DEFAULT_HEALTH_PORT)?,
        })
    }
}

/// Environment variables:
/// - `STORE_MAX_RETRIES` (default: 3)
/// - `STORE_RETRY_INITIAL_MS` (default: 100)
/// - `STORE_RETRY_MAX_MS` (default: 5000)
fn store_retry_from_env() -> Result<RetryConfig, ConfigError> {
    let defaults = RetryConfig::default();
    let initial_delay_ms = env_parse("STORE_RETRY_INITIAL_MS", defaults.initial_delay_ms)?;
    let max_delay_ms = env_parse("STORE_RETRY_MAX_MS", defaults.max_delay_ms)?;
    if max_delay_ms < initial_delay_ms {
        return Err(ConfigError::invalid(
            "STORE_RETRY_MAX_MS",
            "must not be below STORE_RETRY_INITIAL_MS",
        ));
    }

    Ok(RetryConfig::new()
        .with_max_retries(env_parse("STORE_MAX_RETRIES", defaults.max_retries)?)
        .with_initial_delay(initial_delay_ms)
        .with_max_delay(max_delay_ms))
}
