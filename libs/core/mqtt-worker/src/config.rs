//! Broker, reconnect and dispatch configuration.

use crate::error::MqttError;
use core_config::{ConfigError, FromEnv, env_optional, env_or_default, env_parse, env_parse_optional};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Topics subscribed when `MQTT_TOPICS` is not set.
pub const DEFAULT_TOPICS: &[&str] = &[
    "sensor/DHT11/humidity",
    "sensor/DHT11/temperature",
    "sensor/Ultrasonic/distance",
    "sensor/Soil Moisture/moisture",
];

/// Smallest non-zero keep-alive the client accepts.
pub const MIN_KEEP_ALIVE_SECS: u64 = 5;

/// Default cap on a single MQTT packet, in either direction.
pub const DEFAULT_MAX_PACKET_BYTES: usize = 1024 * 1024;

/// Largest packet the MQTT wire format can encode (remaining length limit).
pub const MQTT_MAX_PACKET_BYTES: usize = 268_435_455;

/// MQTT delivery guarantee requested on subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    AtMostOnce,
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

impl QoS {
    pub fn as_u8(&self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

impl fmt::Display for QoS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

impl FromStr for QoS {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "at_most_once" => Ok(QoS::AtMostOnce),
            "1" | "at_least_once" => Ok(QoS::AtLeastOnce),
            "2" | "exactly_once" => Ok(QoS::ExactlyOnce),
            other => Err(format!("unknown QoS level '{}', expected 0, 1 or 2", other)),
        }
    }
}

/// Backoff between failed connection attempts.
///
/// Retries are unbounded unless `max_attempts` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Delay after the `failures`-th consecutive failed attempt (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(32) as i32;
        let delay = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }

    pub fn is_exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

/// Broker connection and subscription settings.
#[derive(Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub keep_alive_secs: u64,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub clean_session: bool,
    pub qos: QoS,
    pub topics: Vec<String>,
    pub reconnect: ReconnectPolicy,

    /// Packets larger than this fail the connection, so it must exceed any payload a sensor sends
    pub max_packet_bytes: usize,
}

impl MqttConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            keep_alive_secs: 60,
            client_id: generate_client_id(),
            username: None,
            password: None,
            clean_session: true,
            qos: QoS::default(),
            topics: DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
            reconnect: ReconnectPolicy::default(),
            max_packet_bytes: DEFAULT_MAX_PACKET_BYTES,
        }
    }

    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_keep_alive(mut self, secs: u64) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_max_packet_bytes(mut self, bytes: usize) -> Self {
        self.max_packet_bytes = bytes;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject settings that can never produce a working connection.
    pub fn validate(&self) -> Result<(), MqttError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(MqttError::config("broker host is empty"));
        }
        if host.contains("://") {
            return Err(MqttError::config(format!(
                "broker host '{}' must be a bare host name, not a URL",
                host
            )));
        }
        if host.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(MqttError::config(format!("broker host '{}' is malformed", host)));
        }
        if self.port == 0 {
            return Err(MqttError::config("broker port must be between 1 and 65535"));
        }
        if self.keep_alive_secs != 0 && self.keep_alive_secs < MIN_KEEP_ALIVE_SECS {
            return Err(MqttError::config(format!(
                "keep-alive must be 0 or at least {} seconds, got {}",
                MIN_KEEP_ALIVE_SECS, self.keep_alive_secs
            )));
        }
        if self.client_id.trim().is_empty() {
            return Err(MqttError::config("client id is empty"));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(MqttError::config("a password was given without a username"));
        }
        if self.topics.iter().all(|t| t.trim().is_empty()) {
            return Err(MqttError::config("no topics to subscribe to"));
        }
        if self.max_packet_bytes < 1024 || self.max_packet_bytes > MQTT_MAX_PACKET_BYTES {
            return Err(MqttError::config(format!(
                "max packet size must be between 1024 and {} bytes, got {}",
                MQTT_MAX_PACKET_BYTES, self.max_packet_bytes
            )));
        }
        if self.reconnect.initial_delay_ms == 0 || self.reconnect.multiplier < 1.0 {
            return Err(MqttError::config(
                "reconnect delay must be positive with a multiplier of at least 1",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("keep_alive_secs", &self.keep_alive_secs)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("clean_session", &self.clean_session)
            .field("qos", &self.qos)
            .field("topics", &self.topics)
            .field("reconnect", &self.reconnect)
            .field("max_packet_bytes", &self.max_packet_bytes)
            .finish()
    }
}

/// Environment variables:
/// - `MQTT_HOST` (default: localhost), `MQTT_PORT` (default: 1883)
/// - `MQTT_KEEP_ALIVE_SECS` (default: 60)
/// - `MQTT_CLIENT_ID` (default: generated)
/// - `MQTT_USERNAME`, `MQTT_PASSWORD` (optional)
/// - `MQTT_CLEAN_SESSION` (default: true), `MQTT_QOS` (default: 1)
/// - `MQTT_TOPICS` (comma separated, default: [`DEFAULT_TOPICS`])
/// - `MQTT_RECONNECT_INITIAL_MS`, `MQTT_RECONNECT_MAX_MS`, `MQTT_MAX_RECONNECT_ATTEMPTS`
/// - `MQTT_MAX_PACKET_BYTES` (default: 1 MiB)
impl FromEnv for MqttConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = ReconnectPolicy::default();
        let host = env_or_default("MQTT_HOST", "localhost");
        let port = env_parse("MQTT_PORT", 1883u16)?;

        let mut config = MqttConfig::new(host, port);
        config.keep_alive_secs = env_parse("MQTT_KEEP_ALIVE_SECS", config.keep_alive_secs)?;
        if let Some(client_id) = env_optional("MQTT_CLIENT_ID") {
            config.client_id = client_id;
        }
        config.username = env_optional("MQTT_USERNAME");
        config.password = env_optional("MQTT_PASSWORD");
        config.clean_session = env_parse("MQTT_CLEAN_SESSION", true)?;
        config.qos = env_parse("MQTT_QOS", QoS::default())?;
        if let Some(raw) = env_optional("MQTT_TOPICS") {
            config.topics = parse_topic_list(&raw);
        }
        config.reconnect = ReconnectPolicy {
            initial_delay_ms: env_parse("MQTT_RECONNECT_INITIAL_MS", defaults.initial_delay_ms)?,
            max_delay_ms: env_parse("MQTT_RECONNECT_MAX_MS", defaults.max_delay_ms)?,
            max_attempts: env_parse_optional("MQTT_MAX_RECONNECT_ATTEMPTS")?,
            ..defaults
        };
        config.max_packet_bytes = env_parse("MQTT_MAX_PACKET_BYTES", config.max_packet_bytes)?;

        config
            .validate()
            .map_err(|e| ConfigError::invalid("MQTT", e.to_string()))?;
        Ok(config)
    }
}

/// Split a comma separated topic list. Topic names may contain spaces
/// (`sensor/Soil Moisture/moisture`), so only surrounding whitespace is trimmed.
pub fn parse_topic_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn generate_client_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("telemetry-ingest-{}", &suffix[..8])
}

/// Worker pool settings for the ingestion loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Number of shard workers; a topic always maps to the same shard
    pub workers: usize,

    /// Bounded queue length per shard
    pub queue_capacity: usize,
}

impl DispatchConfig {
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        Self {
            workers: workers.max(1),
            queue_capacity: queue_capacity.max(1),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::new(1, 64)
    }
}

/// Environment variables: `INGEST_WORKERS` (default: 1), `INGEST_QUEUE_CAPACITY` (default: 64)
impl FromEnv for DispatchConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let workers: usize = env_parse("INGEST_WORKERS", 1)?;
        let queue_capacity: usize = env_parse("INGEST_QUEUE_CAPACITY", 64)?;
        if workers == 0 {
            return Err(ConfigError::invalid("INGEST_WORKERS", "must be at least 1"));
        }
        if queue_capacity == 0 {
            return Err(ConfigError::invalid("INGEST_QUEUE_CAPACITY", "must be at least 1"));
        }
        Ok(Self::new(workers, queue_capacity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MQTT_VARS: [&str; 13] = [
        "MQTT_HOST",
        "MQTT_PORT",
        "MQTT_KEEP_ALIVE_SECS",
        "MQTT_CLIENT_ID",
        "MQTT_USERNAME",
        "MQTT_PASSWORD",
        "MQTT_CLEAN_SESSION",
        "MQTT_QOS",
        "MQTT_TOPICS",
        "MQTT_RECONNECT_INITIAL_MS",
        "MQTT_RECONNECT_MAX_MS",
        "MQTT_MAX_RECONNECT_ATTEMPTS",
        "MQTT_MAX_PACKET_BYTES",
    ];

    fn unset_all() -> Vec<(&'static str, Option<&'static str>)> {
        MQTT_VARS.iter().map(|k| (*k, None)).collect()
    }

    #[test]
    fn test_defaults_from_env() {
        temp_env::with_vars(unset_all(), || {
            let config = MqttConfig::from_env().unwrap();
            assert_eq!(config.address(), "localhost:1883");
            assert_eq!(config.keep_alive_secs, 60);
            assert_eq!(config.qos, QoS::AtLeastOnce);
            assert_eq!(config.topics, DEFAULT_TOPICS);
            assert!(config.client_id.starts_with("telemetry-ingest-"));
            assert_eq!(config.reconnect.max_attempts, None);
            assert_eq!(config.max_packet_bytes, DEFAULT_MAX_PACKET_BYTES);
        });
    }

    #[test]
    fn test_custom_values_from_env() {
        let mut vars = unset_all();
        vars.extend([
            ("MQTT_HOST", Some("172.20.10.3")),
            ("MQTT_PORT", Some("1884")),
            ("MQTT_USERNAME", Some("zasha")),
            ("MQTT_PASSWORD", Some("secret")),
            ("MQTT_QOS", Some("0")),
            ("MQTT_TOPICS", Some("sensor/DHT11/temperature, sensor/Soil Moisture/moisture,")),
            ("MQTT_MAX_RECONNECT_ATTEMPTS", Some("10")),
        ]);

        temp_env::with_vars(vars, || {
            let config = MqttConfig::from_env().unwrap();
            assert_eq!(config.address(), "172.20.10.3:1884");
            assert_eq!(config.username.as_deref(), Some("zasha"));
            assert_eq!(config.qos, QoS::AtMostOnce);
            assert_eq!(
                config.topics,
                vec!["sensor/DHT11/temperature", "sensor/Soil Moisture/moisture"]
            );
            assert_eq!(config.reconnect.max_attempts, Some(10));
        });
    }

    #[test]
    fn test_invalid_port_is_fatal() {
        let mut vars = unset_all();
        vars.push(("MQTT_PORT", Some("not-a-port")));
        temp_env::with_vars(vars, || {
            let err = MqttConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("MQTT_PORT"));
        });
    }

    #[test]
    fn test_url_as_host_is_rejected() {
        let config = MqttConfig::new("mqtt://172.20.10.4", 1883);
        assert!(matches!(config.validate(), Err(MqttError::Config(_))));
    }

    #[test]
    fn test_zero_port_is_rejected() {
        assert!(MqttConfig::new("localhost", 0).validate().is_err());
    }

    #[test]
    fn test_short_keep_alive_is_rejected() {
        let config = MqttConfig::new("localhost", 1883).with_keep_alive(3);
        assert!(config.validate().is_err());
        assert!(config.with_keep_alive(0).validate().is_ok());
    }

    #[test]
    fn test_max_packet_size_bounds() {
        let config = MqttConfig::new("localhost", 1883);
        assert!(config.clone().with_max_packet_bytes(512).validate().is_err());
        assert!(
            config
                .clone()
                .with_max_packet_bytes(MQTT_MAX_PACKET_BYTES + 1)
                .validate()
                .is_err()
        );
        assert!(config.with_max_packet_bytes(MQTT_MAX_PACKET_BYTES).validate().is_ok());
    }

    #[test]
    fn test_max_packet_size_from_env() {
        let mut vars = unset_all();
        vars.push(("MQTT_MAX_PACKET_BYTES", Some("65536")));
        temp_env::with_vars(vars, || {
            assert_eq!(MqttConfig::from_env().unwrap().max_packet_bytes, 65536);
        });
    }

    #[test]
    fn test_password_without_username_is_rejected() {
        let mut config = MqttConfig::new("localhost", 1883);
        config.password = Some("secret".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_topic_list_is_rejected() {
        let config = MqttConfig::new("localhost", 1883).with_topics(Vec::<String>::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = MqttConfig::new("localhost", 1883).with_credentials("zasha", "mypassword");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("mypassword"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn test_qos_parsing() {
        assert_eq!("2".parse::<QoS>(), Ok(QoS::ExactlyOnce));
        assert_eq!("at_most_once".parse::<QoS>(), Ok(QoS::AtMostOnce));
        assert!("3".parse::<QoS>().is_err());
    }

    #[test]
    fn test_reconnect_backoff_is_capped() {
        let policy = ReconnectPolicy {
            initial_delay_ms: 500,
            max_delay_ms: 4_000,
            multiplier: 2.0,
            max_attempts: None,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(10), Duration::from_millis(4_000));
        assert!(!policy.is_exhausted(u32::MAX));
    }

    #[test]
    fn test_reconnect_ceiling() {
        let policy = ReconnectPolicy {
            max_attempts: Some(3),
            ..ReconnectPolicy::default()
        };
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
    }

    #[test]
    fn test_dispatch_config_from_env() {
        temp_env::with_vars(
            [("INGEST_WORKERS", Some("4")), ("INGEST_QUEUE_CAPACITY", Some("16"))],
            || {
                let config = DispatchConfig::from_env().unwrap();
                assert_eq!(config, DispatchConfig::new(4, 16));
            },
        );
        temp_env::with_var("INGEST_WORKERS", Some("0"), || {
            assert!(DispatchConfig::from_env().is_err());
        });
    }
}
