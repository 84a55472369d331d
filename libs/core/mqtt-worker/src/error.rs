//! Error types for the MQTT worker.

use rumqttc::{ClientError, ConnectionError};
use thiserror::Error;

/// Error that can occur while talking to the broker.
#[derive(Debug, Error)]
pub enum MqttError {
    /// Invalid broker settings; never retried
    #[error("MQTT configuration error: {0}")]
    Config(String),

    /// Connection attempt or established session failed
    #[error("MQTT connection error: {0}")]
    Connection(String),

    /// Request could not be handed to the client
    #[error("MQTT client error: {0}")]
    Client(String),

    /// Broker refused or the client could not issue a subscribe
    #[error("Subscribe to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },

    /// Configured reconnect ceiling reached
    #[error("Gave up connecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

impl MqttError {
    pub fn config(msg: impl Into<String>) -> Self {
        MqttError::Config(msg.into())
    }

    pub fn subscribe(topic: impl Into<String>, reason: impl ToString) -> Self {
        MqttError::Subscribe {
            topic: topic.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors the connection manager recovers from by reconnecting.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MqttError::Connection(_) | MqttError::Client(_))
    }
}

impl From<ConnectionError> for MqttError {
    fn from(err: ConnectionError) -> Self {
        MqttError::Connection(err.to_string())
    }
}

impl From<ClientError> for MqttError {
    fn from(err: ClientError) -> Self {
        MqttError::Client(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(MqttError::Connection("reset by peer".into()).is_recoverable());
        assert!(MqttError::Client("request channel closed".into()).is_recoverable());
        assert!(!MqttError::config("bad host").is_recoverable());
        assert!(!MqttError::ReconnectExhausted { attempts: 3 }.is_recoverable());
    }

    #[test]
    fn test_subscribe_error_names_topic() {
        let err = MqttError::subscribe("sensor/DHT11/humidity", "not authorized");
        assert_eq!(
            err.to_string(),
            "Subscribe to 'sensor/DHT11/humidity' failed: not authorized"
        );
    }
}
