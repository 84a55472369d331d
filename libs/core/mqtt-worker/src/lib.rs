//! MQTT subscription worker.
//!
//! Connects to a broker, keeps a fixed set of topic subscriptions alive
//! across reconnects and hands every delivered message to a
//! [`MessageHandler`] through a sharded, order-preserving worker pool.
//!
//! ```ignore
//! use mqtt_worker::{ConnectionManager, DispatchConfig, IngestionLoop, MqttConfig};
//!
//! let connection = ConnectionManager::connect(&MqttConfig::from_env()?)?;
//! let ingestion = IngestionLoop::new(connection, Arc::new(handler), DispatchConfig::default());
//! ingestion.run(shutdown_rx).await?;
//! ```

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod message;
pub mod metrics;
pub mod session;
pub mod subscription;
pub mod worker;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{DEFAULT_TOPICS, DispatchConfig, MqttConfig, QoS, ReconnectPolicy};
pub use connection::{BrokerEvent, ConnectionManager, ConnectionState};
pub use dispatch::Dispatcher;
pub use error::MqttError;
pub use handler::{HandlerError, MessageHandler};
pub use message::InboundMessage;
pub use metrics::{IngestMetrics, init_metrics, render_metrics};
pub use session::{BrokerSession, RumqttSession, SessionEvent};
pub use subscription::{SubscriptionRegistry, SubscriptionReport};
pub use worker::IngestionLoop;
