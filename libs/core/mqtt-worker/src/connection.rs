//! Connection manager: owns the broker session and its lifecycle.

use crate::config::{MqttConfig, ReconnectPolicy};
use crate::error::MqttError;
use crate::message::InboundMessage;
use crate::metrics::IngestMetrics;
use crate::session::{BrokerSession, RumqttSession, SessionEvent};
use crate::subscription::{SubscriptionRegistry, SubscriptionReport};
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Broker link state, readable through [`ConnectionManager::state_watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }

    pub(crate) fn as_gauge(&self) -> f64 {
        match self {
            ConnectionState::Disconnected => 0.0,
            ConnectionState::Connecting => 1.0,
            ConnectionState::Connected => 2.0,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the ingestion loop reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// CONNACK received and the subscription round has run
    Connected { report: SubscriptionReport },

    Message(InboundMessage),

    /// An established connection was lost
    Disconnected { reason: String },
}

pub struct ConnectionManager<S: BrokerSession> {
    session: S,
    registry: SubscriptionRegistry,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<ConnectionState>,
    failures: u32,
    pending_delay: Option<Duration>,
    metrics: IngestMetrics,
}

impl ConnectionManager<RumqttSession> {
    /// Validate the settings and build a `rumqttc` backed manager.
    ///
    /// The network connection is opened by the first [`next_event`](Self::next_event).
    pub fn connect(config: &MqttConfig) -> Result<Self, MqttError> {
        let session = RumqttSession::new(config)?;
        let registry = SubscriptionRegistry::new(config.topics.iter().cloned(), config.qos);
        info!(
            broker = %config.address(),
            client_id = %config.client_id,
            keep_alive_secs = config.keep_alive_secs,
            topics = registry.topics().len(),
            "MQTT client configured"
        );
        Ok(Self::new(session, registry, config.reconnect.clone()))
    }
}

impl<S: BrokerSession> ConnectionManager<S> {
    pub fn new(session: S, registry: SubscriptionRegistry, policy: ReconnectPolicy) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        Self {
            session,
            registry,
            policy,
            state_tx,
            failures: 0,
            pending_delay: None,
            metrics: IngestMetrics::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Read-only view of the connection state.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
        self.metrics.connection_state(state);
    }

    /// Drive the session until something the loop must react to happens.
    ///
    /// Reconnect attempts and their backoff happen inside this call. Only
    /// an exhausted reconnect ceiling or a non-recoverable error is returned
    /// as `Err`.
    pub async fn next_event(&mut self) -> Result<BrokerEvent, MqttError> {
        loop {
            if let Some(delay) = self.pending_delay.take() {
                tokio::time::sleep(delay).await;
            }
            if self.state() == ConnectionState::Disconnected {
                self.set_state(ConnectionState::Connecting);
            }

            match self.session.poll().await {
                Ok(SessionEvent::ConnAck { session_present }) => {
                    if self.failures > 0 {
                        info!(attempts = self.failures, "Reconnected to MQTT broker");
                        self.metrics.connection_event("reconnected");
                    } else {
                        info!(session_present, "Connected to MQTT broker");
                        self.metrics.connection_event("connected");
                    }
                    self.failures = 0;
                    self.set_state(ConnectionState::Connected);

                    let report = self.registry.subscribe_all(&mut self.session).await;
                    return Ok(BrokerEvent::Connected { report });
                }
                Ok(SessionEvent::Publish { topic, payload }) => {
                    return Ok(BrokerEvent::Message(InboundMessage::new(topic, payload)));
                }
                Ok(SessionEvent::SubAck { pkid, rejected }) => {
                    if rejected > 0 {
                        warn!(pkid, rejected, "Broker rejected subscription");
                        self.metrics.connection_event("subscription_rejected");
                    } else {
                        debug!(pkid, "Subscription acknowledged");
                    }
                }
                Ok(SessionEvent::Disconnected) => {
                    if self.state() == ConnectionState::Connected {
                        return Ok(self.connection_lost("broker sent DISCONNECT".to_string()));
                    }
                }
                Ok(SessionEvent::Other) => {}
                Err(e) if !e.is_recoverable() => {
                    self.set_state(ConnectionState::Disconnected);
                    return Err(e);
                }
                Err(e) => {
                    if self.state() == ConnectionState::Connected {
                        return Ok(self.connection_lost(e.to_string()));
                    }

                    self.failures += 1;
                    self.metrics.connection_event("connect_failed");
                    if self.policy.is_exhausted(self.failures) {
                        error!(attempts = self.failures, error = %e, "Reconnect attempts exhausted");
                        self.set_state(ConnectionState::Disconnected);
                        return Err(MqttError::ReconnectExhausted {
                            attempts: self.failures,
                        });
                    }

                    let delay = self.policy.delay_for(self.failures);
                    warn!(
                        attempt = self.failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "MQTT connection attempt failed, retrying"
                    );
                    self.pending_delay = Some(delay);
                }
            }
        }
    }

    fn connection_lost(&mut self, reason: String) -> BrokerEvent {
        warn!(reason = %reason, "Connection to MQTT broker lost");
        self.metrics.connection_event("disconnected");
        self.set_state(ConnectionState::Disconnected);
        // Counts as the first failed attempt so the reconnect is backed off.
        self.failures = 1;
        self.pending_delay = Some(self.policy.delay_for(1));
        BrokerEvent::Disconnected { reason }
    }

    /// Send a clean DISCONNECT and mark the state `Disconnected`.
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        let result = if self.state() == ConnectionState::Connected {
            self.session.disconnect().await
        } else {
            Ok(())
        };
        self.set_state(ConnectionState::Disconnected);
        info!("Disconnected from MQTT broker");
        result
    }
}
