//! Broker session abstraction.
//!
//! [`BrokerSession`] is the seam between the connection manager and the MQTT
//! client library. [`RumqttSession`] drives a `rumqttc` event loop; tests use
//! the scripted session from the `testing` module instead.

use crate::config::{MqttConfig, QoS};
use crate::error::MqttError;
use async_trait::async_trait;
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, SubscribeReasonCode,
};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Extra request slots beyond one per topic.
const REQUEST_HEADROOM: usize = 10;

/// How long `disconnect` keeps polling to flush the DISCONNECT packet.
const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Transport-level event surfaced by a session poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Broker accepted the connection
    ConnAck { session_present: bool },

    /// Application message on a subscribed topic
    Publish { topic: String, payload: Vec<u8> },

    /// Broker answered a subscribe request
    SubAck { pkid: u16, rejected: usize },

    /// Broker closed the session with a DISCONNECT packet
    Disconnected,

    /// Pings, acks and outgoing traffic
    Other,
}

/// A live connection to an MQTT broker.
///
/// `poll` drives the network: the first call connects, and after an error
/// the next call reconnects with the same parameters.
#[async_trait]
pub trait BrokerSession: Send {
    async fn poll(&mut self) -> Result<SessionEvent, MqttError>;

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), MqttError>;

    async fn disconnect(&mut self) -> Result<(), MqttError>;
}

/// [`BrokerSession`] backed by a `rumqttc` client and event loop.
pub struct RumqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl RumqttSession {
    /// Build the client from validated settings. No network I/O happens here.
    pub fn new(config: &MqttConfig) -> Result<Self, MqttError> {
        config.validate()?;

        let mut options = MqttOptions::new(&config.client_id, config.host.trim(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_clean_session(config.clean_session);
        options.set_max_packet_size(config.max_packet_bytes, config.max_packet_bytes);
        if let Some(username) = &config.username {
            options.set_credentials(username, config.password.clone().unwrap_or_default());
        }

        let (client, eventloop) =
            AsyncClient::new(options, config.topics.len() + REQUEST_HEADROOM);
        Ok(Self { client, eventloop })
    }
}

fn to_rumqttc_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

fn translate(event: Event) -> SessionEvent {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) => SessionEvent::ConnAck {
            session_present: ack.session_present,
        },
        Event::Incoming(Packet::Publish(publish)) => SessionEvent::Publish {
            topic: publish.topic,
            payload: publish.payload.to_vec(),
        },
        Event::Incoming(Packet::SubAck(ack)) => SessionEvent::SubAck {
            pkid: ack.pkid,
            rejected: ack
                .return_codes
                .iter()
                .filter(|code| matches!(code, SubscribeReasonCode::Failure))
                .count(),
        },
        Event::Incoming(Packet::Disconnect) => SessionEvent::Disconnected,
        _ => SessionEvent::Other,
    }
}

#[async_trait]
impl BrokerSession for RumqttSession {
    async fn poll(&mut self) -> Result<SessionEvent, MqttError> {
        let event = self.eventloop.poll().await?;
        Ok(translate(event))
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), MqttError> {
        // Queued on the request channel; sent by subsequent polls.
        self.client
            .try_subscribe(topic, to_rumqttc_qos(qos))
            .map_err(|e| MqttError::subscribe(topic, e))
    }

    async fn disconnect(&mut self) -> Result<(), MqttError> {
        self.client.try_disconnect()?;

        let flush = async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => return Ok(()),
                    Ok(_) => continue,
                    Err(e) => return Err(MqttError::from(e)),
                }
            }
        };

        match timeout(DISCONNECT_FLUSH_TIMEOUT, flush).await {
            Ok(result) => result,
            Err(_) => {
                debug!("DISCONNECT not flushed before timeout");
                Ok(())
            }
        }
    }
}
