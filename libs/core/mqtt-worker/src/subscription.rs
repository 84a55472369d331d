//! Topic registry re-applied on every (re)connect.

use crate::config::QoS;
use crate::metrics::IngestMetrics;
use crate::session::BrokerSession;
use tracing::{info, warn};

/// Outcome of one subscription round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionReport {
    pub subscribed: Vec<String>,
    /// `(topic, reason)` for each topic the client could not subscribe
    pub failed: Vec<(String, String)>,
}

impl SubscriptionReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fixed set of topics subscribed with a single QoS.
#[derive(Debug, Clone)]
pub struct SubscriptionRegistry {
    topics: Vec<String>,
    qos: QoS,
    metrics: IngestMetrics,
}

impl SubscriptionRegistry {
    /// Blank entries are dropped and duplicates collapsed, keeping first-seen order.
    pub fn new<I, S>(topics: I, qos: QoS) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for topic in topics {
            let topic = topic.into();
            let topic = topic.trim();
            if !topic.is_empty() && !unique.iter().any(|t| t == topic) {
                unique.push(topic.to_string());
            }
        }

        Self {
            topics: unique,
            qos,
            metrics: IngestMetrics::new(),
        }
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Issue one subscribe per topic. A failing topic is logged and skipped.
    pub async fn subscribe_all<S>(&self, session: &mut S) -> SubscriptionReport
    where
        S: BrokerSession + ?Sized,
    {
        let mut report = SubscriptionReport::default();

        for topic in &self.topics {
            match session.subscribe(topic, self.qos).await {
                Ok(()) => {
                    info!(topic = %topic, qos = %self.qos, "Subscribed");
                    report.subscribed.push(topic.clone());
                }
                Err(e) => {
                    warn!(topic = %topic, error = %e, "Subscribe failed, skipping topic");
                    self.metrics.subscribe_failed(topic);
                    report.failed.push((topic.clone(), e.to_string()));
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MqttError;
    use crate::session::SessionEvent;
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingSession {
        subscribed: Vec<(String, QoS)>,
        refuse: Vec<String>,
    }

    #[async_trait]
    impl BrokerSession for RecordingSession {
        async fn poll(&mut self) -> Result<SessionEvent, MqttError> {
            Ok(SessionEvent::Other)
        }

        async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), MqttError> {
            if self.refuse.iter().any(|t| t == topic) {
                return Err(MqttError::subscribe(topic, "request channel full"));
            }
            self.subscribed.push((topic.to_string(), qos));
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), MqttError> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_dedups_and_trims() {
        let registry = SubscriptionRegistry::new(
            ["sensor/DHT11/humidity", " sensor/DHT11/humidity ", "", "sensor/Soil Moisture/moisture"],
            QoS::AtLeastOnce,
        );
        assert_eq!(
            registry.topics(),
            ["sensor/DHT11/humidity", "sensor/Soil Moisture/moisture"]
        );
    }

    #[tokio::test]
    async fn test_subscribe_all_issues_one_request_per_topic() {
        let registry = SubscriptionRegistry::new(
            ["sensor/DHT11/humidity", "sensor/DHT11/temperature"],
            QoS::ExactlyOnce,
        );
        let mut session = RecordingSession::default();

        let report = registry.subscribe_all(&mut session).await;

        assert!(report.is_complete());
        assert_eq!(report.subscribed.len(), 2);
        assert_eq!(
            session.subscribed,
            vec![
                ("sensor/DHT11/humidity".to_string(), QoS::ExactlyOnce),
                ("sensor/DHT11/temperature".to_string(), QoS::ExactlyOnce),
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_topic_is_skipped() {
        let registry = SubscriptionRegistry::new(
            [
                "sensor/DHT11/humidity",
                "sensor/Ultrasonic/distance",
                "sensor/DHT11/temperature",
            ],
            QoS::AtLeastOnce,
        );
        let mut session = RecordingSession {
            refuse: vec!["sensor/Ultrasonic/distance".to_string()],
            ..Default::default()
        };

        let report = registry.subscribe_all(&mut session).await;

        assert!(!report.is_complete());
        assert_eq!(
            report.subscribed,
            vec!["sensor/DHT11/humidity", "sensor/DHT11/temperature"]
        );
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "sensor/Ultrasonic/distance");
    }

    #[tokio::test]
    async fn test_repeated_rounds_are_independent() {
        let registry = SubscriptionRegistry::new(["sensor/DHT11/humidity"], QoS::AtLeastOnce);
        let mut session = RecordingSession::default();

        registry.subscribe_all(&mut session).await;
        registry.subscribe_all(&mut session).await;

        assert_eq!(session.subscribed.len(), 2);
    }
}
