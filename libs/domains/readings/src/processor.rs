//! Reading processor for the ingestion loop.
//!
//! `ReadingProcessor` implements `MessageHandler`: it decodes each inbound
//! message into a [`Reading`] and hands it to a [`ReadingSink`]. Failures are
//! logged here with full context and reported back as `HandlerError`.

use async_trait::async_trait;
use mqtt_worker::{HandlerError, InboundMessage, MessageHandler};
use tracing::{debug, error, warn};

use crate::decoder::ReadingDecoder;
use crate::error::ReadingError;
use crate::models::Reading;
use crate::repository::ReadingSink;

pub struct ReadingProcessor<K: ReadingSink> {
    decoder: ReadingDecoder,
    sink: K,
}

impl<K: ReadingSink> ReadingProcessor<K> {
    pub fn new(sink: K) -> Self {
        Self {
            decoder: ReadingDecoder::new(),
            sink,
        }
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Decode and store one message.
    pub async fn process(&self, topic: &str, payload: &[u8]) -> Result<Reading, ReadingError> {
        let reading = self.decoder.decode(topic, payload).inspect_err(|e| {
            warn!(topic = %topic, bytes = payload.len(), error = %e, "Dropping undecodable message");
        })?;

        if reading.numeric_value().is_none() {
            debug!(
                topic = %reading.topic(),
                value = %reading.value(),
                "Non-numeric reading, storing verbatim"
            );
        }

        self.sink.store(&reading).await.inspect_err(|e| {
            if let ReadingError::Persistence { attempts, reason, .. } = e {
                error!(
                    topic = %reading.topic(),
                    value = %reading.value(),
                    received_at = %reading.received_at(),
                    attempts,
                    error = %reason,
                    "Reading lost, could not be stored"
                );
            }
        })?;

        debug!(
            topic = %reading.topic(),
            sensor = %reading.sensor_kind(),
            value = %reading.value(),
            "Stored reading"
        );
        Ok(reading)
    }
}

#[async_trait]
impl<K: ReadingSink + 'static> MessageHandler for ReadingProcessor<K> {
    async fn handle(&self, message: InboundMessage) -> Result<(), HandlerError> {
        self.process(&message.topic, &message.payload).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "readings"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockReadingSink;
    use chrono::Utc;
    use mockall::Sequence;
    use mockall::predicate::*;

    fn persistence_error(reading: &Reading) -> ReadingError {
        ReadingError::Persistence {
            topic: reading.topic().to_string(),
            value: reading.value().to_string(),
            received_at: reading.received_at(),
            attempts: 4,
            reason: "connection refused".to_string(),
        }
    }

    #[tokio::test]
    async fn test_process_stores_decoded_reading() {
        let mut sink = MockReadingSink::new();
        sink.expect_store()
            .withf(|r: &Reading| r.topic() == "sensor/DHT11/temperature" && r.value() == "23.5")
            .times(1)
            .returning(|_| Ok(()));

        let processor = ReadingProcessor::new(sink);
        let before = Utc::now();
        let reading = processor
            .process("sensor/DHT11/temperature", b"23.5")
            .await
            .unwrap();

        assert_eq!(reading.value(), "23.5");
        assert!(reading.received_at() >= before);
    }

    #[tokio::test]
    async fn test_undecodable_message_never_reaches_sink() {
        let mut sink = MockReadingSink::new();
        sink.expect_store().never();

        let processor = ReadingProcessor::new(sink);
        let err = processor
            .handle(InboundMessage::new("sensor/DHT11/humidity", vec![0xc3, 0x28]))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "decode");
    }

    #[tokio::test]
    async fn test_non_numeric_value_is_still_stored() {
        let mut sink = MockReadingSink::new();
        sink.expect_store()
            .withf(|r: &Reading| r.value() == "sensor error")
            .times(1)
            .returning(|_| Ok(()));

        let processor = ReadingProcessor::new(sink);
        assert!(
            processor
                .handle(InboundMessage::new("sensor/Ultrasonic/distance", "sensor error"))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_persistence_failure_is_contained() {
        let mut seq = Sequence::new();
        let mut sink = MockReadingSink::new();
        sink.expect_store()
            .times(3)
            .in_sequence(&mut seq)
            .returning(|r| Err(persistence_error(r)));
        sink.expect_store()
            .with(function(|r: &Reading| r.value() == "24.0"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let processor = ReadingProcessor::new(sink);
        for value in ["21.0", "22.0", "23.0"] {
            let err = processor
                .handle(InboundMessage::new("sensor/DHT11/temperature", value))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "persistence");
        }

        assert!(
            processor
                .handle(InboundMessage::new("sensor/DHT11/temperature", "24.0"))
                .await
                .is_ok()
        );
    }
}
