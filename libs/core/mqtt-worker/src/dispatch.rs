//! Sharded hand-off from the event loop to handler workers.
//!
//! Each topic hashes to one shard and each shard drains its bounded queue
//! serially, which keeps per-topic processing order.

use crate::config::DispatchConfig;
use crate::error::MqttError;
use crate::handler::MessageHandler;
use crate::message::InboundMessage;
use crate::metrics::IngestMetrics;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error};

pub struct Dispatcher {
    senders: Vec<mpsc::Sender<InboundMessage>>,
    workers: JoinSet<()>,
}

impl Dispatcher {
    /// Spawn one worker task per shard. Must be called inside a Tokio runtime.
    pub fn spawn<H: MessageHandler>(handler: Arc<H>, config: &DispatchConfig) -> Self {
        let shards = config.workers.max(1);
        let mut senders = Vec::with_capacity(shards);
        let mut workers = JoinSet::new();

        for shard in 0..shards {
            let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
            senders.push(tx);
            workers.spawn(shard_worker(shard, rx, handler.clone()));
        }

        debug!(
            shards,
            queue_capacity = config.queue_capacity,
            handler = handler.name(),
            "Dispatcher started"
        );
        Self { senders, workers }
    }

    pub fn shard_for(&self, topic: &str) -> usize {
        shard_index(topic, self.senders.len())
    }

    /// Queue a message on its topic's shard, waiting while the shard is full.
    pub async fn dispatch(&self, message: InboundMessage) -> Result<(), MqttError> {
        let shard = self.shard_for(&message.topic);
        self.senders[shard]
            .send(message)
            .await
            .map_err(|e| MqttError::Client(format!("shard {} stopped: {}", shard, e)))
    }

    /// Close the queues and wait until every accepted message is processed.
    pub async fn close(mut self) {
        self.senders.clear();
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Shard worker panicked");
            }
        }
        debug!("Dispatcher drained");
    }
}

pub(crate) fn shard_index(topic: &str, shards: usize) -> usize {
    if shards <= 1 {
        return 0;
    }
    let mut hasher = DefaultHasher::new();
    topic.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

async fn shard_worker<H: MessageHandler>(
    shard: usize,
    mut rx: mpsc::Receiver<InboundMessage>,
    handler: Arc<H>,
) {
    let metrics = IngestMetrics::new();
    while let Some(message) = rx.recv().await {
        process_message(handler.as_ref(), message, &metrics).await;
    }
    debug!(shard, "Shard worker stopped");
}

/// Run the handler on one message; failures end at this boundary.
pub(crate) async fn process_message<H: MessageHandler + ?Sized>(
    handler: &H,
    message: InboundMessage,
    metrics: &IngestMetrics,
) {
    let topic = message.topic.clone();
    let start = Instant::now();

    match handler.handle(message).await {
        Ok(()) => {
            let duration = start.elapsed();
            metrics.message_stored(&topic, duration);
            debug!(
                topic = %topic,
                duration_ms = duration.as_millis() as u64,
                "Message processed"
            );
        }
        Err(e) => {
            // The handler has already logged the failure with its own context.
            metrics.message_failed(&topic, e.kind());
            debug!(topic = %topic, kind = e.kind(), "Message dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct CollectingHandler {
        seen: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl MessageHandler for CollectingHandler {
        async fn handle(&self, message: InboundMessage) -> Result<(), HandlerError> {
            // Yield so shards interleave
            tokio::time::sleep(Duration::from_millis(1)).await;
            if message.payload == b"fail" {
                return Err(HandlerError::Persistence("rejected".into()));
            }
            self.seen.lock().unwrap().push((message.topic, message.payload));
            Ok(())
        }
    }

    #[test]
    fn test_shard_index_is_stable() {
        for shards in 1..8 {
            let first = shard_index("sensor/DHT11/temperature", shards);
            assert!(first < shards);
            assert_eq!(first, shard_index("sensor/DHT11/temperature", shards));
        }
        assert_eq!(shard_index("anything", 1), 0);
    }

    #[tokio::test]
    async fn test_per_topic_order_is_preserved() {
        let handler = Arc::new(CollectingHandler::default());
        let dispatcher = Dispatcher::spawn(handler.clone(), &DispatchConfig::new(4, 2));
        let topics = ["sensor/DHT11/humidity", "sensor/DHT11/temperature", "sensor/Ultrasonic/distance"];

        for i in 0..20 {
            for topic in topics {
                dispatcher
                    .dispatch(InboundMessage::new(topic, i.to_string()))
                    .await
                    .unwrap();
            }
        }
        dispatcher.close().await;

        let seen = handler.seen.lock().unwrap();
        assert_eq!(seen.len(), 60);
        for topic in topics {
            let values: Vec<String> = seen
                .iter()
                .filter(|(t, _)| t == topic)
                .map(|(_, p)| String::from_utf8(p.clone()).unwrap())
                .collect();
            let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
            assert_eq!(values, expected, "order for {}", topic);
        }
    }

    #[tokio::test]
    async fn test_handler_failure_does_not_stop_shard() {
        let handler = Arc::new(CollectingHandler::default());
        let dispatcher = Dispatcher::spawn(handler.clone(), &DispatchConfig::default());

        for payload in ["fail", "fail", "fail", "21.0"] {
            dispatcher
                .dispatch(InboundMessage::new("sensor/DHT11/temperature", payload))
                .await
                .unwrap();
        }
        dispatcher.close().await;

        let seen = handler.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, b"21.0");
    }

    #[tokio::test]
    async fn test_close_drains_queued_messages() {
        let handler = Arc::new(CollectingHandler::default());
        let dispatcher = Dispatcher::spawn(handler.clone(), &DispatchConfig::new(1, 16));

        for i in 0..10 {
            dispatcher
                .dispatch(InboundMessage::new("sensor/DHT11/humidity", i.to_string()))
                .await
                .unwrap();
        }
        dispatcher.close().await;

        assert_eq!(handler.seen.lock().unwrap().len(), 10);
    }
}
