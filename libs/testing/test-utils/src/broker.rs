//! MQTT test infrastructure
//!
//! `TestBroker` starts an Eclipse Mosquitto container and offers a small
//! publishing client for feeding the ingestion loop.

use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::mosquitto::Mosquitto;
use tokio::task::JoinHandle;

/// Mosquitto container; removed when this is dropped.
///
/// ```no_run
/// use test_utils::TestBroker;
///
/// # async fn example() {
/// let broker = TestBroker::new().await;
/// broker.publish("sensor/DHT11/temperature", "23.5").await;
/// # }
/// ```
pub struct TestBroker {
    #[allow(dead_code)]
    container: ContainerAsync<Mosquitto>,
    client: AsyncClient,
    eventloop: JoinHandle<()>,
    pub host: String,
    pub port: u16,
}

impl TestBroker {
    pub async fn new() -> Self {
        let container = Mosquitto::default()
            .start()
            .await
            .expect("Failed to start Mosquitto container");

        let port = container
            .get_host_port_ipv4(1883)
            .await
            .expect("Failed to get Mosquitto port");
        let host = "127.0.0.1".to_string();

        let mut options = MqttOptions::new("test-utils-publisher", host.clone(), port);
        options.set_keep_alive(Duration::from_secs(5));
        let (client, mut eventloop) = AsyncClient::new(options, 64);

        let eventloop = tokio::spawn(async move {
            loop {
                if let Err(e) = eventloop.poll().await {
                    tracing::debug!(error = %e, "Test publisher connection error");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        });

        tracing::info!(port, "Test broker ready");

        Self {
            container,
            client,
            eventloop,
            host,
            port,
        }
    }

    /// Publish a text payload with QoS 1
    pub async fn publish(&self, topic: &str, payload: &str) {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
            .await
            .expect("Failed to queue publish");
    }
}

impl Drop for TestBroker {
    fn drop(&mut self) {
        self.eventloop.abort();
        tracing::debug!("Cleaning up test broker container");
    }
}
