//! The ingestion loop: broker events in, handler calls out.

use crate::config::DispatchConfig;
use crate::connection::{BrokerEvent, ConnectionManager, ConnectionState};
use crate::dispatch::Dispatcher;
use crate::error::MqttError;
use crate::handler::MessageHandler;
use crate::metrics::IngestMetrics;
use crate::session::BrokerSession;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Supervises the broker connection and feeds messages to a handler.
pub struct IngestionLoop<S: BrokerSession, H: MessageHandler> {
    connection: ConnectionManager<S>,
    handler: Arc<H>,
    dispatch: DispatchConfig,
    metrics: IngestMetrics,
}

impl<S: BrokerSession, H: MessageHandler> IngestionLoop<S, H> {
    pub fn new(connection: ConnectionManager<S>, handler: Arc<H>, dispatch: DispatchConfig) -> Self {
        Self {
            connection,
            handler,
            dispatch,
            metrics: IngestMetrics::new(),
        }
    }

    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.connection.state_watch()
    }

    /// Run until shutdown is signalled or reconnecting becomes impossible.
    ///
    /// Shutdown is `true` on the watch channel or the sender being dropped.
    /// Messages already queued are processed before the broker session is
    /// closed.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) -> Result<(), MqttError> {
        info!(
            topics = self.connection.registry().topics().len(),
            workers = self.dispatch.workers,
            handler = self.handler.name(),
            "Starting ingestion loop"
        );

        let dispatcher = Dispatcher::spawn(self.handler.clone(), &self.dispatch);
        let mut outcome = Ok(());

        if !*shutdown_rx.borrow() {
            loop {
                tokio::select! {
                    biased;

                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("Shutdown signal received, stopping ingestion loop");
                            break;
                        }
                    }

                    event = self.connection.next_event() => match event {
                        Ok(BrokerEvent::Connected { report }) => {
                            info!(
                                subscribed = report.subscribed.len(),
                                failed = report.failed.len(),
                                "Connected; subscriptions applied"
                            );
                        }
                        Ok(BrokerEvent::Message(message)) => {
                            self.metrics.message_received(&message.topic);
                            debug!(topic = %message.topic, bytes = message.payload_len(), "Message received");
                            if let Err(e) = dispatcher.dispatch(message).await {
                                error!(error = %e, "Dispatch failed");
                            }
                        }
                        Ok(BrokerEvent::Disconnected { reason }) => {
                            warn!(reason = %reason, "Broker connection lost, reconnecting");
                        }
                        Err(e) => {
                            error!(error = %e, "Ingestion loop stopping on fatal broker error");
                            outcome = Err(e);
                            break;
                        }
                    },
                }
            }
        }

        dispatcher.close().await;
        if let Err(e) = self.connection.disconnect().await {
            warn!(error = %e, "Clean disconnect failed");
        }

        info!("Ingestion loop stopped");
        outcome
    }
}
