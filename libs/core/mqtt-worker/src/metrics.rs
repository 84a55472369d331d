//! Prometheus metrics for the ingestion pipeline.

use crate::connection::ConnectionState;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder.
///
/// Call this once at startup. Subsequent calls are no-ops.
pub fn init_metrics() -> Result<(), BuildError> {
    PROMETHEUS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;
        info!("Prometheus metrics initialized");
        Ok::<_, BuildError>(handle)
    })?;
    Ok(())
}

pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    prometheus_handle().map(|h| h.render()).unwrap_or_default()
}

/// Metric recorder for the ingestion pipeline.
///
/// Without an installed recorder every call is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestMetrics;

impl IngestMetrics {
    pub fn new() -> Self {
        Self
    }

    pub fn connection_event(&self, event: &'static str) {
        counter!("ingest_connection_events_total", "event" => event).increment(1);
    }

    pub fn connection_state(&self, state: ConnectionState) {
        gauge!("ingest_connection_state").set(state.as_gauge());
    }

    pub fn subscribe_failed(&self, topic: &str) {
        counter!("ingest_subscribe_failures_total", "topic" => topic.to_string()).increment(1);
    }

    pub fn message_received(&self, topic: &str) {
        counter!("ingest_messages_received_total", "topic" => topic.to_string()).increment(1);
    }

    pub fn message_stored(&self, topic: &str, duration: Duration) {
        counter!("ingest_messages_stored_total", "topic" => topic.to_string()).increment(1);
        histogram!("ingest_store_duration_seconds", "topic" => topic.to_string())
            .record(duration.as_secs_f64());
    }

    pub fn message_failed(&self, topic: &str, kind: &'static str) {
        counter!(
            "ingest_messages_failed_total",
            "topic" => topic.to_string(),
            "kind" => kind
        )
        .increment(1);
    }
}
