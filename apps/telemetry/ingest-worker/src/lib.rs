//! Telemetry Ingest Worker
//!
//! Subscribes to sensor topics on an MQTT broker and stores every message as
//! a row in PostgreSQL.
//!
//! ## Architecture
//!
//! ```text
//! MQTT broker (sensor/# topics)
//!   ↓ ConnectionManager (reconnect + resubscribe)
//! IngestionLoop
//!   ↓ sharded by topic (per-topic order kept)
//! ReadingProcessor (decode → store)
//!   ↓ PgReadingRepository (bounded retry)
//! PostgreSQL `readings`
//! ```
//!
//! ## Features
//!
//! - Unbounded reconnect with capped exponential backoff
//! - Re-subscription on every reconnect
//! - Per-message fault isolation (decode and storage failures are logged)
//! - Graceful shutdown that drains accepted messages
//! - Health, readiness and Prometheus endpoints

pub mod config;
pub mod health;

use config::IngestConfig;
use core_config::FromEnv;
use database::postgres::connect_from_config_with_retry;
use domain_readings::{PgReadingRepository, ReadingProcessor, ReadingSink};
use eyre::{Result, WrapErr};
use health::{HealthState, health_router};
use mqtt_worker::{
    BrokerSession, ConnectionManager, DispatchConfig, IngestionLoop, init_metrics,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

const APP_NAME: &str = env!("CARGO_PKG_NAME");
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wire a connection manager to a reading sink.
pub fn build_pipeline<S, K>(
    connection: ConnectionManager<S>,
    sink: K,
    dispatch: DispatchConfig,
) -> IngestionLoop<S, ReadingProcessor<K>>
where
    S: BrokerSession,
    K: ReadingSink + 'static,
{
    IngestionLoop::new(connection, Arc::new(ReadingProcessor::new(sink)), dispatch)
}

async fn start_health_server(state: HealthState, port: u16) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {}", addr))?;

    info!(port = %port, "Health server listening");

    axum::serve(listener, health_router(state))
        .await
        .wrap_err("Health server failed")?;

    Ok(())
}

/// Run the ingest worker
///
/// 1. Loads and validates configuration; any invalid setting is fatal
/// 2. Connects to PostgreSQL with retry
/// 3. Builds the MQTT client and the ingestion loop
/// 4. Runs until SIGINT/SIGTERM, then drains and disconnects
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();

    let config = IngestConfig::from_env().wrap_err("Invalid configuration")?;
    core_config::tracing::init_tracing(&config.environment);
    init_metrics().wrap_err("Failed to install Prometheus recorder")?;

    info!(name = APP_NAME, version = APP_VERSION, "Starting telemetry ingest worker");
    info!("Environment: {:?}", config.environment);

    info!(database = %config.postgres.redacted_url(), "Connecting to PostgreSQL...");
    let db = connect_from_config_with_retry(config.postgres.clone(), None)
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;

    let connection =
        ConnectionManager::connect(&config.mqtt).wrap_err("Invalid MQTT configuration")?;
    let broker_state = connection.state_watch();

    let sink = PgReadingRepository::new(db.clone(), config.store_retry.clone());
    let ingestion = build_pipeline(connection, sink, config.dispatch.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    let health_state = HealthState {
        db,
        broker: broker_state,
        app_name: APP_NAME,
        app_version: APP_VERSION,
    };
    let health_port = config.health_port;
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state, health_port).await {
            error!(error = %e, "Health server failed");
        }
    });

    ingestion
        .run(shutdown_rx)
        .await
        .wrap_err("Ingestion loop failed")?;

    info!("Telemetry ingest worker stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .wrap_err("Failed to install SIGTERM handler")?;

    #[cfg(unix)]
    let terminate = terminate.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        result = signal::ctrl_c() => {
            result.wrap_err("Failed to listen for Ctrl+C")?;
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
