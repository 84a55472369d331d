//! Telemetry Ingest Worker - Entry Point

#[tokio::main]
async fn main() -> eyre::Result<()> {
    telemetry_ingest_worker::run().await
}
