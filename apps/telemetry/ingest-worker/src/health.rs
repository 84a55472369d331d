//! Liveness, readiness and metrics endpoints.

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use database::postgres::check_health_detailed;
use mqtt_worker::{ConnectionState, render_metrics};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::watch;

#[derive(Clone)]
pub struct HealthState {
    pub db: DatabaseConnection,
    pub broker: watch::Receiver<ConnectionState>,
    pub app_name: &'static str,
    pub app_version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub name: &'static str,
    pub version: &'static str,
}

/// Always OK while the process serves requests.
pub async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        name: state.app_name,
        version: state.app_version,
    })
}

/// Ready only when the broker session is up and PostgreSQL answers.
pub async fn ready_handler(State(state): State<HealthState>) -> (StatusCode, Json<Value>) {
    let broker = *state.broker.borrow();
    let db = check_health_detailed(&state.db).await;
    let ready = broker == ConnectionState::Connected && db.healthy;

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if ready { "ready" } else { "not_ready" },
            "checks": {
                "broker": broker.as_str(),
                "database": {
                    "healthy": db.healthy,
                    "response_time_ms": db.response_time_ms,
                    "message": db.message,
                }
            }
        })),
    )
}

pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        render_metrics(),
    )
}

pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
