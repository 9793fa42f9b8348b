//! Liveness and readiness endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use event_bus::ConnectionStatus;
use projections::{Projection, ReadModel};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub broker: &'static str,
    pub applications: usize,
    pub events_processed: u64,
}

/// GET /health: `200 ok` while the broker is ready, `503 degraded` otherwise.
pub async fn check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let broker = state.broker.status().await;
    let (code, status) = match broker {
        ConnectionStatus::Ready => (StatusCode::OK, "ok"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "degraded"),
    };

    (
        code,
        Json(HealthResponse {
            status,
            broker: broker_label(broker),
            applications: state.applications.count().await,
            events_processed: state.applications.position().await.events_processed(),
        }),
    )
}

fn broker_label(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Disconnected => "disconnected",
        ConnectionStatus::Connecting => "connecting",
        ConnectionStatus::Ready => "ready",
    }
}
