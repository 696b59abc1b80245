//! Axum Handlers for the HTTP endpoints.

use axum::{extract::State, response::Json};
use std::sync::Arc;

use crate::{
    models::{ConnectionStatus, HealthResponse, StatusResponse},
    state::AppState,
};

/// Reports the live sessions and where each one is in its turn cycle.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let connections: Vec<ConnectionStatus> = state
        .sessions
        .snapshot()
        .await
        .into_iter()
        .map(|(id, turn)| ConnectionStatus { id, turn })
        .collect();
    Json(StatusResponse {
        server_version: env!("CARGO_PKG_VERSION"),
        active_connections: connections.len(),
        connections,
    })
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
