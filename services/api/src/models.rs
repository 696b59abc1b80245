//! API Models
//!
//! Response bodies for the HTTP endpoints.

use duplex_core::TurnState;
use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize, Debug, Clone)]
pub struct ConnectionStatus {
    pub id: Uuid,
    pub turn: TurnState,
}

#[derive(Serialize, Debug, Clone)]
pub struct StatusResponse {
    pub server_version: &'static str,
    pub active_connections: usize,
    pub connections: Vec<ConnectionStatus>,
}

#[derive(Serialize, Debug, Clone)]
pub struct HealthResponse {
    pub status: &'static str,
}
