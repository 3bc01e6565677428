use axum::{extract::State, Json};
use crate::models::HealthResponse;
use crate::AppState;
use tracing::debug;

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
    })
}

/// Readiness check endpoint: the hub must answer
pub async fn ready_check(State(state): State<AppState>) -> Json<HealthResponse> {
    debug!("Readiness check requested");
    let stats = state.hub.stats().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        message: format!("Service is ready, {} client(s) in {} room(s)", stats.total_clients, stats.total_rooms),
    })
}
