use axum::{extract::{Extension, State}, http::StatusCode, Json};
use std::sync::{Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

use crate::auth::auth;
use crate::models::{ErrorResponse, StatsResponse};
use crate::services::auth_service::Authenticated;
use crate::AppState;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Live room and client counts for monitoring
pub async fn stats(
    State(state): State<AppState>,
    Extension(caller): Extension<Authenticated>,
) -> Result<(StatusCode, Json<StatsResponse>), (StatusCode, Json<ErrorResponse>)> {

    auth::ensure_admin_or_service(&caller)?;

    let hub_stats = state.hub.stats().await;

    // System stats
    let (cpu_usage, memory_used, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| Mutex::new(System::new_all()));
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (sys.global_cpu_info().cpu_usage(), sys.used_memory(), sys.total_memory())
            }
            Err(_) => (0.0, 0, 0),
        }
    };

    info!(
        "Stats: CPU: {:.2}%, Mem: {}/{} MB, Clients: {}, Rooms: {}",
        cpu_usage,
        memory_used / 1024 / 1024,
        memory_total / 1024 / 1024,
        hub_stats.total_clients,
        hub_stats.total_rooms
    );

    Ok((
        StatusCode::OK,
        Json(StatsResponse {
            total_rooms: hub_stats.total_rooms,
            total_clients: hub_stats.total_clients,
            rooms: hub_stats.rooms,
            cpu_usage,
            memory_used,
            memory_total,
        }),
    ))
}
