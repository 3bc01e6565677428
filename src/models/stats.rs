use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Member count of one live room
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct RoomStats {
    pub room_id: String,
    pub members: usize,
}

/// Point-in-time view of the sync hub
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Default)]
pub struct HubStats {
    pub total_rooms: usize,
    pub total_clients: usize,
    pub rooms: Vec<RoomStats>,
}

/// Response for the statistics endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct StatsResponse {
    pub total_rooms: usize,
    pub total_clients: usize,
    pub rooms: Vec<RoomStats>,
    pub cpu_usage: f32,
    pub memory_used: u64,
    pub memory_total: u64,
}
