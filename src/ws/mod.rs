pub mod client;
pub mod hub;
pub mod reaper;
pub mod registry;
pub mod room;

pub use client::{Client, ClientId, ClientSnapshot, ConnectionState, DisconnectReason, Identity};
pub use hub::{HubCommand, HubHandle, HubState};
pub use reaper::spawn_reaper;
