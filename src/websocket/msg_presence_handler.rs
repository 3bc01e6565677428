use serde_json::Value;
use tracing::debug;

use crate::models::{MessageType, PresenceData, SyncError};
use super::router::payload;
use super::session::Session;

/// Handle Presence: record the status and relay the payload to the room
pub fn handle_presence_message(session: &Session, data: Value) -> Result<(), SyncError> {
    let presence: PresenceData = payload(MessageType::Presence, data.clone())?;
    debug!("Client {} is now {:?}", session.client_id, presence.status);
    session.hub.presence(session.client_id, presence.status, data);
    Ok(())
}
