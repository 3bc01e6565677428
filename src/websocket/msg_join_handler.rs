use tracing::{info, warn};

use crate::models::{JoinRoomData, SyncError};
use super::session::Session;

/// Handle JoinRoom: check access through the store, then hand over to the hub
pub async fn handle_join_message(session: &Session, join_msg: JoinRoomData, request_id: Option<String>) -> Result<(), SyncError> {
    let note_id = join_msg.note_id.as_str();

    info!("Join request for document {} from user {}", note_id, session.identity.user_id);

    // Missing and forbidden look the same to the client
    match session.store.get_document(note_id, &session.identity.user_id).await? {
        Some(doc) if doc.access_allowed => {}
        Some(_) => {
            warn!("User {} may not access document {}", session.identity.user_id, note_id);
            return Err(SyncError::DocumentNotFound(note_id.to_string()));
        }
        None => return Err(SyncError::DocumentNotFound(note_id.to_string())),
    }

    session.hub.join(session.client_id, note_id.to_string(), request_id);
    Ok(())
}

/// Handle LeaveRoom
pub fn handle_leave_message(session: &Session) -> Result<(), SyncError> {
    info!("Leave request from client {}", session.client_id);
    session.hub.leave(session.client_id);
    Ok(())
}
