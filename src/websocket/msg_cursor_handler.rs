use serde_json::Value;

use crate::models::{CursorUpdateData, Envelope, MessageType, SyncError};
use super::router::payload;
use super::session::Session;

/// Handle CursorUpdate: relay the payload to the rest of the room, untouched
/// apart from the normalized `note_id`.
///
/// Nothing is stored and there is no rate limiting.
pub fn handle_cursor_message(session: &Session, mut data: Value, request_id: Option<String>) -> Result<(), SyncError> {
    let cursor: CursorUpdateData = payload(MessageType::CursorUpdate, data.clone())?;

    if let Some(fields) = data.as_object_mut() {
        fields.insert("note_id".to_string(), Value::String(cursor.note_id.clone()));
    }

    let envelope = session.envelope(Envelope::new(MessageType::CursorUpdate, data).in_room(&cursor.note_id));
    session.hub.relay(session.client_id, cursor.note_id, envelope, request_id);
    Ok(())
}
