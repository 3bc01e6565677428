use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::SaveOutcome;
use crate::models::{
    to_data, AckAction, AckData, ConflictData, ContentUpdateData, Envelope, MessageType, SyncError,
};
use super::session::Session;

/// Handle ContentUpdate - compare the base version, store, acknowledge and broadcast.
///
/// The sender must be in the document's room. The commit runs in its own
/// task so that a connection closing mid-write cannot cut it short; the
/// broadcast only happens after the store accepted the write.
pub async fn handle_update_message(session: &Session, update_msg: ContentUpdateData, request_id: Option<String>) -> Result<(), SyncError> {
    let note_id = update_msg.note_id.clone();
    if session.hub.room_of(session.client_id).await.as_deref() != Some(note_id.as_str()) {
        return Err(SyncError::NotInRoom(note_id));
    }

    info!(
        "Update for document {} from user {} on version {}",
        note_id, session.identity.user_id, update_msg.version
    );

    let guard = tokio::spawn(commit_update(session.clone(), update_msg, request_id));
    match guard.await {
        Ok(result) => result,
        Err(e) => {
            error!("Version guard task for {} failed: {}", note_id, e);
            Err(SyncError::ConnectionClosed)
        }
    }
}

async fn commit_update(session: Session, update_msg: ContentUpdateData, request_id: Option<String>) -> Result<(), SyncError> {
    let ContentUpdateData { note_id, content, version, operation } = update_msg;

    let outcome = session
        .store
        .save_if_version_matches(&note_id, &content, version)
        .await
        .map_err(|e| {
            error!("Failed to save document {}: {}", note_id, e);
            SyncError::from(e)
        })?;

    match outcome {
        SaveOutcome::Accepted { new_version } => {
            info!("Document {} now at version {}", note_id, new_version);

            let broadcast = session.envelope(
                Envelope::new(MessageType::ContentUpdate, to_data(&ContentUpdateData {
                    note_id: note_id.clone(),
                    content,
                    version: new_version,
                    operation,
                }))
                .in_room(&note_id),
            );
            session.hub.broadcast(note_id.clone(), Some(session.client_id), broadcast);

            let ack = session.envelope(
                Envelope::new(MessageType::Ack, to_data(&AckData {
                    action: AckAction::NoteUpdated,
                    room_id: None,
                    note_id: Some(note_id.clone()),
                    version: Some(new_version),
                }))
                .in_room(&note_id)
                .with_id(request_id),
            );
            // the edit is committed even if the sender is already gone
            let _ = session.reply(ack).await;
            Ok(())
        }
        SaveOutcome::Conflict { current_version, current_content } => {
            let conflict_id = Uuid::new_v4().to_string();
            warn!(
                "Conflict {} on document {}: base {} but stored {}",
                conflict_id, note_id, version, current_version
            );
            let conflict = session.envelope(
                Envelope::new(MessageType::Conflict, to_data(&ConflictData {
                    note_id: note_id.clone(),
                    conflict_id,
                    local_version: version,
                    remote_version: current_version,
                    local_content: content,
                    remote_content: current_content,
                }))
                .in_room(&note_id)
                .with_id(request_id),
            );
            session.reply(conflict).await
        }
        SaveOutcome::NotFound => Err(SyncError::DocumentNotFound(note_id)),
    }
}
